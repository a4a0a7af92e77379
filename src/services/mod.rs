//! Business logic services

pub mod email_sender;
pub mod email_templates;
pub mod notification_dispatcher;
pub mod object_store;
pub mod pipeline;
pub mod recipient_resolver;
pub mod row_parser;
pub mod row_validator;
pub mod warehouse;
