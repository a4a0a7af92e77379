//! Type definitions

pub mod event;
pub mod messages;
pub mod report;
pub mod row;

pub use event::*;
pub use messages::*;
pub use report::*;
pub use row::*;
