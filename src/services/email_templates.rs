//! Notification email templates.
//!
//! Supported templates:
//!   - `UploadSavedEmail` - fixed text naming the uploaded file
//!   - `RowContentEmail`  - body taken verbatim from the row's `content` column
//!
//! Each template is rendered per-locale (en, ja).
//! The `render()` method returns an `EmailMessage` ready to pass to `EmailSender::send`.

use crate::services::email_sender::EmailMessage;

fn subject(locale: &str) -> &'static str {
    match locale {
        "ja" => "CSVアップロード完了通知",
        _ => "CSV upload completed",
    }
}

// =============================================================================
// Fixed-content email
// =============================================================================

pub struct UploadSavedEmail<'a> {
    pub to: &'a str,
    pub file_name: &'a str,
    pub locale: &'a str,
}

impl<'a> UploadSavedEmail<'a> {
    pub fn render(&self) -> EmailMessage {
        let text = match self.locale {
            "ja" => format!(
                "{} に含まれるデータを BigQuery に保存しました。",
                self.file_name
            ),
            _ => format!(
                "The data contained in {} has been saved to BigQuery.",
                self.file_name
            ),
        };

        EmailMessage {
            to: self.to.to_string(),
            subject: subject(self.locale).to_string(),
            text,
        }
    }
}

// =============================================================================
// Per-row content email
// =============================================================================

pub struct RowContentEmail<'a> {
    pub to: &'a str,
    pub content: &'a str,
    pub locale: &'a str,
}

impl<'a> RowContentEmail<'a> {
    pub fn render(&self) -> EmailMessage {
        EmailMessage {
            to: self.to.to_string(),
            subject: subject(self.locale).to_string(),
            text: self.content.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
