//! Recipient resolution for upload notifications
//!
//! A row asks for a notification when its `email` is set and `send_flg` is
//! `"1"` or blank. Any other flag value opts the row out.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use crate::services::email_sender::EmailMessage;
use crate::services::email_templates::{RowContentEmail, UploadSavedEmail};
use crate::types::AcceptedRow;

pub const EMAIL_COLUMN: &str = "email";
pub const SEND_FLAG_COLUMN: &str = "send_flg";
pub const CONTENT_COLUMN: &str = "content";

/// How the message body for a recipient is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// `PerRow` when the file has a `content` column, otherwise `Fixed`
    #[default]
    Auto,
    /// Body comes from the row's `content` column
    PerRow,
    /// Same text for everyone, naming the uploaded file
    Fixed,
}

impl FromStr for ContentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "per_row" | "per-row" | "row" => Ok(Self::PerRow),
            "fixed" => Ok(Self::Fixed),
            other => anyhow::bail!("unknown content mode '{}'", other),
        }
    }
}

/// Recipient -> message mapping, one entry per address.
///
/// Re-inserting an address replaces its message but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct RecipientSet {
    messages: Vec<EmailMessage>,
    index: HashMap<String, usize>,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, message: EmailMessage) {
        match self.index.get(&message.to) {
            Some(&i) => self.messages[i] = message,
            None => {
                self.index.insert(message.to.clone(), self.messages.len());
                self.messages.push(message);
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, to: &str) -> Option<&EmailMessage> {
        self.index.get(to).map(|&i| &self.messages[i])
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &EmailMessage> {
        self.messages.iter()
    }

    pub fn into_messages(self) -> Vec<EmailMessage> {
        self.messages
    }
}

/// Address a row should be notified at, if it opted in
pub fn notification_target(row: &AcceptedRow) -> Option<&str> {
    let email = row.trimmed(EMAIL_COLUMN);
    let flag = row.trimmed(SEND_FLAG_COLUMN);
    if email.is_empty() || !(flag == "1" || flag.is_empty()) {
        return None;
    }
    Some(email)
}

#[derive(Debug, Clone)]
pub struct RecipientResolver {
    mode: ContentMode,
    static_recipient: Option<String>,
    locale: String,
}

impl RecipientResolver {
    pub fn new(mode: ContentMode, static_recipient: Option<String>, locale: impl Into<String>) -> Self {
        Self {
            mode,
            static_recipient,
            locale: locale.into(),
        }
    }

    /// Mode actually applied to a file with or without a `content` column
    pub fn effective_mode(&self, has_content_column: bool) -> ContentMode {
        match self.mode {
            ContentMode::Auto if has_content_column => ContentMode::PerRow,
            ContentMode::Auto => ContentMode::Fixed,
            mode => mode,
        }
    }

    /// Build the recipient set for `rows` of the uploaded `file_name`.
    pub fn resolve<'a, I>(&self, rows: I, has_content_column: bool, file_name: &str) -> RecipientSet
    where
        I: IntoIterator<Item = &'a AcceptedRow>,
    {
        let mode = self.effective_mode(has_content_column);
        let mut recipients = RecipientSet::new();

        if mode == ContentMode::Fixed {
            if let Some(to) = self.static_recipient.as_deref() {
                if rows.into_iter().next().is_some() {
                    recipients.upsert(self.fixed_message(to, file_name));
                }
                return recipients;
            }
        }

        for row in rows {
            let Some(to) = notification_target(row) else {
                continue;
            };

            match mode {
                ContentMode::PerRow => {
                    if row.trimmed(CONTENT_COLUMN).is_empty() {
                        debug!(to, "Row has no content, not notifying");
                        continue;
                    }
                    let content = row.get(CONTENT_COLUMN).unwrap_or_default();
                    recipients.upsert(
                        RowContentEmail {
                            to,
                            content,
                            locale: &self.locale,
                        }
                        .render(),
                    );
                }
                _ => recipients.upsert(self.fixed_message(to, file_name)),
            }
        }

        recipients
    }

    fn fixed_message(&self, to: &str, file_name: &str) -> EmailMessage {
        UploadSavedEmail {
            to,
            file_name,
            locale: &self.locale,
        }
        .render()
    }
}

impl Default for RecipientResolver {
    fn default() -> Self {
        Self::new(ContentMode::Auto, None, "en")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Row;

    fn accepted(fields: &[(&str, &str)]) -> AcceptedRow {
        let row: Row = fields.iter().copied().collect();
        AcceptedRow::stamp(row, "2026-10-16T00:00:00.000000")
    }

    fn content_rows() -> Vec<AcceptedRow> {
        vec![
            accepted(&[("email", "a@x.com"), ("send_flg", "1"), ("content", "hi")]),
            accepted(&[("email", "b@x.com"), ("send_flg", "0"), ("content", "bye")]),
            accepted(&[("email", "c@x.com"), ("send_flg", ""), ("content", "yo")]),
        ]
    }

    #[test]
    fn per_row_mode_honours_opt_out_flag() {
        let resolver = RecipientResolver::new(ContentMode::PerRow, None, "en");
        let set = resolver.resolve(&content_rows(), true, "users.csv");

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a@x.com").unwrap().text, "hi");
        assert_eq!(set.get("c@x.com").unwrap().text, "yo");
        assert!(set.get("b@x.com").is_none());
    }

    #[test]
    fn opt_out_row_never_contributes_in_any_mode() {
        let rows = vec![accepted(&[("email", "b@x.com"), ("send_flg", "0"), ("content", "bye")])];
        for mode in [ContentMode::Auto, ContentMode::PerRow, ContentMode::Fixed] {
            let set = RecipientResolver::new(mode, None, "en").resolve(&rows, true, "f.csv");
            assert!(set.is_empty(), "{:?}", mode);
        }
    }

    #[test]
    fn other_flag_values_opt_out() {
        let rows = vec![
            accepted(&[("email", "a@x.com"), ("send_flg", "yes")]),
            accepted(&[("email", "b@x.com"), ("send_flg", "2")]),
            accepted(&[("email", "c@x.com"), ("send_flg", " 1 ")]),
        ];
        let set = RecipientResolver::new(ContentMode::Fixed, None, "en").resolve(&rows, false, "f.csv");
        assert_eq!(set.len(), 1);
        assert!(set.get("c@x.com").is_some());
    }

    #[test]
    fn last_row_wins_for_duplicate_address() {
        let rows = vec![
            accepted(&[("email", "a@x.com"), ("send_flg", "1"), ("content", "first")]),
            accepted(&[("email", "b@x.com"), ("send_flg", "1"), ("content", "other")]),
            accepted(&[("email", " a@x.com "), ("send_flg", "1"), ("content", "last")]),
        ];
        let set = RecipientResolver::new(ContentMode::PerRow, None, "en").resolve(&rows, true, "f.csv");

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a@x.com").unwrap().text, "last");
        let order: Vec<&str> = set.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(order, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn per_row_body_keeps_content_whitespace() {
        let content = "  Dear A,\n  see below  \n";
        let rows = vec![accepted(&[("email", "a@x.com"), ("send_flg", "1"), ("content", content)])];
        let set = RecipientResolver::new(ContentMode::PerRow, None, "en").resolve(&rows, true, "f.csv");

        assert_eq!(set.get("a@x.com").unwrap().text, content);
    }

    #[test]
    fn per_row_mode_skips_whitespace_only_content() {
        let rows = vec![accepted(&[("email", "a@x.com"), ("send_flg", "1"), ("content", " \n ")])];
        let set = RecipientResolver::new(ContentMode::PerRow, None, "en").resolve(&rows, true, "f.csv");
        assert!(set.is_empty());
    }

    #[test]
    fn per_row_mode_skips_missing_content() {
        let rows = vec![accepted(&[("email", "a@x.com"), ("send_flg", "1")])];
        let set = RecipientResolver::new(ContentMode::PerRow, None, "en").resolve(&rows, false, "f.csv");
        assert!(set.is_empty());
    }

    #[test]
    fn row_without_email_is_not_a_recipient() {
        let rows = vec![accepted(&[("id", "7"), ("send_flg", "1"), ("content", "hi")])];
        let set = RecipientResolver::default().resolve(&rows, true, "f.csv");
        assert!(set.is_empty());
    }

    #[test]
    fn fixed_mode_names_the_file() {
        let set = RecipientResolver::new(ContentMode::Fixed, None, "en").resolve(&content_rows(), true, "users.csv");
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|m| m.text.contains("users.csv")));
    }

    #[test]
    fn auto_mode_falls_back_to_fixed_without_content_column() {
        let resolver = RecipientResolver::default();
        assert_eq!(resolver.effective_mode(true), ContentMode::PerRow);
        assert_eq!(resolver.effective_mode(false), ContentMode::Fixed);

        let rows = vec![accepted(&[("email", "a@x.com"), ("send_flg", "1")])];
        let set = resolver.resolve(&rows, false, "users.csv");
        assert!(set.get("a@x.com").unwrap().text.contains("users.csv"));
    }

    #[test]
    fn static_recipient_replaces_row_addresses_in_fixed_mode() {
        let resolver = RecipientResolver::new(ContentMode::Fixed, Some("ops@x.com".into()), "en");
        let set = resolver.resolve(&content_rows(), true, "users.csv");
        assert_eq!(set.len(), 1);
        assert!(set.get("ops@x.com").is_some());

        let empty: Vec<AcceptedRow> = vec![];
        assert!(resolver.resolve(&empty, true, "users.csv").is_empty());
    }

    #[test]
    fn static_recipient_ignored_in_per_row_mode() {
        let resolver = RecipientResolver::new(ContentMode::PerRow, Some("ops@x.com".into()), "en");
        let set = resolver.resolve(&content_rows(), true, "users.csv");
        assert!(set.get("ops@x.com").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn content_mode_from_str() {
        assert_eq!("per_row".parse::<ContentMode>().unwrap(), ContentMode::PerRow);
        assert_eq!("FIXED".parse::<ContentMode>().unwrap(), ContentMode::Fixed);
        assert!("html".parse::<ContentMode>().is_err());
    }
}
