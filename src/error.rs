//! Errors that abort a pipeline invocation

use thiserror::Error;

/// Fatal errors for a single run. Row, write and delivery problems are
/// recovered inside the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to fetch gs://{bucket}/{object}: {source}")]
    Fetch {
        bucket: String,
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("file is not valid UTF-8 (first invalid byte at offset {offset})")]
    Decode { offset: usize },

    #[error("malformed record at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

impl IngestError {
    /// Stable code for error replies
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Fetch { .. } => "FETCH_ERROR",
            IngestError::Decode { .. } => "DECODE_ERROR",
            IngestError::Parse { .. } => "PARSE_ERROR",
        }
    }
}
