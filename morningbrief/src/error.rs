use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by [`crate::manager::DigestManager`].
///
/// Unknown category/slot errors are raised before anything is written.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown news slot: news{0}")]
    UnknownSlot(usize),

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse digest JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize digest: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write export file {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type DigestResult<T> = Result<T, DigestError>;
