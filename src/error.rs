use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed input in {}: {reason}", describe(.path, .line))]
    MalformedInput {
        path: PathBuf,
        line: Option<u64>,
        reason: String,
    },

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, line: Option<u64>, reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

pub(crate) fn describe(path: &Path, line: &Option<u64>) -> String {
    match line {
        Some(line) => format!("{}:{line}", path.display()),
        None => path.display().to_string(),
    }
}
