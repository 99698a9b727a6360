use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A point cloud, template list or matrix file could not be loaded.
    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Too few neighbours to estimate a normal or descriptor at a point.
    #[error("Feature computation failed at point {index}: {neighbors} neighbours in search radius")]
    FeatureComputation { index: usize, neighbors: usize },

    #[error("Template registry is empty")]
    EmptyRegistry,

    #[error("Alignment failed: {0}")]
    AlignmentFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap any error raised while reading `path` into a [`Error::Load`].
    pub fn load(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Error::Load {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
