use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures talking to the document store. Always fatal to the current run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable at '{path}': {source}")]
    Unavailable {
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("invalid store path '{0}'")]
    InvalidPath(String),
}

impl StoreError {
    pub fn unavailable(path: &str, source: impl Into<BoxError>) -> Self {
        Self::Unavailable {
            path: path.to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Any failure that stops a dashboard run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
