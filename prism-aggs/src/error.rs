use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An aggregator was asked to collect or build after it already produced a result.
    #[error("Aggregator is collected, please create a new aggregator: {0}")]
    Reuse(String),

    #[error("Config error: {0}")]
    Configuration(String),

    #[error("Bucket ordinal {0} is too large, please make the bucket space smaller")]
    Capacity(u64),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Failures raised by the underlying index while visiting or evaluating documents.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, Error::Evaluation(_) | Error::Io(_) | Error::Tantivy(_))
    }
}

impl From<tantivy::query::QueryParserError> for Error {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        Error::InvalidQuery(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
