use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("genotype '{0}' not in the sample index")]
    InvalidGenotype(String),

    #[error("missing study: {0}")]
    MissingStudy(String),

    #[error("sample '{sample}' not found in study '{study}'")]
    MissingSample { study: String, sample: String },

    #[error("invalid index configuration: {0}")]
    Configuration(String),

    #[error("malformed index record: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON error shape printed by the command line tool
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidQuery(_) => "InvalidQuery",
            Error::InvalidGenotype(_) => "InvalidGenotype",
            Error::MissingStudy(_) => "MissingStudy",
            Error::MissingSample { .. } => "MissingSample",
            Error::Configuration(_) => "InvalidConfiguration",
            Error::Codec(_) => "MalformedRecord",
            Error::Io(_) | Error::Json(_) => "InternalError",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        }
    }
}
