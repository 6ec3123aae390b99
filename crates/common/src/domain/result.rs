use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed uplink payload: {0}")]
    MalformedPayload(String),

    #[error("Missing or invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Uplink contained no measurements")]
    NoMeasurements,

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Infrastructure error: {0}")]
    InfrastructureError(#[from] anyhow::Error),
}
