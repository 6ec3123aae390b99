/// Result type for codec resolution and decoding
pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid codec map: {0}")]
    InvalidMap(String),

    #[error("failed to decode payload text: {0}")]
    PayloadDecode(String),

    #[error("failed to load codec module: {0}")]
    LoadFailed(String),

    #[error("codec execution failed: {0}")]
    DecodeFailed(String),

    #[error("codec returned a non-object result")]
    NonObjectOutput,

    #[error(transparent)]
    InfrastructureError(#[from] anyhow::Error),
}
