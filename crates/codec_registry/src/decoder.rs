use crate::error::CodecResult;
use serde_json::{Map, Value};

/// Trait for turning raw payload bytes into a flat field map.
///
/// Implementations must be stateless across calls; one instance is
/// shared between every device that maps to the same codec location.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Decoder: Send + Sync {
    /// Decode payload bytes into named fields.
    ///
    /// The returned map is the decoder's raw output; the registry is
    /// responsible for dropping null values and cleaning field names.
    fn decode(&self, payload: &[u8]) -> CodecResult<Map<String, Value>>;
}
