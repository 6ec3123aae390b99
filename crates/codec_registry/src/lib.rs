mod cayenne_lpp;
mod codec_map;
mod decoder;
mod error;
mod git;
mod registry;
mod wasm;

pub use cayenne_lpp::*;
pub use codec_map::*;
pub use decoder::*;
pub use error::*;
pub use git::*;
pub use registry::*;
pub use wasm::*;

// Re-export mocks when the testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use decoder::MockDecoder;
#[cfg(any(test, feature = "testing"))]
pub use git::MockRepoFetcher;
#[cfg(any(test, feature = "testing"))]
pub use registry::MockDecoderLoader;
