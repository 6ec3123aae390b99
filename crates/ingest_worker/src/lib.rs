pub mod config;
pub mod domain;

pub use config::*;
pub use domain::*;
