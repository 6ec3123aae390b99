mod measurement;
mod result;
mod sink;

pub use measurement::*;
pub use result::*;
pub use sink::*;
