mod chirpstack;
mod handler;
mod loriot;
mod packet_loss;
mod pipeline;

pub use chirpstack::*;
pub use handler::*;
pub use loriot::*;
pub use packet_loss::*;
pub use pipeline::*;
