//! Owns the serial port to the drawing bot and relays a local TCP socket to it,
//! so that the programs doing the drawing can come and go.

pub mod link;
pub mod relay;

pub use link::{Link, Opener, SerialOpener};
pub use relay::Relay;
