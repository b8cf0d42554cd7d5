//! Framed messenger and wire message taxonomy for the delta-sync protocol.

pub mod error;
pub mod framing;
pub mod message;

pub use error::ProtocolError;
pub use framing::Messenger;
pub use message::Message;
