//! Wire protocol for the persistent channel

pub mod message;

pub use message::{ClientMessage, ErrorCode, ServerEvent, Signal, SignalTarget};
