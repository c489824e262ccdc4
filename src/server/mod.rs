//! Relay server
//!
//! ```text
//!   client ──ws──► ws::serve ──► Hub::handle_text ──► calls / rooms / presence
//!     ▲                                                      │
//!     └──── writer task ◄── outbound queue ◄── ConnectionTable::send
//! ```
//!
//! The [`Hub`] owns every registry. [`RelayServer`] binds the listener and
//! serves the HTTP and WebSocket routes on top of it.

pub mod auth;
pub mod config;
pub mod http;
pub mod hub;
pub mod listener;
pub mod ws;

pub use auth::{SessionResolver, TokenTable};
pub use config::ServerConfig;
pub use http::{router, ApiError, AppState};
pub use hub::Hub;
pub use listener::RelayServer;
