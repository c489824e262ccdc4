//! Peer-to-peer call signaling
//!
//! A call moves `Ringing -> Active -> Ended`, or straight from `Ringing` to
//! `Ended` when it is rejected or never answered. While a call is ringing or
//! active both parties are busy.
//!
//! ```text
//!   caller                 CallRegistry                 callee
//!     │── start_call ───────────►│── IncomingCall ─────────►│
//!     │◄──────── CallAccepted ───│◄──────── accept_call ────│
//!     │── offer ────────────────►│── RtcOffer ─────────────►│
//!     │◄────────── RtcAnswer ────│◄──────────── answer ─────│
//!     │── end_call ─────────────►│── RtcHangup ──► both     │
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use config::{CallConfig, CallerBusyPolicy};
pub use error::CallError;
pub use session::{CallId, CallKind, CallSession, CallState};
pub use store::{CallCounts, CallRegistry};
