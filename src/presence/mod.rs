//! Presence: which live connections each user holds
//!
//! Every component that addresses a user rather than a connection goes
//! through the [`PresenceRegistry`]. An offline user simply has zero
//! connections; lookups never fail.

pub mod store;

pub use store::PresenceRegistry;
