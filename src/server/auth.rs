//! Session token resolution
//!
//! Authentication itself lives outside this crate. The hub only needs to map
//! a bearer token to a user id, which is what [`SessionResolver`] expresses.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::connection::UserId;

/// Maps session tokens to authenticated users
pub trait SessionResolver: Send + Sync + 'static {
    /// Resolve a token, `None` if it is unknown or expired
    fn resolve(&self, token: &str) -> Option<UserId>;
}

/// In-memory token table
#[derive(Default)]
pub struct TokenTable {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for a user
    pub fn issue(&self, user: &UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.insert(token.clone(), user.clone());
        token
    }

    /// Register a known token
    pub fn insert(&self, token: impl Into<String>, user: UserId) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
    }

    /// Invalidate a token; returns whether it existed
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some()
    }
}

impl SessionResolver for TokenTable {
    fn resolve(&self, token: &str) -> Option<UserId> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
