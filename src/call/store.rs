//! Call registry implementation
//!
//! Holds every ringing and active call and the busy index derived from them.
//! Signaling frames are routed to the opposite party through the notifier;
//! the registry never looks inside SDP or ICE payloads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::config::{CallConfig, CallerBusyPolicy};
use super::error::CallError;
use super::session::{CallId, CallKind, CallSession, CallState};
use crate::connection::UserId;
use crate::notify::Notifier;
use crate::presence::PresenceRegistry;
use crate::protocol::{ServerEvent, Signal};

#[derive(Default)]
struct CallTable {
    sessions: HashMap<CallId, CallSession>,
    /// User -> calls the user is a party to; non-empty means busy
    by_user: HashMap<UserId, HashSet<CallId>>,
}

impl CallTable {
    fn is_busy(&self, user: &UserId) -> bool {
        self.by_user.get(user).is_some_and(|calls| !calls.is_empty())
    }

    fn insert(&mut self, session: CallSession) {
        for party in [&session.caller, &session.callee] {
            self.by_user
                .entry(party.clone())
                .or_default()
                .insert(session.id.clone());
        }
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&mut self, id: &CallId) -> Option<CallSession> {
        let session = self.sessions.remove(id)?;

        for party in [&session.caller, &session.callee] {
            if let Some(calls) = self.by_user.get_mut(party) {
                calls.remove(id);
                if calls.is_empty() {
                    self.by_user.remove(party);
                }
            }
        }

        Some(session)
    }
}

/// Number of calls per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub ringing: usize,
    pub active: usize,
}

/// Registry of peer-to-peer calls
pub struct CallRegistry {
    calls: RwLock<CallTable>,
    presence: Arc<PresenceRegistry>,
    notifier: Arc<Notifier>,
    config: CallConfig,
}

impl CallRegistry {
    /// Create a call registry with default configuration
    pub fn new(presence: Arc<PresenceRegistry>, notifier: Arc<Notifier>) -> Self {
        Self::with_config(presence, notifier, CallConfig::default())
    }

    /// Create a call registry with custom configuration
    pub fn with_config(
        presence: Arc<PresenceRegistry>,
        notifier: Arc<Notifier>,
        config: CallConfig,
    ) -> Self {
        Self {
            calls: RwLock::new(CallTable::default()),
            presence,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Ring `callee` on behalf of `caller`
    ///
    /// Registers a ringing session (both parties busy) and delivers
    /// `IncomingCall` to every callee connection.
    pub async fn start_call(
        &self,
        caller: &UserId,
        callee: &UserId,
        kind: CallKind,
    ) -> Result<CallId, CallError> {
        if caller == callee {
            return Err(CallError::CannotCallSelf);
        }

        let call_id = {
            let mut calls = self.calls.write().await;

            if calls.is_busy(callee) {
                return Err(CallError::Busy(callee.clone()));
            }
            if self.config.caller_busy_policy == CallerBusyPolicy::Reject && calls.is_busy(caller)
            {
                return Err(CallError::Busy(caller.clone()));
            }
            if !self.presence.is_online(callee).await {
                return Err(CallError::Offline(callee.clone()));
            }

            let session = CallSession::new(CallId::generate(), caller.clone(), callee.clone(), kind);
            let call_id = session.id.clone();
            calls.insert(session);
            call_id
        };

        let ring = ServerEvent::IncomingCall {
            call_id: call_id.clone(),
            from_user_id: caller.clone(),
            call_type: kind,
        };
        let delivered = self.notifier.send_to_user(callee, ring).await;

        if delivered == 0 {
            if !self.presence.is_online(callee).await {
                // Callee's last connection vanished between the check and the ring
                self.calls.write().await.remove(&call_id);
                return Err(CallError::Offline(callee.clone()));
            }
            tracing::warn!(call = %call_id, callee = %callee, "Ring not queued on any device");
        }

        tracing::info!(
            call = %call_id,
            caller = %caller,
            callee = %callee,
            devices = delivered,
            "Call ringing"
        );

        Ok(call_id)
    }

    /// Callee accepts a ringing call
    ///
    /// Accepting an already active call is a no-op.
    pub async fn accept_call(
        &self,
        call_id: &CallId,
        caller: &UserId,
        callee: &UserId,
    ) -> Result<(), CallError> {
        {
            let mut calls = self.calls.write().await;
            let session = calls
                .sessions
                .get_mut(call_id)
                .filter(|s| s.caller == *caller && s.callee == *callee)
                .ok_or_else(|| CallError::UnknownSession(call_id.clone()))?;

            if !session.accept() {
                return Ok(());
            }
        }

        tracing::info!(call = %call_id, caller = %caller, callee = %callee, "Call accepted");

        self.notifier
            .send_to_user(
                caller,
                ServerEvent::CallAccepted {
                    call_id: call_id.clone(),
                },
            )
            .await;

        Ok(())
    }

    /// Callee declines a ringing call
    pub async fn reject_call(
        &self,
        call_id: &CallId,
        caller: &UserId,
        callee: &UserId,
    ) -> Result<(), CallError> {
        let removed = {
            let mut calls = self.calls.write().await;
            match calls.sessions.get(call_id) {
                Some(s) if s.is_ringing() && s.caller == *caller && s.callee == *callee => {
                    calls.remove(call_id)
                }
                _ => None,
            }
        };

        if removed.is_none() {
            return Err(CallError::UnknownSession(call_id.clone()));
        }

        tracing::info!(call = %call_id, caller = %caller, callee = %callee, "Call rejected");

        self.notifier
            .send_to_user(
                caller,
                ServerEvent::CallRejected {
                    call_id: call_id.clone(),
                },
            )
            .await;

        Ok(())
    }

    /// Forward a signaling payload from `sender` to the other party
    ///
    /// Returns the number of connections it reached.
    pub async fn relay(
        &self,
        call_id: &CallId,
        sender: &UserId,
        signal: Signal,
    ) -> Result<usize, CallError> {
        let target = {
            let mut calls = self.calls.write().await;
            let session = calls
                .sessions
                .get_mut(call_id)
                .ok_or_else(|| CallError::UnknownSession(call_id.clone()))?;
            let target = session
                .other_party(sender)
                .cloned()
                .ok_or_else(|| CallError::UnknownSession(call_id.clone()))?;

            session.touch();
            target
        };

        let kind = signal.kind();
        let call_id = call_id.clone();
        let from_user_id = sender.clone();
        let event = match signal {
            Signal::Offer(sdp) => ServerEvent::RtcOffer {
                call_id,
                from_user_id,
                sdp,
            },
            Signal::Answer(sdp) => ServerEvent::RtcAnswer {
                call_id,
                from_user_id,
                sdp,
            },
            Signal::IceCandidate(candidate) => ServerEvent::RtcIceCandidate {
                call_id,
                from_user_id,
                candidate,
            },
        };

        let delivered = self.notifier.send_to_user(&target, event).await;
        tracing::debug!(from = %sender, to = %target, signal = kind, delivered = delivered, "Call signal relayed");

        Ok(delivered)
    }

    pub async fn relay_offer(
        &self,
        call_id: &CallId,
        sender: &UserId,
        sdp: serde_json::Value,
    ) -> Result<usize, CallError> {
        self.relay(call_id, sender, Signal::Offer(sdp)).await
    }

    pub async fn relay_answer(
        &self,
        call_id: &CallId,
        sender: &UserId,
        sdp: serde_json::Value,
    ) -> Result<usize, CallError> {
        self.relay(call_id, sender, Signal::Answer(sdp)).await
    }

    pub async fn relay_ice_candidate(
        &self,
        call_id: &CallId,
        sender: &UserId,
        candidate: serde_json::Value,
    ) -> Result<usize, CallError> {
        self.relay(call_id, sender, Signal::IceCandidate(candidate))
            .await
    }

    /// Hang up a call on behalf of one of its parties
    ///
    /// Both parties become non-busy and receive `RtcHangup`.
    pub async fn end_call(&self, call_id: &CallId, requester: &UserId) -> Result<(), CallError> {
        let removed = {
            let mut calls = self.calls.write().await;
            match calls.sessions.get(call_id) {
                Some(s) if s.involves(requester) => calls.remove(call_id),
                _ => None,
            }
        };

        let session = removed.ok_or_else(|| CallError::UnknownSession(call_id.clone()))?;
        self.hang_up(session, "hangup").await;
        Ok(())
    }

    /// End every call of a user who no longer holds any connection
    pub async fn on_user_offline(&self, user: &UserId) -> usize {
        let ended: Vec<CallSession> = {
            let mut calls = self.calls.write().await;
            let ids: Vec<CallId> = calls
                .by_user
                .get(user)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();

            ids.iter().filter_map(|id| calls.remove(id)).collect()
        };

        let count = ended.len();
        for session in ended {
            self.hang_up(session, "party offline").await;
        }
        count
    }

    async fn hang_up(&self, mut session: CallSession, reason: &'static str) {
        session.end();

        tracing::info!(
            call = %session.id,
            caller = %session.caller,
            callee = %session.callee,
            talk_time_secs = session.talk_time().map(|d| d.as_secs()),
            reason = reason,
            "Call ended"
        );

        for party in [&session.caller, &session.callee] {
            self.notifier
                .send_to_user(
                    party,
                    ServerEvent::RtcHangup {
                        call_id: session.id.clone(),
                    },
                )
                .await;
        }
    }

    /// Check whether a user is ringing or in a call
    pub async fn is_busy(&self, user: &UserId) -> bool {
        self.calls.read().await.is_busy(user)
    }

    /// Get a snapshot of one call
    pub async fn session(&self, call_id: &CallId) -> Option<CallSession> {
        self.calls.read().await.sessions.get(call_id).cloned()
    }

    pub async fn counts(&self) -> CallCounts {
        let calls = self.calls.read().await;
        let mut counts = CallCounts::default();

        for session in calls.sessions.values() {
            match session.state {
                CallState::Ringing => counts.ringing += 1,
                CallState::Active => counts.active += 1,
                CallState::Ended => {}
            }
        }

        counts
    }

    /// Run cleanup once
    ///
    /// Reclaims calls that rang longer than `ring_timeout` and active calls
    /// idle longer than `idle_timeout`. Returns how many were reclaimed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();

        let expired: Vec<CallSession> = {
            let mut calls = self.calls.write().await;
            let ids: Vec<CallId> = calls
                .sessions
                .values()
                .filter(|s| match s.state {
                    CallState::Ringing => {
                        now.duration_since(s.created_at) > self.config.ring_timeout
                    }
                    CallState::Active => {
                        now.duration_since(s.last_activity) > self.config.idle_timeout
                    }
                    CallState::Ended => true,
                })
                .map(|s| s.id.clone())
                .collect();

            ids.iter().filter_map(|id| calls.remove(id)).collect()
        };

        let count = expired.len();
        for session in expired {
            self.hang_up(session, "timeout").await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::connection::{ConnectionTable, Outbound, OutboundReceiver};

    struct Fixture {
        registry: Arc<CallRegistry>,
        presence: Arc<PresenceRegistry>,
        connections: Arc<ConnectionTable>,
    }

    impl Fixture {
        fn new(config: CallConfig) -> Self {
            let presence = Arc::new(PresenceRegistry::new());
            let connections = Arc::new(ConnectionTable::new());
            let notifier = Arc::new(Notifier::new(
                Arc::clone(&presence),
                Arc::clone(&connections),
            ));
            let registry = Arc::new(CallRegistry::with_config(
                Arc::clone(&presence),
                notifier,
                config,
            ));
            Self {
                registry,
                presence,
                connections,
            }
        }

        async fn online(&self, user: &str) -> OutboundReceiver {
            let (conn, rx) = self.connections.open(32).await;
            self.presence.add(&UserId::from(user), conn).await;
            rx
        }
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Outbound::Event(event) = frame {
                events.push(event);
            }
        }
        events
    }

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[tokio::test]
    async fn test_ring_reaches_callee_with_audio_backlog() {
        let fx = Fixture::new(CallConfig::default());
        let _alice_rx = fx.online("alice").await;
        let (bob_conn, mut bob_rx) = fx.connections.open(4).await;
        fx.presence.add(&user("bob"), bob_conn).await;

        for _ in 0..8 {
            fx.connections
                .send(bob_conn, Outbound::Audio(bytes::Bytes::from_static(b"pcm")))
                .await;
        }

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        assert!(matches!(
            bob_rx.recv().await,
            Some(Outbound::Event(ServerEvent::IncomingCall { call_id: ref id, .. })) if *id == call_id
        ));
        assert!(fx.registry.is_busy(&user("bob")).await);
    }

    #[tokio::test]
    async fn test_start_call_rings_callee() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;
        let mut bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Video)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut bob),
            vec![ServerEvent::IncomingCall {
                call_id: call_id.clone(),
                from_user_id: user("alice"),
                call_type: CallKind::Video,
            }]
        );
        assert!(fx.registry.is_busy(&user("alice")).await);
        assert!(fx.registry.is_busy(&user("bob")).await);
        assert!(fx.registry.session(&call_id).await.unwrap().is_ringing());
    }

    #[tokio::test]
    async fn test_second_call_to_ringing_callee_is_busy() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;
        let _carol = fx.online("carol").await;

        fx.registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        let result = fx
            .registry
            .start_call(&user("carol"), &user("bob"), CallKind::Audio)
            .await;
        assert_eq!(result, Err(CallError::Busy(user("bob"))));
    }

    #[tokio::test]
    async fn test_offline_callee() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;

        let result = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await;
        assert_eq!(result, Err(CallError::Offline(user("bob"))));
        assert!(!fx.registry.is_busy(&user("alice")).await);
    }

    #[tokio::test]
    async fn test_cannot_call_self() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;

        let result = fx
            .registry
            .start_call(&user("alice"), &user("alice"), CallKind::Audio)
            .await;
        assert_eq!(result, Err(CallError::CannotCallSelf));
    }

    #[tokio::test]
    async fn test_caller_busy_policy() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;
        let _carol = fx.online("carol").await;

        fx.registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        let result = fx
            .registry
            .start_call(&user("alice"), &user("carol"), CallKind::Audio)
            .await;
        assert_eq!(result, Err(CallError::Busy(user("alice"))));

        let fx = Fixture::new(CallConfig::default().caller_busy_policy(CallerBusyPolicy::Allow));
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;
        let _carol = fx.online("carol").await;

        fx.registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        let result = fx
            .registry
            .start_call(&user("alice"), &user("carol"), CallKind::Audio)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_accept_notifies_caller() {
        let fx = Fixture::new(CallConfig::default());
        let mut alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        fx.registry
            .accept_call(&call_id, &user("alice"), &user("bob"))
            .await
            .unwrap();
        // Accepting twice does not notify again
        fx.registry
            .accept_call(&call_id, &user("alice"), &user("bob"))
            .await
            .unwrap();

        assert_eq!(
            drain(&mut alice),
            vec![ServerEvent::CallAccepted {
                call_id: call_id.clone()
            }]
        );
        assert_eq!(fx.registry.counts().await, CallCounts { ringing: 0, active: 1 });
    }

    #[tokio::test]
    async fn test_accept_with_wrong_parties() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        let result = fx
            .registry
            .accept_call(&call_id, &user("alice"), &user("mallory"))
            .await;
        assert_eq!(result, Err(CallError::UnknownSession(call_id)));
    }

    #[tokio::test]
    async fn test_reject_frees_both_parties() {
        let fx = Fixture::new(CallConfig::default());
        let mut alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        fx.registry
            .reject_call(&call_id, &user("alice"), &user("bob"))
            .await
            .unwrap();

        assert_eq!(
            drain(&mut alice),
            vec![ServerEvent::CallRejected {
                call_id: call_id.clone()
            }]
        );
        assert!(!fx.registry.is_busy(&user("alice")).await);
        assert!(!fx.registry.is_busy(&user("bob")).await);

        // The same call cannot be rejected twice
        let result = fx
            .registry
            .reject_call(&call_id, &user("alice"), &user("bob"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relay_reaches_other_party_only() {
        let fx = Fixture::new(CallConfig::default());
        let mut alice = fx.online("alice").await;
        let mut bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        fx.registry
            .accept_call(&call_id, &user("alice"), &user("bob"))
            .await
            .unwrap();
        drain(&mut alice);
        drain(&mut bob);

        let delivered = fx
            .registry
            .relay_ice_candidate(&call_id, &user("bob"), json!({"candidate": "c"}))
            .await
            .unwrap();
        assert_eq!(delivered, 1);

        assert!(drain(&mut bob).is_empty());
        assert_eq!(
            drain(&mut alice),
            vec![ServerEvent::RtcIceCandidate {
                call_id,
                from_user_id: user("bob"),
                candidate: json!({"candidate": "c"}),
            }]
        );
    }

    #[tokio::test]
    async fn test_relay_unknown_call() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;

        let result = fx
            .registry
            .relay_offer(&CallId::from("gone"), &user("alice"), json!("sdp"))
            .await;
        assert_eq!(result, Err(CallError::UnknownSession(CallId::from("gone"))));
    }

    #[tokio::test]
    async fn test_relay_from_outsider_is_rejected() {
        let fx = Fixture::new(CallConfig::default());
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        let result = fx
            .registry
            .relay_offer(&call_id, &user("mallory"), json!("sdp"))
            .await;
        assert!(matches!(result, Err(CallError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_end_call_hangs_up_both_sides() {
        let fx = Fixture::new(CallConfig::default());
        let mut alice = fx.online("alice").await;
        let mut bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        drain(&mut bob);

        fx.registry.end_call(&call_id, &user("alice")).await.unwrap();

        let hangup = ServerEvent::RtcHangup {
            call_id: call_id.clone(),
        };
        assert_eq!(drain(&mut alice), vec![hangup.clone()]);
        assert_eq!(drain(&mut bob), vec![hangup]);
        assert!(!fx.registry.is_busy(&user("bob")).await);

        // Second hangup races with the first
        let result = fx.registry.end_call(&call_id, &user("bob")).await;
        assert!(matches!(result, Err(CallError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_user_offline_ends_calls() {
        let fx = Fixture::new(CallConfig::default());
        let mut alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        assert_eq!(fx.registry.on_user_offline(&user("bob")).await, 1);
        assert_eq!(drain(&mut alice), vec![ServerEvent::RtcHangup { call_id }]);
        assert!(!fx.registry.is_busy(&user("alice")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_reclaims_unanswered_call() {
        let fx = Fixture::new(CallConfig::default().ring_timeout(Duration::from_secs(30)));
        let mut alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(fx.registry.cleanup().await, 0);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(fx.registry.cleanup().await, 1);

        assert_eq!(drain(&mut alice), vec![ServerEvent::RtcHangup { call_id }]);
        assert!(!fx.registry.is_busy(&user("bob")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_reclaims_idle_call() {
        let fx = Fixture::new(CallConfig::default().idle_timeout(Duration::from_secs(60)));
        let _alice = fx.online("alice").await;
        let _bob = fx.online("bob").await;

        let call_id = fx
            .registry
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        fx.registry
            .accept_call(&call_id, &user("alice"), &user("bob"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        // Signaling keeps the call alive
        fx.registry
            .relay_answer(&call_id, &user("bob"), json!("sdp"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(fx.registry.cleanup().await, 0);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(fx.registry.cleanup().await, 1);
    }
}
