//! The hub: owns every registry and dispatches client requests
//!
//! Transports (HTTP handlers, WebSocket sessions) hold an `Arc<Hub>` and call
//! into it. Disconnect is a single entry point that fans out to every
//! component and is safe to call more than once.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::auth::SessionResolver;
use super::config::ServerConfig;
use crate::broadcast::{BroadcastPipeline, SubscriberSet};
use crate::call::{CallId, CallKind, CallRegistry};
use crate::connection::{ConnectionId, ConnectionTable, Outbound, OutboundReceiver, UserId};
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::presence::PresenceRegistry;
use crate::protocol::{ClientMessage, ServerEvent, Signal, SignalTarget};
use crate::stats::{HubStats, PipelineStats};
use crate::stream::{Role, RoomRegistry, StreamId, StreamSlot, StreamSlots};

/// Shared real-time state
pub struct Hub {
    config: ServerConfig,
    resolver: Arc<dyn SessionResolver>,
    connections: Arc<ConnectionTable>,
    presence: Arc<PresenceRegistry>,
    notifier: Arc<Notifier>,
    calls: Arc<CallRegistry>,
    rooms: RoomRegistry,
    slots: StreamSlots,
    subscribers: Arc<SubscriberSet>,
    pipeline_stats: Arc<PipelineStats>,
}

impl Hub {
    pub fn new(config: ServerConfig, resolver: Arc<dyn SessionResolver>) -> Self {
        let connections = Arc::new(ConnectionTable::new());
        let presence = Arc::new(PresenceRegistry::new());
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&presence),
            Arc::clone(&connections),
        ));
        let calls = Arc::new(CallRegistry::with_config(
            Arc::clone(&presence),
            Arc::clone(&notifier),
            config.calls.clone(),
        ));

        Self {
            rooms: RoomRegistry::new(Arc::clone(&connections)),
            slots: StreamSlots::new(),
            subscribers: Arc::new(SubscriberSet::new()),
            pipeline_stats: Arc::new(PipelineStats::new()),
            config,
            resolver,
            connections,
            presence,
            notifier,
            calls,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<ConnectionTable> {
        &self.connections
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Entry point for pushing platform notifications to users
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn calls(&self) -> &Arc<CallRegistry> {
        &self.calls
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn slots(&self) -> &StreamSlots {
        &self.slots
    }

    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subscribers
    }

    /// Resolve a bearer token to a user
    pub fn authenticate(&self, token: Option<&str>) -> Result<UserId> {
        token
            .and_then(|token| self.resolver.resolve(token))
            .ok_or(Error::Unauthenticated)
    }

    // ========== Connection lifecycle ==========

    /// Register a new transport connection
    pub async fn open_connection(&self) -> (ConnectionId, OutboundReceiver) {
        self.connections.open(self.config.outbound_capacity).await
    }

    /// Bind a connection to a user and make it reachable
    pub async fn attach(&self, conn: ConnectionId, user: &UserId) -> Result<()> {
        self.connections.attach(conn, user).await?;
        self.presence.add(user, conn).await;

        if self.config.auto_subscribe_audio {
            self.subscribers.subscribe(conn).await;
        }

        self.connections
            .send(
                conn,
                Outbound::Event(ServerEvent::Attached {
                    connection_id: conn,
                    user_id: user.clone(),
                }),
            )
            .await;

        Ok(())
    }

    /// Tear down every trace of a connection
    ///
    /// Only the first call for a given connection has any effect.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some(closed) = self.connections.close(conn).await else {
            return;
        };

        self.subscribers.unsubscribe(conn).await;
        if let Some(membership) = self.rooms.on_disconnect(conn).await {
            if membership.role == Role::Broadcaster {
                self.slots.release(&membership.stream_id).await;
            }
        }

        if let Some(ref user) = closed.user {
            let remaining = self.presence.remove(user, conn).await;
            if remaining == 0 {
                let ended = self.calls.on_user_offline(user).await;
                tracing::info!(user = %user, calls_ended = ended, "User offline");
            }
        }

        tracing::info!(
            connection = %conn,
            user = ?closed.user.as_ref().map(UserId::as_str),
            duration_secs = closed.duration.as_secs(),
            "Connection closed"
        );
    }

    // ========== Persistent channel ==========

    /// Handle one text frame from a connection
    ///
    /// Failures with a client-facing code are reported back on the same
    /// connection; everything else is logged and dropped.
    pub async fn handle_text(&self, conn: ConnectionId, text: &str) {
        match ClientMessage::parse(text) {
            Ok(msg) => self.dispatch(conn, msg).await,
            Err(e) => self.report(conn, Error::Malformed(e)).await,
        }
    }

    /// Handle one parsed message, reporting failures to the sender
    pub async fn dispatch(&self, conn: ConnectionId, msg: ClientMessage) {
        if let Err(e) = self.handle_message(conn, msg).await {
            self.report(conn, e).await;
        }
    }

    async fn report(&self, conn: ConnectionId, error: Error) {
        match error.client_code() {
            Some(code) => {
                tracing::debug!(connection = %conn, error = %error, "Request failed");
                self.connections
                    .send(conn, Outbound::Event(ServerEvent::error(code, error.to_string())))
                    .await;
            }
            None => {
                tracing::debug!(connection = %conn, error = %error, "Request dropped");
            }
        }
    }

    /// Execute one client message
    pub async fn handle_message(&self, conn: ConnectionId, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::AttachUserSession { user_id, token } => {
                if self.connections.user_of(conn).await.as_ref() != Some(&user_id)
                    && self.authenticate(token.as_deref())? != user_id
                {
                    return Err(Error::Unauthenticated);
                }
                self.attach(conn, &user_id).await
            }
            ClientMessage::JoinRoom { stream_id, role } => {
                let user = self.require_user(conn).await?;
                self.join_room(conn, &user, &stream_id, role).await
            }
            ClientMessage::SendOffer { target, sdp } => {
                self.relay(conn, target, Signal::Offer(sdp)).await
            }
            ClientMessage::SendAnswer { target, sdp } => {
                self.relay(conn, target, Signal::Answer(sdp)).await
            }
            ClientMessage::SendIceCandidate { target, candidate } => {
                self.relay(conn, target, Signal::IceCandidate(candidate))
                    .await
            }
            ClientMessage::EndCall { call_id } => {
                let user = self.require_user(conn).await?;
                self.calls.end_call(&call_id, &user).await?;
                Ok(())
            }
            ClientMessage::SubscribeAudio => {
                self.require_user(conn).await?;
                self.subscribers.subscribe(conn).await;
                Ok(())
            }
            ClientMessage::UnsubscribeAudio => {
                self.subscribers.unsubscribe(conn).await;
                Ok(())
            }
        }
    }

    async fn join_room(
        &self,
        conn: ConnectionId,
        user: &UserId,
        stream_id: &StreamId,
        role: Role,
    ) -> Result<()> {
        if role == Role::Broadcaster {
            self.slots.check_broadcaster(stream_id, user).await?;
        }

        let previous = self.rooms.membership(conn).await;
        self.rooms.join_room(stream_id, conn, role).await?;

        // Leaving the broadcaster seat ended the previous stream
        if let Some(previous) = previous {
            let same_seat = previous.stream_id == *stream_id && role == Role::Broadcaster;
            if previous.role == Role::Broadcaster && !same_seat {
                self.slots.release(&previous.stream_id).await;
            }
        }
        Ok(())
    }

    async fn relay(&self, conn: ConnectionId, target: SignalTarget, signal: Signal) -> Result<()> {
        let user = self.require_user(conn).await?;

        match target {
            SignalTarget::Call(call_id) => {
                self.calls.relay(&call_id, &user, signal).await?;
            }
            SignalTarget::Stream(stream_id) => {
                self.rooms.relay(&stream_id, conn, signal).await?;
            }
        }
        Ok(())
    }

    async fn require_user(&self, conn: ConnectionId) -> Result<UserId> {
        self.connections
            .user_of(conn)
            .await
            .ok_or(Error::Unauthenticated)
    }

    // ========== Request/response operations ==========

    /// Ring `callee` on behalf of an authenticated caller
    pub async fn start_call(&self, caller: &UserId, callee: &UserId, kind: CallKind) -> Result<CallId> {
        Ok(self.calls.start_call(caller, callee, kind).await?)
    }

    /// Authenticated callee accepts a call from `caller`
    pub async fn accept_call(&self, callee: &UserId, call_id: &CallId, caller: &UserId) -> Result<()> {
        Ok(self.calls.accept_call(call_id, caller, callee).await?)
    }

    /// Authenticated callee declines a call from `caller`
    pub async fn reject_call(&self, callee: &UserId, call_id: &CallId, caller: &UserId) -> Result<()> {
        Ok(self.calls.reject_call(call_id, caller, callee).await?)
    }

    /// Reserve a stream id for `owner`
    pub async fn create_stream_slot(&self, owner: &UserId) -> StreamSlot {
        self.slots.create(owner).await
    }

    /// End an owned stream; every room member receives `StreamEnded`
    ///
    /// Returns how many members were notified.
    pub async fn end_stream(&self, stream_id: &StreamId, user: &UserId) -> Result<usize> {
        self.slots.end(stream_id, user).await?;
        Ok(self.rooms.end_room(stream_id).await)
    }

    // ========== Background work ==========

    /// Reclaim stream slots that never went live within `slot_ttl`
    pub async fn reclaim_slots(&self) -> usize {
        let live = self.rooms.live_streams().await;
        self.slots.reclaim(self.config.slot_ttl, &live).await
    }

    /// Spawn background cleanup task
    ///
    /// Reclaims stale calls and abandoned stream slots every call
    /// `cleanup_interval`. Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let interval = hub.calls.config().cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let calls = hub.calls.cleanup().await;
                let slots = hub.reclaim_slots().await;
                if calls > 0 || slots > 0 {
                    tracing::info!(calls = calls, slots = slots, "Stale sessions reclaimed");
                }
            }
        })
    }

    /// Build the audio broadcast pipeline, if one is configured
    pub fn broadcast_pipeline(&self) -> Option<BroadcastPipeline> {
        let config = self.config.broadcast.clone()?;
        Some(BroadcastPipeline::new(
            config,
            Arc::clone(&self.subscribers),
            Arc::clone(&self.connections),
            Arc::clone(&self.pipeline_stats),
        ))
    }

    /// Snapshot of hub-wide counters
    pub async fn stats(&self) -> HubStats {
        let calls = self.calls.counts().await;

        HubStats {
            connections: self.connections.len().await,
            online_users: self.presence.online_users().await,
            ringing_calls: calls.ringing,
            active_calls: calls.active,
            rooms: self.rooms.room_count().await,
            stream_slots: self.slots.len().await,
            audio_subscribers: self.subscribers.len().await,
            dropped_frames: self.connections.dropped_frames(),
            pipeline: self.pipeline_stats.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::call::CallError;
    use crate::protocol::ErrorCode;
    use crate::server::auth::TokenTable;

    struct Client {
        id: ConnectionId,
        rx: OutboundReceiver,
    }

    impl Client {
        fn events(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                if let Outbound::Event(event) = frame {
                    events.push(event);
                }
            }
            events
        }

        fn error_codes(&mut self) -> Vec<ErrorCode> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    ServerEvent::Error { code, .. } => Some(code),
                    _ => None,
                })
                .collect()
        }
    }

    fn hub() -> Hub {
        Hub::new(ServerConfig::default(), Arc::new(TokenTable::new()))
    }

    fn hub_with_tokens() -> (Hub, Arc<TokenTable>) {
        let tokens = Arc::new(TokenTable::new());
        let hub = Hub::new(ServerConfig::default(), tokens.clone());
        (hub, tokens)
    }

    fn attach_text(user_id: &str, token: &str) -> String {
        json!({"type": "attach_user_session", "user_id": user_id, "token": token}).to_string()
    }

    async fn attached(hub: &Hub, user: &str) -> Client {
        let (id, rx) = hub.open_connection().await;
        let mut client = Client { id, rx };
        hub.attach(id, &UserId::from(user)).await.unwrap();
        client.events();
        client
    }

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[tokio::test]
    async fn test_attach_announces_binding() {
        let (hub, tokens) = hub_with_tokens();
        let token = tokens.issue(&user("alice"));
        let (id, rx) = hub.open_connection().await;
        let mut client = Client { id, rx };

        hub.handle_text(id, &attach_text("alice", &token)).await;

        assert_eq!(
            client.events(),
            vec![ServerEvent::Attached {
                connection_id: id,
                user_id: user("alice"),
            }]
        );
        assert!(hub.presence().is_online(&user("alice")).await);
        assert!(hub.subscribers().contains(id).await);
    }

    #[tokio::test]
    async fn test_attach_other_user_refused() {
        let (hub, tokens) = hub_with_tokens();
        let bob_token = tokens.issue(&user("bob"));
        let mut client = attached(&hub, "alice").await;

        hub.handle_text(client.id, &attach_text("bob", &bob_token)).await;

        assert_eq!(client.error_codes(), vec![ErrorCode::AlreadyAttached]);
        assert!(!hub.presence().is_online(&user("bob")).await);
    }

    #[tokio::test]
    async fn test_attach_requires_matching_token() {
        let (hub, tokens) = hub_with_tokens();
        let alice_token = tokens.issue(&user("alice"));
        let mut alice = attached(&hub, "alice").await;
        let _bob = attached(&hub, "bob").await;
        let call_id = hub
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        let (id, rx) = hub.open_connection().await;
        let mut intruder = Client { id, rx };
        hub.handle_text(id, r#"{"type":"attach_user_session","user_id":"bob"}"#)
            .await;
        // A real token for someone else does not help
        hub.handle_text(id, &attach_text("bob", &alice_token)).await;

        assert_eq!(
            intruder.error_codes(),
            vec![ErrorCode::Unauthenticated, ErrorCode::Unauthenticated]
        );
        assert_eq!(hub.connections().user_of(id).await, None);

        let end = json!({"type": "end_call", "call_id": call_id});
        hub.handle_text(id, &end.to_string()).await;
        assert_eq!(intruder.error_codes(), vec![ErrorCode::Unauthenticated]);
        assert!(hub.calls().is_busy(&user("alice")).await);
        assert!(alice.events().is_empty());
    }

    #[tokio::test]
    async fn test_reattach_same_user_needs_no_token() {
        let hub = hub();
        let mut client = attached(&hub, "alice").await;

        hub.handle_text(client.id, r#"{"type":"attach_user_session","user_id":"alice"}"#)
            .await;

        assert!(matches!(
            client.events().as_slice(),
            [ServerEvent::Attached { .. }]
        ));
    }

    #[tokio::test]
    async fn test_requests_before_attach_are_unauthenticated() {
        let hub = hub();
        let (id, rx) = hub.open_connection().await;
        let mut client = Client { id, rx };

        hub.handle_text(id, r#"{"type":"join_room","stream_id":"s1","role":"listener"}"#)
            .await;
        hub.handle_text(id, r#"{"type":"end_call","call_id":"c1"}"#)
            .await;

        assert_eq!(
            client.error_codes(),
            vec![ErrorCode::Unauthenticated, ErrorCode::Unauthenticated]
        );
        // Connection stays usable
        assert!(hub.connections().is_open(id).await);
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let hub = hub();
        let mut client = attached(&hub, "alice").await;

        hub.handle_text(client.id, "{not json").await;
        hub.handle_text(client.id, r#"{"type":"warp_drive"}"#).await;

        assert_eq!(
            client.error_codes(),
            vec![ErrorCode::BadRequest, ErrorCode::BadRequest]
        );
    }

    #[tokio::test]
    async fn test_call_end_to_end() {
        let hub = hub();
        let mut alice = attached(&hub, "alice").await;
        let mut bob = attached(&hub, "bob").await;

        let call_id = hub
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();
        assert!(matches!(
            bob.events().as_slice(),
            [ServerEvent::IncomingCall { .. }]
        ));

        hub.accept_call(&user("bob"), &call_id, &user("alice"))
            .await
            .unwrap();
        assert_eq!(
            alice.events(),
            vec![ServerEvent::CallAccepted {
                call_id: call_id.clone()
            }]
        );

        let offer = json!({"type": "send_offer", "target": {"call": call_id}, "sdp": {"sdp": "v=0"}});
        hub.handle_text(alice.id, &offer.to_string()).await;
        assert_eq!(
            bob.events(),
            vec![ServerEvent::RtcOffer {
                call_id: call_id.clone(),
                from_user_id: user("alice"),
                sdp: json!({"sdp": "v=0"}),
            }]
        );

        let answer = json!({"type": "send_answer", "target": {"call": call_id}, "sdp": "answer"});
        hub.handle_text(bob.id, &answer.to_string()).await;
        assert_eq!(
            alice.events(),
            vec![ServerEvent::RtcAnswer {
                call_id: call_id.clone(),
                from_user_id: user("bob"),
                sdp: json!("answer"),
            }]
        );

        let end = json!({"type": "end_call", "call_id": call_id});
        hub.handle_text(alice.id, &end.to_string()).await;

        let hangup = ServerEvent::RtcHangup {
            call_id: call_id.clone(),
        };
        assert_eq!(alice.events(), vec![hangup.clone()]);
        assert_eq!(bob.events(), vec![hangup]);
        assert!(!hub.calls().is_busy(&user("alice")).await);
        assert!(!hub.calls().is_busy(&user("bob")).await);
    }

    #[tokio::test]
    async fn test_unknown_call_relay_is_silent() {
        let hub = hub();
        let mut alice = attached(&hub, "alice").await;

        let offer = json!({"type": "send_offer", "target": {"call": "ghost"}, "sdp": "x"});
        hub.handle_text(alice.id, &offer.to_string()).await;

        assert!(alice.events().is_empty());
    }

    #[tokio::test]
    async fn test_busy_and_offline() {
        let hub = hub();
        let _alice = attached(&hub, "alice").await;
        let _bob = attached(&hub, "bob").await;
        let _carol = attached(&hub, "carol").await;

        assert_ok!(
            hub.start_call(&user("alice"), &user("bob"), CallKind::Video)
                .await
        );

        let busy = hub
            .start_call(&user("carol"), &user("bob"), CallKind::Audio)
            .await;
        assert!(matches!(busy, Err(Error::Call(CallError::Busy(_)))));

        let offline = hub
            .start_call(&user("carol"), &user("dave"), CallKind::Audio)
            .await;
        assert!(matches!(offline, Err(Error::Call(CallError::Offline(_)))));
    }

    #[tokio::test]
    async fn test_last_disconnect_ends_calls() {
        let hub = hub();
        let mut alice = attached(&hub, "alice").await;
        let bob_phone = attached(&hub, "bob").await;
        let bob_laptop = attached(&hub, "bob").await;

        let call_id = hub
            .start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        // Bob still has a device online
        hub.disconnect(bob_phone.id).await;
        assert!(hub.calls().is_busy(&user("alice")).await);

        hub.disconnect(bob_laptop.id).await;
        assert_eq!(alice.events(), vec![ServerEvent::RtcHangup { call_id }]);
        assert!(!hub.calls().is_busy(&user("alice")).await);
        assert!(!hub.presence().is_online(&user("bob")).await);
    }

    #[tokio::test]
    async fn test_disconnect_fans_out_once() {
        let hub = hub();
        let broadcaster = attached(&hub, "alice").await;
        let mut listener = attached(&hub, "bob").await;

        hub.handle_text(
            broadcaster.id,
            r#"{"type":"join_room","stream_id":"s1","role":"broadcaster"}"#,
        )
        .await;
        hub.handle_text(
            listener.id,
            r#"{"type":"join_room","stream_id":"s1","role":"listener"}"#,
        )
        .await;
        listener.events();

        hub.disconnect(broadcaster.id).await;
        hub.disconnect(broadcaster.id).await;

        assert_eq!(
            listener.events(),
            vec![ServerEvent::StreamEnded {
                stream_id: StreamId::from("s1")
            }]
        );
        assert!(!hub.subscribers().contains(broadcaster.id).await);
        assert!(!hub.presence().is_online(&user("alice")).await);
    }

    #[tokio::test]
    async fn test_second_broadcaster_gets_error() {
        let hub = hub();
        let first = attached(&hub, "alice").await;
        let mut second = attached(&hub, "bob").await;
        let join = r#"{"type":"join_room","stream_id":"s1","role":"broadcaster"}"#;

        hub.handle_text(first.id, join).await;
        hub.handle_text(second.id, join).await;

        assert_eq!(
            second.error_codes(),
            vec![ErrorCode::BroadcasterAlreadyPresent]
        );
    }

    #[tokio::test]
    async fn test_end_stream_requires_owner() {
        let hub = hub();
        let mut owner = attached(&hub, "alice").await;

        let slot = hub.create_stream_slot(&user("alice")).await;
        let join = json!({"type": "join_room", "stream_id": slot.stream_id, "role": "broadcaster"});
        hub.handle_text(owner.id, &join.to_string()).await;

        assert_err!(hub.end_stream(&slot.stream_id, &user("mallory")).await);

        let notified = hub.end_stream(&slot.stream_id, &user("alice")).await.unwrap();
        assert_eq!(notified, 1);
        assert_eq!(
            owner.events(),
            vec![ServerEvent::StreamEnded {
                stream_id: slot.stream_id.clone()
            }]
        );
    }

    #[tokio::test]
    async fn test_slot_seat_reserved_for_owner() {
        let hub = hub();
        let mut owner = attached(&hub, "alice").await;
        let mut stranger = attached(&hub, "mallory").await;

        let slot = hub.create_stream_slot(&user("alice")).await;
        let join = json!({"type": "join_room", "stream_id": slot.stream_id, "role": "broadcaster"});

        hub.handle_text(stranger.id, &join.to_string()).await;
        assert_eq!(stranger.error_codes(), vec![ErrorCode::Forbidden]);
        assert!(hub.rooms().membership(stranger.id).await.is_none());

        hub.handle_text(owner.id, &join.to_string()).await;
        assert!(owner.error_codes().is_empty());
        assert_eq!(
            hub.rooms().membership(owner.id).await.map(|m| m.role),
            Some(Role::Broadcaster)
        );

        // Listening needs no ownership
        let listen = json!({"type": "join_room", "stream_id": slot.stream_id, "role": "listener"});
        hub.handle_text(stranger.id, &listen.to_string()).await;
        assert!(stranger.error_codes().is_empty());
    }

    #[tokio::test]
    async fn test_broadcaster_disconnect_releases_slot() {
        let hub = hub();
        let owner = attached(&hub, "alice").await;

        let slot = hub.create_stream_slot(&user("alice")).await;
        let join = json!({"type": "join_room", "stream_id": slot.stream_id, "role": "broadcaster"});
        hub.handle_text(owner.id, &join.to_string()).await;
        assert_eq!(hub.slots().len().await, 1);

        hub.disconnect(owner.id).await;

        assert!(hub.slots().is_empty().await);
        assert!(hub.slots().get(&slot.stream_id).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcaster_switching_rooms_releases_slot() {
        let hub = hub();
        let owner = attached(&hub, "alice").await;

        let slot = hub.create_stream_slot(&user("alice")).await;
        let join = json!({"type": "join_room", "stream_id": slot.stream_id, "role": "broadcaster"});
        hub.handle_text(owner.id, &join.to_string()).await;
        hub.handle_text(owner.id, &join.to_string()).await;
        assert_eq!(hub.slots().len().await, 1);

        hub.handle_text(
            owner.id,
            r#"{"type":"join_room","stream_id":"elsewhere","role":"listener"}"#,
        )
        .await;

        assert!(hub.slots().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_slots_are_reclaimed() {
        let hub = Hub::new(
            ServerConfig::default().slot_ttl(Duration::from_secs(60)),
            Arc::new(TokenTable::new()),
        );
        let owner = attached(&hub, "alice").await;

        let idle = hub.create_stream_slot(&user("alice")).await;
        let live = hub.create_stream_slot(&user("alice")).await;
        let join = json!({"type": "join_room", "stream_id": live.stream_id, "role": "broadcaster"});
        hub.handle_text(owner.id, &join.to_string()).await;

        assert_eq!(hub.reclaim_slots().await, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(hub.reclaim_slots().await, 1);
        assert!(hub.slots().get(&idle.stream_id).await.is_none());
        assert!(hub.slots().get(&live.stream_id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_reclaims_slots() {
        let hub = Arc::new(Hub::new(
            ServerConfig::default().slot_ttl(Duration::from_secs(20)),
            Arc::new(TokenTable::new()),
        ));
        hub.create_stream_slot(&user("alice")).await;

        let handle = hub.spawn_cleanup_task();
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert!(hub.slots().is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_audio_subscription_toggle() {
        let hub = Hub::new(
            ServerConfig::default().disable_auto_subscribe(),
            Arc::new(TokenTable::new()),
        );
        let client = attached(&hub, "alice").await;
        assert!(!hub.subscribers().contains(client.id).await);

        hub.handle_text(client.id, r#"{"type":"subscribe_audio"}"#).await;
        assert!(hub.subscribers().contains(client.id).await);

        hub.handle_text(client.id, r#"{"type":"unsubscribe_audio"}"#).await;
        assert!(!hub.subscribers().contains(client.id).await);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let hub = hub();
        let _alice = attached(&hub, "alice").await;
        let _bob = attached(&hub, "bob").await;

        hub.start_call(&user("alice"), &user("bob"), CallKind::Audio)
            .await
            .unwrap();

        let stats = hub.stats().await;
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.online_users, 2);
        assert_eq!(stats.ringing_calls, 1);
        assert_eq!(stats.audio_subscribers, 2);
    }

    #[test]
    fn test_authenticate() {
        let tokens = Arc::new(TokenTable::new());
        let token = tokens.issue(&user("alice"));
        let hub = Hub::new(ServerConfig::default(), tokens);

        assert_eq!(hub.authenticate(Some(&token)).unwrap(), user("alice"));
        assert!(matches!(
            hub.authenticate(Some("nope")),
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(hub.authenticate(None), Err(Error::Unauthenticated)));
    }
}
