use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{
    sync::{broadcast, mpsc, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use mentorlink_auth::User;

use super::events::{ClientEvent, ServerEvent, SignalKind};
use crate::{
    models::GoalStatus,
    services::{conversations, goals, requests, users, ServiceError},
    util::require_bearer,
    ApiError, AppState,
};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// `GET /ws`. The token comes from `?token=` or an `Authorization: Bearer`
/// header and is checked before the upgrade.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let token = match params.token.filter(|token| !token.trim().is_empty()) {
        Some(token) => token,
        None => require_bearer(&headers)?,
    };
    let (user, _) = state.authenticate(&token).await?;

    let Some(ws) = ws else {
        return Err(ApiError::new(
            StatusCode::UPGRADE_REQUIRED,
            "websocket upgrade required",
        ));
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut ws_sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) =
        mpsc::channel::<ServerEvent>(state.config().realtime.outbound_capacity.max(1));
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    warn!(%error, "failed to serialise server event");
                    continue;
                }
            };
            if let Err(error) = ws_sender.send(WsMessage::Text(json)).await {
                debug!(%error, "socket write failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut connection = Connection::open(state, user, out_tx).await;
    info!(user_id = connection.user.id, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => connection.handle(event).await,
                Err(error) => {
                    debug!(user_id = connection.user.id, %error, "unparsable client event");
                    connection.send(ServerEvent::error("Invalid event format")).await;
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(user_id = connection.user.id, %error, "websocket receive error");
                break;
            }
        }
    }

    let user_id = connection.user.id;
    connection.close().await;
    let _ = writer.await;
    info!(user_id, "websocket disconnected");
}

/// Count a new socket for `user`; the first one announces the user online.
pub(crate) async fn announce_connect(state: &AppState, user: &User) -> bool {
    let first = state.hub().connect(user.id).await;
    if first {
        state.hub().broadcast(ServerEvent::UserOnline {
            user_id: user.public_id.clone(),
        });
    }
    first
}

/// Count a closed socket. On the user's last one, `last_seen_at` is written
/// and `user_offline` is broadcast unless the user has reconnected since;
/// the timestamp is returned.
pub(crate) async fn announce_disconnect(state: &AppState, user: &User) -> Option<String> {
    if !state.hub().disconnect(user.id).await {
        return None;
    }

    let last_seen = match users::touch_last_seen(state.db_pool(), user.id).await {
        Ok(last_seen) => last_seen,
        Err(error) => {
            warn!(user_id = user.id, %error, "failed to record last seen");
            Utc::now().to_rfc3339()
        }
    };
    let announced = state
        .hub()
        .broadcast_unless_online(
            user.id,
            ServerEvent::UserOffline {
                user_id: user.public_id.clone(),
                last_seen: last_seen.clone(),
            },
        )
        .await;
    if !announced {
        debug!(user_id = user.id, "user reconnected, offline event suppressed");
    }
    Some(last_seen)
}

async fn public_ids(state: &AppState, ids: &[i64]) -> Result<Vec<String>, ServiceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = sqlx::query_scalar(
        "SELECT public_id FROM users WHERE id IN (SELECT value FROM json_each(?)) ORDER BY id",
    )
    .bind(serde_json::to_string(ids)?)
    .fetch_all(state.db_pool())
    .await?;
    Ok(ids)
}

/// Conversations a socket has joined, shared with its personal-room forwarder.
type Joined = Arc<RwLock<HashSet<String>>>;

/// Events a forwarder drops before they reach the socket.
enum Skip {
    Nothing,
    /// Conversation events the socket already gets from a joined room.
    JoinedConversations(Joined),
    /// Typing indicators from the socket's own user.
    OwnTyping(String),
}

impl Skip {
    async fn matches(&self, event: &ServerEvent) -> bool {
        match (self, event) {
            (
                Skip::JoinedConversations(joined),
                ServerEvent::NewMessage { conversation_id, .. }
                | ServerEvent::ReadReceipt { conversation_id, .. },
            ) => joined.read().await.contains(conversation_id),
            (Skip::OwnTyping(own), ServerEvent::Typing { user_id, .. }) => user_id == own,
            _ => false,
        }
    }
}

/// Relay a room into the socket's outbound queue until either side closes.
fn forward(
    mut room: broadcast::Receiver<ServerEvent>,
    out: mpsc::Sender<ServerEvent>,
    user_id: i64,
    skip: Skip,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match room.recv().await {
                Ok(event) => {
                    if skip.matches(&event).await {
                        continue;
                    }
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(user_id, skipped, "socket lagging behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// State of one open socket.
pub(crate) struct Connection {
    state: AppState,
    user: User,
    out: mpsc::Sender<ServerEvent>,
    forwarders: Vec<JoinHandle<()>>,
    conversations: HashMap<String, JoinHandle<()>>,
    joined: Joined,
}

impl Connection {
    /// Register presence, subscribe the personal room and lobby, and greet
    /// the client with the current online list.
    pub(crate) async fn open(state: AppState, user: User, out: mpsc::Sender<ServerEvent>) -> Self {
        announce_connect(&state, &user).await;

        let joined = Joined::default();
        let forwarders = vec![
            forward(
                state.hub().subscribe_user(user.id).await,
                out.clone(),
                user.id,
                Skip::JoinedConversations(joined.clone()),
            ),
            forward(state.hub().subscribe_lobby(), out.clone(), user.id, Skip::Nothing),
        ];

        let online = state.hub().online_users().await;
        let online_users = public_ids(&state, &online).await.unwrap_or_else(|error| {
            warn!(user_id = user.id, %error, "failed to resolve online users");
            Vec::new()
        });

        let connection = Self {
            state,
            user,
            out,
            forwarders,
            conversations: HashMap::new(),
            joined,
        };
        connection
            .send(ServerEvent::Hello {
                version: PROTOCOL_VERSION.to_string(),
                user_id: connection.user.public_id.clone(),
                online_users,
            })
            .await;
        connection
    }

    async fn send(&self, event: ServerEvent) {
        if self.out.send(event).await.is_err() {
            debug!(user_id = self.user.id, "outbound queue closed");
        }
    }

    /// Apply one client event. Failures are reported to this socket only.
    pub(crate) async fn handle(&mut self, event: ClientEvent) {
        if let Err(error) = self.dispatch(event).await {
            let ApiError { message, .. } = ApiError::from(error);
            self.send(ServerEvent::error(message)).await;
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<(), ServiceError> {
        match event {
            ClientEvent::Ping => self.send(ServerEvent::Pong).await,
            ClientEvent::JoinConversation { conversation_id } => self.join(conversation_id).await?,
            ClientEvent::LeaveConversation { conversation_id } => self.leave(conversation_id).await,
            ClientEvent::SendMessage {
                conversation_id,
                content,
            } => self.send_message(&conversation_id, &content).await?,
            ClientEvent::TypingStart { conversation_id } => self.typing(conversation_id, true).await?,
            ClientEvent::TypingStop { conversation_id } => self.typing(conversation_id, false).await?,
            ClientEvent::GoalCompleted { goal_id } => {
                goals::set_status(&self.state, &self.user, &goal_id, GoalStatus::Completed).await?;
            }
            ClientEvent::AvailabilityUpdated { availability } => {
                self.availability_updated(availability).await?
            }
            ClientEvent::WebrtcOffer {
                target_user_id,
                payload,
            } => self.signal(&target_user_id, SignalKind::Offer, payload).await?,
            ClientEvent::WebrtcAnswer {
                target_user_id,
                payload,
            } => self.signal(&target_user_id, SignalKind::Answer, payload).await?,
            ClientEvent::WebrtcIceCandidate {
                target_user_id,
                payload,
            } => {
                self.signal(&target_user_id, SignalKind::IceCandidate, payload)
                    .await?
            }
            ClientEvent::MarkRead {
                conversation_id,
                message_id,
            } => self.mark_read(&conversation_id, message_id.as_deref()).await?,
        }
        Ok(())
    }

    async fn join(&mut self, conversation_id: String) -> Result<(), ServiceError> {
        if !self.conversations.contains_key(&conversation_id) {
            conversations::membership(self.state.db_pool(), &conversation_id, self.user.id).await?;
            let room = self.state.hub().subscribe_conversation(&conversation_id).await;
            let handle = forward(
                room,
                self.out.clone(),
                self.user.id,
                Skip::OwnTyping(self.user.public_id.clone()),
            );
            // Mark joined only once subscribed so no message falls between the rooms.
            self.joined.write().await.insert(conversation_id.clone());
            self.conversations.insert(conversation_id.clone(), handle);
        }
        self.send(ServerEvent::Joined { conversation_id }).await;
        Ok(())
    }

    async fn leave(&mut self, conversation_id: String) {
        if let Some(handle) = self.conversations.remove(&conversation_id) {
            self.joined.write().await.remove(&conversation_id);
            handle.abort();
            let _ = handle.await;
            self.state.hub().release_conversation(&conversation_id).await;
        }
        self.send(ServerEvent::Left { conversation_id }).await;
    }

    async fn ensure_participant(&self, conversation_id: &str) -> Result<conversations::Membership, ServiceError> {
        conversations::membership(self.state.db_pool(), conversation_id, self.user.id).await
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<(), ServiceError> {
        let (message, recipients) =
            conversations::send_message(self.state.db_pool(), conversation_id, &self.user, content).await?;

        // Echo to this socket when it is not listening on the room.
        if !self.conversations.contains_key(conversation_id) {
            self.send(ServerEvent::NewMessage {
                conversation_id: message.conversation_id.clone(),
                message: message.clone(),
            })
            .await;
        }
        self.state
            .publish_message(&message, &self.user.display_name, &recipients)
            .await;
        Ok(())
    }

    async fn typing(&self, conversation_id: String, is_typing: bool) -> Result<(), ServiceError> {
        if !self.conversations.contains_key(&conversation_id) {
            self.ensure_participant(&conversation_id).await?;
        }
        self.state
            .hub()
            .send_to_conversation(
                &conversation_id,
                &ServerEvent::Typing {
                    conversation_id: conversation_id.clone(),
                    user_id: self.user.public_id.clone(),
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    async fn availability_updated(&self, availability: serde_json::Value) -> Result<(), ServiceError> {
        users::publish_availability(&self.state, &self.user, &availability).await?;
        Ok(())
    }

    async fn signal(
        &self,
        target_user_id: &str,
        kind: SignalKind,
        payload: serde_json::Value,
    ) -> Result<(), ServiceError> {
        let pool = self.state.db_pool();
        let target = users::find_by_public_id(pool, target_user_id).await?;

        let related = conversations::shares_conversation(pool, self.user.id, target.id).await?
            || requests::accepted_between(pool, self.user.id, target.id)
                .await?
                .is_some();
        if !related {
            return Err(ServiceError::forbidden(
                "Signalling requires a shared conversation or mentorship",
            ));
        }

        let delivered = self
            .state
            .hub()
            .send_to_user(
                target.id,
                &ServerEvent::WebrtcSignal {
                    from_user_id: self.user.public_id.clone(),
                    kind,
                    payload,
                },
            )
            .await;
        if delivered == 0 {
            return Err(ServiceError::not_found("User is not connected"));
        }
        Ok(())
    }

    async fn mark_read(&self, conversation_id: &str, message_id: Option<&str>) -> Result<(), ServiceError> {
        let membership = self.ensure_participant(conversation_id).await?;
        if let Some(marker) =
            conversations::mark_read(self.state.db_pool(), conversation_id, self.user.id, message_id).await?
        {
            self.state
                .publish_read_receipt(&membership, &self.user, marker)
                .await;
        }
        Ok(())
    }

    /// Stop every forwarder, then release rooms and presence.
    pub(crate) async fn close(self) {
        let Self {
            state,
            user,
            forwarders,
            conversations,
            ..
        } = self;

        for handle in &forwarders {
            handle.abort();
        }
        for handle in conversations.values() {
            handle.abort();
        }
        for handle in forwarders {
            let _ = handle.await;
        }
        for (conversation_id, handle) in conversations {
            let _ = handle.await;
            state.hub().release_conversation(&conversation_id).await;
        }

        announce_disconnect(&state, &user).await;
    }
}
