use std::sync::Arc;

use axum::http::HeaderMap;
use sqlx::SqlitePool;
use tracing::warn;

use mentorlink_ai::AiProvider;
use mentorlink_auth::{AuthSession, Authenticator, User};
use mentorlink_config::AppConfig;

use crate::{
    models::{Message, Notification},
    realtime::{Hub, ServerEvent},
    services::{conversations::Membership, notifications, notifications::NewNotification, ServiceError},
    util::require_bearer,
    ApiError,
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    authenticator: Authenticator,
    ai: Option<Arc<dyn AiProvider>>,
    config: Arc<AppConfig>,
    hub: Hub,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        ai: Option<Arc<dyn AiProvider>>,
        config: AppConfig,
    ) -> Self {
        let hub = Hub::new(config.realtime.channel_capacity);
        Self {
            db_pool,
            authenticator,
            ai,
            config: Arc::new(config),
            hub,
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// The configured AI provider, or `ServiceError::Ai(NotConfigured)`.
    pub fn ai(&self) -> Result<Arc<dyn AiProvider>, ServiceError> {
        self.ai
            .clone()
            .ok_or(ServiceError::Ai(mentorlink_ai::AiError::NotConfigured))
    }

    pub fn ai_configured(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }

    /// Resolve the bearer token in `headers` to a user.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let token = require_bearer(headers)?;
        let (user, _) = self.authenticate(&token).await?;
        Ok(user)
    }

    /// Persist a notification and push it to the recipient's personal room.
    pub async fn notify(
        &self,
        user_id: i64,
        notification: NewNotification<'_>,
    ) -> Result<Notification, ServiceError> {
        let notification = notifications::create(&self.db_pool, user_id, notification).await?;
        self.hub
            .send_to_user(
                user_id,
                &ServerEvent::Notification {
                    notification: notification.clone(),
                },
            )
            .await;
        Ok(notification)
    }

    /// Like [`AppState::notify`], but failures are logged instead of returned.
    /// Used after the primary write has already committed.
    pub async fn notify_quietly(&self, user_id: i64, notification: NewNotification<'_>) {
        if let Err(error) = self.notify(user_id, notification).await {
            warn!(user_id, %error, "failed to deliver notification");
        }
    }

    pub async fn broadcast_to_user(&self, user_id: i64, event: &ServerEvent) {
        self.hub.send_to_user(user_id, event).await;
    }

    pub async fn broadcast_to_users<I>(&self, user_ids: I, event: &ServerEvent)
    where
        I: IntoIterator<Item = i64>,
    {
        self.hub.send_to_users(user_ids, event).await;
    }

    /// Relay a stored message: conversation room, each recipient's personal
    /// room, then a notification row per recipient.
    pub async fn publish_message(&self, message: &Message, sender_name: &str, recipients: &[i64]) {
        let event = ServerEvent::NewMessage {
            conversation_id: message.conversation_id.clone(),
            message: message.clone(),
        };
        self.hub
            .send_to_conversation(&message.conversation_id, &event)
            .await;
        self.hub
            .send_to_users(recipients.iter().copied(), &event)
            .await;

        let link = format!("/messages/{}", message.conversation_id);
        let preview: String = message.content.chars().take(120).collect();
        for recipient in recipients {
            self.notify_quietly(
                *recipient,
                NewNotification {
                    kind: "message",
                    title: &format!("New message from {sender_name}"),
                    body: &preview,
                    link: Some(&link),
                },
            )
            .await;
        }
    }

    /// Tell the conversation (and the other participants' personal rooms)
    /// how far `reader` has read.
    pub async fn publish_read_receipt(&self, membership: &Membership, reader: &User, message_id: String) {
        let receipt = ServerEvent::ReadReceipt {
            conversation_id: membership.public_id.clone(),
            user_id: reader.public_id.clone(),
            message_id,
        };
        self.hub
            .send_to_conversation(&membership.public_id, &receipt)
            .await;
        self.hub
            .send_to_users(membership.others(reader.id), &receipt)
            .await;
    }
}
