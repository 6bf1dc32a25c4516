//! AI assistant: persisted chat, goal drafting and profile embeddings.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use mentorlink_ai::{goal_suggestion_messages, parse_goal_suggestions, ChatMessage, ChatRole, GoalSuggestion};
use mentorlink_auth::User;

use super::{error::ServiceError, users};
use crate::models::{AiTurn, Profile};
use crate::AppState;

pub const MAX_PROMPT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestGoalsRequest {
    #[serde(default)]
    pub focus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub model: String,
    pub reply: AiTurn,
}

/// The caller's most recent turns, oldest first.
pub async fn history(pool: &SqlitePool, user_id: i64, limit: usize) -> Result<Vec<AiTurn>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT role, content, created_at FROM (
            SELECT id, role, content, created_at
            FROM ai_conversations
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
        ) ORDER BY id ASC
        "#,
    )
    .bind(user_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AiTurn {
                role: row.try_get("role")?,
                content: row.try_get("content")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn clear_history(pool: &SqlitePool, user_id: i64) -> Result<u64, ServiceError> {
    let result = sqlx::query("DELETE FROM ai_conversations WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn to_chat_message(turn: &AiTurn) -> ChatMessage {
    match turn.role.as_str() {
        "assistant" => ChatMessage::assistant(turn.content.clone()),
        _ => ChatMessage::user(turn.content.clone()),
    }
}

/// Send a message to the assistant with the recent history as context. Both
/// turns are stored only when the provider answers.
pub async fn chat(state: &AppState, user: &User, req: ChatRequest) -> Result<ChatReply, ServiceError> {
    let prompt = req.message.trim();
    if prompt.is_empty() {
        return Err(ServiceError::bad_request("message cannot be empty"));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ServiceError::bad_request(format!(
            "message must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }

    let ai = state.ai()?;
    let pool = state.db_pool();
    let config = &state.config().ai;

    let previous = history(pool, user.id, config.history_window).await?;
    let mut messages = Vec::with_capacity(previous.len() + 2);
    messages.push(ChatMessage::system(config.system_prompt.clone()));
    messages.extend(previous.iter().map(to_chat_message));
    messages.push(ChatMessage::user(prompt));

    let answer = ai.chat(&messages).await.map_err(|error| {
        warn!(user_id = user.id, %error, "assistant request failed");
        error
    })?;

    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;
    for (role, content) in [(ChatRole::User, prompt), (ChatRole::Assistant, answer.as_str())] {
        sqlx::query("INSERT INTO ai_conversations (user_id, role, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id)
            .bind(role.as_str())
            .bind(content)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(user_id = user.id, chat = previous.len() + 1, "assistant replied");
    Ok(ChatReply {
        model: ai.chat_model().to_string(),
        reply: AiTurn {
            role: ChatRole::Assistant.as_str().to_string(),
            content: answer,
            created_at: now,
        },
    })
}

fn goal_context(profile: &Profile, existing: &[String], focus: Option<&str>) -> String {
    let mut context = profile.embedding_text();
    if !existing.is_empty() {
        context.push_str("\nCurrent goals: ");
        context.push_str(&existing.join("; "));
    }
    if let Some(focus) = focus.map(str::trim).filter(|focus| !focus.is_empty()) {
        context.push_str("\nFocus: ");
        context.push_str(focus);
    }
    context
}

/// Ask the assistant for SMART goal drafts based on the caller's profile.
/// Nothing is stored; the client creates the goals it keeps.
pub async fn suggest_goals(
    state: &AppState,
    user: &User,
    req: SuggestGoalsRequest,
) -> Result<Vec<GoalSuggestion>, ServiceError> {
    let ai = state.ai()?;
    let pool = state.db_pool();

    let profile = users::load_profile(pool, user.id).await?;
    let existing: Vec<String> = sqlx::query_scalar(
        "SELECT title FROM goals WHERE user_id = ? AND status IN ('NOT_STARTED', 'IN_PROGRESS') ORDER BY id",
    )
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    let context = goal_context(&profile, &existing, req.focus.as_deref());
    let reply = ai
        .chat(&goal_suggestion_messages(&state.config().ai.system_prompt, &context))
        .await?;

    let suggestions = parse_goal_suggestions(&reply);
    info!(user_id = user.id, count = suggestions.len(), "goal suggestions drafted");
    Ok(suggestions)
}

/// Re-embed the caller's profile text and store the vector.
pub async fn refresh_profile_embedding(state: &AppState, user_id: i64) -> Result<Profile, ServiceError> {
    let ai = state.ai()?;
    let pool = state.db_pool();

    let profile = users::load_profile(pool, user_id).await?;
    let embedding = ai.embed(&profile.embedding_text()).await?;
    if embedding.is_empty() {
        return Err(ServiceError::Ai(mentorlink_ai::AiError::EmptyResponse("embedding")));
    }
    users::store_profile_embedding(pool, user_id, &embedding).await?;

    info!(user_id, dimensions = embedding.len(), "profile embedding refreshed");
    users::load_profile(pool, user_id).await
}
