use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use mentorlink_auth::{new_public_id, Role, User};

use super::error::ServiceError;
use crate::models::{clean_list, Resource};
use crate::AppState;

const RESOURCE_KINDS: &[&str] = &["article", "video", "course", "book", "podcast", "tool", "other"];

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn validate_url(url: &str) -> Result<&str, ServiceError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(url)
    } else {
        Err(ServiceError::bad_request("url must start with http:// or https://"))
    }
}

fn validate_kind(kind: Option<&str>) -> Result<String, ServiceError> {
    let kind = kind
        .map(|kind| kind.trim().to_ascii_lowercase())
        .filter(|kind| !kind.is_empty())
        .unwrap_or_else(|| "article".to_string());
    if RESOURCE_KINDS.contains(&kind.as_str()) {
        Ok(kind)
    } else {
        Err(ServiceError::bad_request(format!(
            "kind must be one of: {}",
            RESOURCE_KINDS.join(", ")
        )))
    }
}

/// Resources, newest first, optionally restricted to a tag.
pub async fn list_resources(
    pool: &SqlitePool,
    tag: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Resource>, ServiceError> {
    let tag = tag.map(str::trim).filter(|tag| !tag.is_empty());
    let rows = sqlx::query(&format!(
        r#"{} WHERE (?1 IS NULL OR EXISTS (
                SELECT 1 FROM json_each(r.tags) t WHERE lower(t.value) = lower(?1)))
           ORDER BY r.created_at DESC, r.id DESC
           LIMIT ?2 OFFSET ?3"#,
        Resource::SELECT
    ))
    .bind(tag)
    .bind(limit)
    .bind(offset.max(0))
    .fetch_all(pool)
    .await?;

    rows.iter().map(Resource::from_row).collect()
}

pub async fn get_resource(pool: &SqlitePool, public_id: &str) -> Result<Resource, ServiceError> {
    let row = sqlx::query(&format!("{} WHERE r.public_id = ?", Resource::SELECT))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Resource not found"))?;
    Resource::from_row(&row)
}

/// Store a resource, then try to embed it. Embedding failures are logged and
/// leave the resource without a vector.
pub async fn create_resource(
    state: &AppState,
    user: &User,
    req: CreateResourceRequest,
) -> Result<Resource, ServiceError> {
    let pool = state.db_pool();

    let title = req.title.trim();
    if title.is_empty() {
        return Err(ServiceError::bad_request("title is required"));
    }
    let url = validate_url(&req.url)?;
    let kind = validate_kind(req.kind.as_deref())?;
    let tags = serde_json::to_string(&clean_list(req.tags))?;
    let public_id = new_public_id();

    sqlx::query(
        r#"
        INSERT INTO resources (public_id, title, url, description, kind, tags, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(title)
    .bind(url)
    .bind(req.description.trim())
    .bind(&kind)
    .bind(&tags)
    .bind(user.id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let mut resource = get_resource(pool, &public_id).await?;
    info!(resource = %resource.public_id, user_id = user.id, "resource created");

    if let Ok(ai) = state.ai() {
        match ai.embed(&resource.embedding_text()).await {
            Ok(embedding) if !embedding.is_empty() => {
                match store_embedding(pool, resource.id, &embedding).await {
                    Ok(()) => resource.embedding = Some(embedding),
                    Err(error) => warn!(resource = %resource.public_id, %error, "failed to store resource embedding"),
                }
            }
            Ok(_) => warn!(resource = %resource.public_id, "provider returned an empty embedding"),
            Err(error) => warn!(resource = %resource.public_id, %error, "failed to embed resource"),
        }
    }

    Ok(resource)
}

pub async fn store_embedding(pool: &SqlitePool, resource_id: i64, embedding: &[f32]) -> Result<(), ServiceError> {
    sqlx::query("UPDATE resources SET embedding = ? WHERE id = ?")
        .bind(serde_json::to_string(embedding)?)
        .bind(resource_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a resource. Allowed for its creator and for admins.
pub async fn delete_resource(pool: &SqlitePool, user: &User, public_id: &str) -> Result<(), ServiceError> {
    let resource = get_resource(pool, public_id).await?;
    let is_creator = resource.created_by.as_deref() == Some(user.public_id.as_str());
    if !is_creator && user.role != Role::Admin {
        return Err(ServiceError::forbidden("Only the creator or an admin can delete this resource"));
    }

    sqlx::query("DELETE FROM resources WHERE id = ?")
        .bind(resource.id)
        .execute(pool)
        .await?;
    info!(resource = %resource.public_id, user_id = user.id, "resource deleted");
    Ok(())
}
