use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use mentorlink_auth::User;

use super::{error::ServiceError, requests};
use crate::models::{clean_list, Profile, UserSummary, UserView};
use crate::realtime::ServerEvent;
use crate::AppState;

const USER_COLUMNS: &str =
    "u.id, u.public_id, u.display_name, u.role, u.points, u.level, u.last_seen_at, u.created_at";

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub skills: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
    pub goals: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn user_summary(pool: &SqlitePool, user_id: i64) -> Result<UserSummary, ServiceError> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("User not found"))?;
    UserSummary::from_row(&row)
}

pub async fn find_by_public_id(pool: &SqlitePool, public_id: &str) -> Result<UserSummary, ServiceError> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.public_id = ?"))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("User not found"))?;
    UserSummary::from_row(&row)
}

pub async fn load_profile(pool: &SqlitePool, user_id: i64) -> Result<Profile, ServiceError> {
    let row = sqlx::query(
        r#"
        SELECT bio, skills, interests, goals, avatar_url, availability, embedding, updated_at
        FROM profiles WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Profile not found"))?;
    Profile::from_row(&row)
}

/// Full view of a user. `email` is only included when `include_email` is set
/// (the caller looking at themselves, or an admin).
pub async fn user_view(
    pool: &SqlitePool,
    user_id: i64,
    include_email: bool,
    online: bool,
) -> Result<UserView, ServiceError> {
    let user = user_summary(pool, user_id).await?;
    let profile = load_profile(pool, user_id).await?;

    let (average_rating, review_count): (Option<f64>, i64) = sqlx::query_as(
        "SELECT AVG(CAST(rating AS REAL)), COUNT(*) FROM reviews WHERE mentor_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let email = if include_email {
        Some(
            sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await?,
        )
    } else {
        None
    };

    Ok(UserView {
        user,
        email,
        online,
        profile,
        average_rating,
        review_count,
    })
}

pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    req: UpdateProfileRequest,
) -> Result<Profile, ServiceError> {
    let now = Utc::now().to_rfc3339();

    if let Some(display_name) = req.display_name.as_deref() {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ServiceError::bad_request("display_name cannot be empty"));
        }
        sqlx::query("UPDATE users SET display_name = ?, updated_at = ? WHERE id = ?")
            .bind(display_name)
            .bind(&now)
            .bind(user_id)
            .execute(pool)
            .await?;
    }

    let skills = req
        .skills
        .map(|skills| serde_json::to_string(&clean_list(skills)))
        .transpose()?;
    let interests = req
        .interests
        .map(|interests| serde_json::to_string(&clean_list(interests)))
        .transpose()?;
    let avatar_url = req.avatar_url.map(|url| url.trim().to_string());

    sqlx::query(
        r#"
        UPDATE profiles
        SET bio = COALESCE(?, bio),
            skills = COALESCE(?, skills),
            interests = COALESCE(?, interests),
            goals = COALESCE(?, goals),
            avatar_url = CASE WHEN ? IS NULL THEN avatar_url WHEN ? = '' THEN NULL ELSE ? END,
            updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(req.bio.as_deref().map(str::trim))
    .bind(skills)
    .bind(interests)
    .bind(req.goals.as_deref().map(str::trim))
    .bind(avatar_url.as_deref())
    .bind(avatar_url.as_deref())
    .bind(avatar_url.as_deref())
    .bind(&now)
    .bind(user_id)
    .execute(pool)
    .await?;

    load_profile(pool, user_id).await
}

/// Replace the availability document. It must be a JSON array or object.
pub async fn update_availability(
    pool: &SqlitePool,
    user_id: i64,
    availability: &Value,
) -> Result<Profile, ServiceError> {
    if !(availability.is_array() || availability.is_object()) {
        return Err(ServiceError::bad_request(
            "availability must be a JSON array or object",
        ));
    }

    sqlx::query("UPDATE profiles SET availability = ?, updated_at = ? WHERE user_id = ?")
        .bind(serde_json::to_string(availability)?)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(pool)
        .await?;

    load_profile(pool, user_id).await
}

/// Store availability, then push it to the user and their mentorship partners.
pub async fn publish_availability(
    state: &AppState,
    user: &User,
    availability: &Value,
) -> Result<Profile, ServiceError> {
    let profile = update_availability(state.db_pool(), user.id, availability).await?;

    let mut audience = requests::partner_ids(state.db_pool(), user.id).await?;
    audience.push(user.id);
    state
        .broadcast_to_users(
            audience,
            &ServerEvent::AvailabilityUpdated {
                user_id: user.public_id.clone(),
                availability: profile.availability.clone(),
            },
        )
        .await;
    Ok(profile)
}

pub async fn store_profile_embedding(
    pool: &SqlitePool,
    user_id: i64,
    embedding: &[f32],
) -> Result<(), ServiceError> {
    sqlx::query("UPDATE profiles SET embedding = ? WHERE user_id = ?")
        .bind(serde_json::to_string(embedding)?)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mentors, optionally filtered by a skill (case-insensitive), best rated first.
pub async fn list_mentors(
    pool: &SqlitePool,
    skill: Option<&str>,
    limit: i64,
) -> Result<Vec<UserView>, ServiceError> {
    let skill = skill.map(str::trim).filter(|skill| !skill.is_empty());

    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT u.id
        FROM users u
        JOIN profiles p ON p.user_id = u.id
        WHERE u.role = 'mentor'
          AND (?1 IS NULL OR EXISTS (
                SELECT 1 FROM json_each(p.skills) s WHERE lower(s.value) = lower(?1)))
        ORDER BY (SELECT AVG(rating) FROM reviews r WHERE r.mentor_id = u.id) DESC NULLS LAST,
                 u.points DESC, u.id ASC
        LIMIT ?2
        "#,
    )
    .bind(skill)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut mentors = Vec::with_capacity(ids.len());
    for id in ids {
        mentors.push(user_view(pool, id, false, false).await?);
    }
    Ok(mentors)
}

pub async fn touch_last_seen(pool: &SqlitePool, user_id: i64) -> Result<String, ServiceError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE users SET last_seen_at = ? WHERE id = ?")
        .bind(&now)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_test_db, create_test_user};
    use mentorlink_auth::Role;
    use serde_json::json;

    #[tokio::test]
    async fn update_profile_cleans_lists_and_keeps_untouched_fields() {
        let (pool, _dir) = create_test_db().await;
        let user = create_test_user(&pool, "ada", Role::Mentor).await;

        update_profile(
            &pool,
            user.id,
            UpdateProfileRequest {
                bio: Some("  Systems programmer ".into()),
                skills: Some(vec!["Rust".into(), " rust".into(), "SQL".into()]),
                avatar_url: Some("https://img.example.com/a.png".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let profile = update_profile(
            &pool,
            user.id,
            UpdateProfileRequest {
                goals: Some("Mentor two people".into()),
                avatar_url: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(profile.bio, "Systems programmer");
        assert_eq!(profile.skills, vec!["Rust".to_string(), "SQL".to_string()]);
        assert_eq!(profile.goals, "Mentor two people");
        assert!(profile.avatar_url.is_none(), "empty string clears the avatar");
    }

    #[tokio::test]
    async fn update_profile_rejects_blank_display_name() {
        let (pool, _dir) = create_test_db().await;
        let user = create_test_user(&pool, "blank", Role::Mentee).await;

        let result = update_profile(
            &pool,
            user.id,
            UpdateProfileRequest {
                display_name: Some("   ".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn availability_must_be_structured() {
        let (pool, _dir) = create_test_db().await;
        let user = create_test_user(&pool, "slots", Role::Mentor).await;

        let slots = json!([{ "day": "mon", "from": "09:00", "to": "11:00" }]);
        let profile = update_availability(&pool, user.id, &slots).await.unwrap();
        assert_eq!(profile.availability, slots);

        assert!(matches!(
            update_availability(&pool, user.id, &json!("weekends")).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn list_mentors_filters_by_skill() {
        let (pool, _dir) = create_test_db().await;
        let rustacean = create_test_user(&pool, "rustacean", Role::Mentor).await;
        let gopher = create_test_user(&pool, "gopher", Role::Mentor).await;
        create_test_user(&pool, "mentee", Role::Mentee).await;

        for (user, skill) in [(&rustacean, "Rust"), (&gopher, "Go")] {
            update_profile(
                &pool,
                user.id,
                UpdateProfileRequest {
                    skills: Some(vec![skill.into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let all = list_mentors(&pool, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let rust = list_mentors(&pool, Some("rust"), 10).await.unwrap();
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].user.public_id, rustacean.public_id);
        assert!(rust[0].email.is_none());
    }

    #[tokio::test]
    async fn user_view_includes_email_only_on_request() {
        let (pool, _dir) = create_test_db().await;
        let user = create_test_user(&pool, "viewer", Role::Mentee).await;

        let own = user_view(&pool, user.id, true, true).await.unwrap();
        assert_eq!(own.email.as_deref(), Some("viewer@example.com"));
        assert!(own.online);
        assert_eq!(own.review_count, 0);
        assert!(own.average_rating.is_none());

        let public = user_view(&pool, user.id, false, false).await.unwrap();
        assert!(public.email.is_none());
    }
}
