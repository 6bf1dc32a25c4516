//! Records returned by the service layer and serialised by the routes.
//!
//! JSON-valued columns (skills, tags, availability, embeddings) are stored as
//! text and decoded here; rows are read by hand via `from_row`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};

use mentorlink_auth::Role;

use crate::services::ServiceError;

/// Minimal reference to another user, embedded in most records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub public_id: String,
    pub display_name: String,
}

impl UserRef {
    fn from_prefixed(row: &SqliteRow, prefix: &str) -> Result<Self, sqlx::Error> {
        Ok(Self {
            public_id: row.try_get(format!("{prefix}_public_id").as_str())?,
            display_name: row.try_get(format!("{prefix}_name").as_str())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub display_name: String,
    pub role: Role,
    pub points: i64,
    pub level: i64,
    pub last_seen_at: Option<String>,
    pub created_at: String,
}

impl UserSummary {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            display_name: row.try_get("display_name")?,
            role: role.parse()?,
            points: row.try_get("points")?,
            level: row.try_get("level")?,
            last_seen_at: row.try_get("last_seen_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub bio: String,
    pub skills: Vec<String>,
    pub interests: Vec<String>,
    pub goals: String,
    pub avatar_url: Option<String>,
    pub availability: Value,
    pub has_embedding: bool,
    pub updated_at: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Profile {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let skills: String = row.try_get("skills")?;
        let interests: String = row.try_get("interests")?;
        let availability: String = row.try_get("availability")?;
        let embedding = decode_embedding(row.try_get("embedding")?);
        Ok(Self {
            bio: row.try_get("bio")?,
            skills: decode_list(&skills),
            interests: decode_list(&interests),
            goals: row.try_get("goals")?,
            avatar_url: row.try_get("avatar_url")?,
            availability: serde_json::from_str(&availability).unwrap_or(Value::Array(Vec::new())),
            has_embedding: embedding.is_some(),
            updated_at: row.try_get("updated_at")?,
            embedding,
        })
    }

    /// Text fed to the embedding model for this profile.
    pub fn embedding_text(&self) -> String {
        format!(
            "Bio: {}\nSkills: {}\nInterests: {}\nGoals: {}",
            self.bio,
            self.skills.join(", "),
            self.interests.join(", "),
            self.goals
        )
    }
}

/// A user as shown on profile pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub online: bool,
    pub profile: Profile,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ServiceError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ServiceError::bad_request(format!(
                        "unknown {} `{}`",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

status_enum!(RequestStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

status_enum!(SessionStatus {
    Scheduled => "SCHEDULED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

status_enum!(GoalStatus {
    NotStarted => "NOT_STARTED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Abandoned => "ABANDONED",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipRequest {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub mentor_id: i64,
    #[serde(skip)]
    pub mentee_id: i64,
    pub public_id: String,
    pub mentor: UserRef,
    pub mentee: UserRef,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: String,
    pub responded_at: Option<String>,
}

impl MentorshipRequest {
    pub(crate) const SELECT: &'static str = r#"
        SELECT r.id, r.public_id, r.mentor_id, r.mentee_id, r.message, r.status,
               r.created_at, r.responded_at,
               mu.public_id AS mentor_public_id, mu.display_name AS mentor_name,
               eu.public_id AS mentee_public_id, eu.display_name AS mentee_name
        FROM mentorship_requests r
        JOIN users mu ON mu.id = r.mentor_id
        JOIN users eu ON eu.id = r.mentee_id
    "#;

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            mentor_id: row.try_get("mentor_id")?,
            mentee_id: row.try_get("mentee_id")?,
            public_id: row.try_get("public_id")?,
            mentor: UserRef::from_prefixed(row, "mentor")?,
            mentee: UserRef::from_prefixed(row, "mentee")?,
            message: row.try_get("message")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            responded_at: row.try_get("responded_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipSession {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub mentor_id: i64,
    #[serde(skip)]
    pub mentee_id: i64,
    pub public_id: String,
    pub mentorship_id: String,
    pub mentor: UserRef,
    pub mentee: UserRef,
    pub title: String,
    pub agenda: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub status: SessionStatus,
    pub feedback: Option<String>,
    pub rating: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl MentorshipSession {
    pub(crate) const SELECT: &'static str = r#"
        SELECT s.id, s.public_id, s.mentor_id, s.mentee_id, s.title, s.agenda,
               s.scheduled_at, s.duration_minutes, s.status, s.feedback, s.rating,
               s.created_at, s.updated_at,
               r.public_id AS mentorship_public_id,
               mu.public_id AS mentor_public_id, mu.display_name AS mentor_name,
               eu.public_id AS mentee_public_id, eu.display_name AS mentee_name
        FROM mentorship_sessions s
        JOIN mentorship_requests r ON r.id = s.mentorship_id
        JOIN users mu ON mu.id = s.mentor_id
        JOIN users eu ON eu.id = s.mentee_id
    "#;

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            mentor_id: row.try_get("mentor_id")?,
            mentee_id: row.try_get("mentee_id")?,
            public_id: row.try_get("public_id")?,
            mentorship_id: row.try_get("mentorship_public_id")?,
            mentor: UserRef::from_prefixed(row, "mentor")?,
            mentee: UserRef::from_prefixed(row, "mentee")?,
            title: row.try_get("title")?,
            agenda: row.try_get("agenda")?,
            scheduled_at: row.try_get("scheduled_at")?,
            duration_minutes: row.try_get("duration_minutes")?,
            status: status.parse()?,
            feedback: row.try_get("feedback")?,
            rating: row.try_get("rating")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub public_id: String,
    pub title: String,
    pub specific: Option<String>,
    pub measurable: Option<String>,
    pub achievable: Option<String>,
    pub relevant: Option<String>,
    pub time_bound: Option<String>,
    pub target_date: Option<String>,
    pub status: GoalStatus,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Goal {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            public_id: row.try_get("public_id")?,
            title: row.try_get("title")?,
            specific: row.try_get("specific")?,
            measurable: row.try_get("measurable")?,
            achievable: row.try_get("achievable")?,
            relevant: row.try_get("relevant")?,
            time_bound: row.try_get("time_bound")?,
            target_date: row.try_get("target_date")?,
            status: status.parse()?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub conversation_id: String,
    pub sender: UserRef,
    pub content: String,
    pub created_at: String,
}

impl Message {
    pub(crate) const SELECT: &'static str = r#"
        SELECT m.id, m.public_id, m.content, m.created_at,
               c.public_id AS conversation_public_id,
               u.public_id AS sender_public_id, u.display_name AS sender_name
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        JOIN users u ON u.id = m.sender_id
    "#;

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        Ok(Self {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            conversation_id: row.try_get("conversation_public_id")?,
            sender: UserRef::from_prefixed(row, "sender")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub title: Option<String>,
    pub participants: Vec<UserRef>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: String,
}

impl Notification {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("type")?,
            title: row.try_get("title")?,
            body: row.try_get("body")?,
            link: row.try_get("link")?,
            read: row.try_get("read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub kind: String,
    pub tags: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Resource {
    pub(crate) const SELECT: &'static str = r#"
        SELECT r.id, r.public_id, r.title, r.url, r.description, r.kind, r.tags,
               r.embedding, r.created_at, u.public_id AS creator_public_id
        FROM resources r
        LEFT JOIN users u ON u.id = r.created_by
    "#;

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        let tags: String = row.try_get("tags")?;
        Ok(Self {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            title: row.try_get("title")?,
            url: row.try_get("url")?,
            description: row.try_get("description")?,
            kind: row.try_get("kind")?,
            tags: decode_list(&tags),
            created_by: row.try_get("creator_public_id")?,
            created_at: row.try_get("created_at")?,
            embedding: decode_embedding(row.try_get("embedding")?),
        })
    }

    /// Text fed to the embedding model for this resource.
    pub fn embedding_text(&self) -> String {
        format!(
            "Title: {}\nDescription: {}\nTags: {}",
            self.title,
            self.description,
            self.tags.join(", ")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub public_id: String,
    pub mentorship_id: String,
    pub reviewer: UserRef,
    pub mentor_id: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

impl Review {
    pub(crate) const SELECT: &'static str = r#"
        SELECT v.public_id, v.rating, v.comment, v.created_at,
               r.public_id AS mentorship_public_id,
               ru.public_id AS reviewer_public_id, ru.display_name AS reviewer_name,
               mu.public_id AS mentor_public_id
        FROM reviews v
        JOIN mentorship_requests r ON r.id = v.mentorship_id
        JOIN users ru ON ru.id = v.reviewer_id
        JOIN users mu ON mu.id = v.mentor_id
    "#;

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, ServiceError> {
        Ok(Self {
            public_id: row.try_get("public_id")?,
            mentorship_id: row.try_get("mentorship_public_id")?,
            reviewer: UserRef::from_prefixed(row, "reviewer")?,
            mentor_id: row.try_get("mentor_public_id")?,
            rating: row.try_get("rating")?,
            comment: row.try_get("comment")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTurn {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub(crate) fn decode_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

pub(crate) fn decode_embedding(text: Option<String>) -> Option<Vec<f32>> {
    text.and_then(|value| serde_json::from_str::<Vec<f32>>(&value).ok())
        .filter(|vector| !vector.is_empty())
}

/// Trim entries, drop blanks and duplicates while keeping first-seen order.
pub(crate) fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|existing| existing.eq_ignore_ascii_case(value)) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}
