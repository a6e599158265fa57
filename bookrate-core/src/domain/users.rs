use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(Role::Member),
            "moderator" => Ok(Role::Moderator),
            other => Err(CoreError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<Uuid>,
    pub username: String,
    pub email: String,
    /// Salted digest in `salt$hash` form. Never serialized to API clients.
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }
}

/// Per-user profile and notification preferences, one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub bio: String,
    pub location: String,
    pub website: String,
    pub facebook_url: String,
    pub twitter_url: String,
    pub instagram_url: String,
    pub language: String,
    pub notify_follow: bool,
    pub notify_review_like: bool,
    pub notify_comment: bool,
    pub notify_mention: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new_default(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            bio: String::new(),
            location: String::new(),
            website: String::new(),
            facebook_url: String::new(),
            twitter_url: String::new(),
            instagram_url: String::new(),
            language: "en".to_string(),
            notify_follow: true,
            notify_review_like: true,
            notify_comment: true,
            notify_mention: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An authenticated API session, addressed by its bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Single-use email verification token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}
