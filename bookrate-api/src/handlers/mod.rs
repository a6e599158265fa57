pub mod auth;
pub mod books;
pub mod moderation;
pub mod reviews;
pub mod search;
pub mod shelves;
pub mod social;

use bookrate_core::{Role, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Public view of a user. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct UserOut {
    pub id: Option<Uuid>,
    pub username: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserOut {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}
