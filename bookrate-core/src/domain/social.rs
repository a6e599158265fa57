use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::content::ContentRef;

/// A user following another user, an author, or a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: Option<Uuid>,
    pub follower_id: Uuid,
    pub target: ContentRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    ReviewLike,
    ReviewComment,
    CommentReply,
    CommentLike,
    NewReview,
    CollectionItem,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "follow",
            NotificationKind::ReviewLike => "review_like",
            NotificationKind::ReviewComment => "review_comment",
            NotificationKind::CommentReply => "comment_reply",
            NotificationKind::CommentLike => "comment_like",
            NotificationKind::NewReview => "new_review",
            NotificationKind::CollectionItem => "collection_item",
            NotificationKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "follow" => Ok(NotificationKind::Follow),
            "review_like" => Ok(NotificationKind::ReviewLike),
            "review_comment" => Ok(NotificationKind::ReviewComment),
            "comment_reply" => Ok(NotificationKind::CommentReply),
            "comment_like" => Ok(NotificationKind::CommentLike),
            "new_review" => Ok(NotificationKind::NewReview),
            "collection_item" => Ok(NotificationKind::CollectionItem),
            "system" => Ok(NotificationKind::System),
            other => Err(CoreError::Validation(format!(
                "unknown notification kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<Uuid>,
    /// Recipient.
    pub user_id: Uuid,
    pub kind: NotificationKind,
    /// The content that triggered the notification, when there is one.
    pub source: Option<ContentRef>,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub visibility: crate::domain::Visibility,
    pub book_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: Option<Uuid>,
    pub collection_id: Uuid,
    pub book_id: Uuid,
    pub notes: String,
    pub position: u32,
    pub added_at: DateTime<Utc>,
}
