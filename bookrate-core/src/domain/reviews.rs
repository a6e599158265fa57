use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::content::ContentRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Draft,
    Public,
    Hidden,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Draft => "draft",
            ReviewStatus::Public => "public",
            ReviewStatus::Hidden => "hidden",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(ReviewStatus::Draft),
            "public" => Ok(ReviewStatus::Public),
            "hidden" => Ok(ReviewStatus::Hidden),
            other => Err(CoreError::Validation(format!(
                "unknown review status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Option<Uuid>,
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body_md: String,
    /// Derived from `body_md` on every write; never accepted from clients.
    pub body_html: String,
    /// Half-star steps in [1.0, 5.0], or None for an unrated review.
    pub rating: Option<f64>,
    pub status: ReviewStatus,
    pub is_active: bool,
    pub like_count: u32,
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Review {
    /// A review counts toward a book's aggregates only while public and active.
    pub fn counts_for_book(&self) -> bool {
        self.status == ReviewStatus::Public && self.is_active
    }
}

/// Validate a rating value: half-star steps between 1.0 and 5.0.
pub fn validate_rating(rating: f64) -> Result<()> {
    if !(1.0..=5.0).contains(&rating) {
        return Err(CoreError::Validation(
            "rating must be between 1.0 and 5.0".to_string(),
        ));
    }
    let doubled = rating * 2.0;
    if (doubled - doubled.round()).abs() > f64::EPSILON {
        return Err(CoreError::Validation(
            "rating must be in half-star steps".to_string(),
        ));
    }
    Ok(())
}

/// Snapshot of a review's previous contents, taken on every edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRevision {
    pub id: Option<Uuid>,
    pub review_id: Uuid,
    pub title: String,
    pub body_md: String,
    pub body_html: String,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Public,
    Hidden,
    Deleted,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Public => "public",
            CommentStatus::Hidden => "hidden",
            CommentStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(CommentStatus::Public),
            "hidden" => Ok(CommentStatus::Hidden),
            "deleted" => Ok(CommentStatus::Deleted),
            other => Err(CoreError::Validation(format!(
                "unknown comment status '{other}'"
            ))),
        }
    }
}

pub const COMMENT_MAX_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<Uuid>,
    pub review_id: Uuid,
    pub user_id: Uuid,
    /// One-level threading: a reply's parent must be a top-level comment on
    /// the same review.
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub status: CommentStatus,
    pub is_active: bool,
    pub like_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn counts_for_review(&self) -> bool {
        self.status == CommentStatus::Public && self.is_active
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A user's like of a review or comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub target: ContentRef,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_and_steps() {
        assert!(validate_rating(1.0).is_ok());
        assert!(validate_rating(3.5).is_ok());
        assert!(validate_rating(5.0).is_ok());
        assert!(validate_rating(0.5).is_err());
        assert!(validate_rating(5.5).is_err());
        assert!(validate_rating(3.7).is_err());
    }
}
