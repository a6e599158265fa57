use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::content::ContentRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Harassment,
    Copyright,
    Misinformation,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Harassment => "harassment",
            ReportReason::Copyright => "copyright",
            ReportReason::Misinformation => "misinformation",
            ReportReason::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "spam" => Ok(ReportReason::Spam),
            "inappropriate" => Ok(ReportReason::Inappropriate),
            "harassment" => Ok(ReportReason::Harassment),
            "copyright" => Ok(ReportReason::Copyright),
            "misinformation" => Ok(ReportReason::Misinformation),
            "other" => Ok(ReportReason::Other),
            other => Err(CoreError::Validation(format!(
                "unknown report reason '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InReview,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InReview => "in_review",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "in_review" => Ok(ReportStatus::InReview),
            "resolved" => Ok(ReportStatus::Resolved),
            "rejected" => Ok(ReportStatus::Rejected),
            other => Err(CoreError::Validation(format!(
                "unknown report status '{other}'"
            ))),
        }
    }

    /// A report still awaiting a moderator decision.
    pub fn is_open(&self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::InReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub target: ContentRef,
    pub reason: ReportReason,
    pub note: String,
    pub status: ReportStatus,
    pub moderator_id: Option<Uuid>,
    pub moderator_note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Hide,
    Delete,
    Warn,
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Hide => "hide",
            ModerationAction::Delete => "delete",
            ModerationAction::Warn => "warn",
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "hide" => Ok(ModerationAction::Hide),
            "delete" => Ok(ModerationAction::Delete),
            "warn" => Ok(ModerationAction::Warn),
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            other => Err(CoreError::Validation(format!(
                "unknown moderation action '{other}'"
            ))),
        }
    }
}

/// Audit record of a moderator decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorAction {
    pub id: Option<Uuid>,
    pub moderator_id: Uuid,
    pub action: ModerationAction,
    pub target: ContentRef,
    pub report_id: Option<Uuid>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}
