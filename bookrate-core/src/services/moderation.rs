use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::notify::notify;
use crate::common::error::{CoreError, Result};
use crate::content::{ensure_kind, ContentKind, ContentRef, REPORTABLE_KINDS};
use crate::domain::*;
use crate::storage::Storage;

#[derive(Clone)]
pub struct ModerationService {
    storage: Arc<dyn Storage>,
}

impl ModerationService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn require_moderator(user: &User) -> Result<()> {
        if user.is_moderator() {
            Ok(())
        } else {
            Err(CoreError::Forbidden(
                "moderator role required".to_string(),
            ))
        }
    }

    async fn ensure_target_exists(&self, target: ContentRef) -> Result<()> {
        let exists = match target.kind {
            ContentKind::Review => self.storage.get_review_by_id(target.id).await?.is_some(),
            ContentKind::Comment => self.storage.get_comment_by_id(target.id).await?.is_some(),
            ContentKind::User => self.storage.get_user_by_id(target.id).await?.is_some(),
            ContentKind::Collection => {
                self.storage.get_collection_by_id(target.id).await?.is_some()
            }
            _ => false,
        };
        if exists {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!(
                "{} {}",
                target.kind, target.id
            )))
        }
    }

    /// File a report. One open report per (reporter, target).
    pub async fn submit_report(
        &self,
        user: &User,
        target: ContentRef,
        reason: ReportReason,
        note: Option<String>,
    ) -> Result<Report> {
        ensure_kind(target, REPORTABLE_KINDS, "report")?;
        self.ensure_target_exists(target).await?;
        let reporter_id = user.id.expect("authenticated user has id");

        if self
            .storage
            .find_open_report(reporter_id, target)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(
                "you already have an open report for this content".to_string(),
            ));
        }

        let now = Utc::now();
        let mut report = Report {
            id: None,
            reporter_id,
            target,
            reason,
            note: note.unwrap_or_default(),
            status: ReportStatus::Pending,
            moderator_id: None,
            moderator_note: String::new(),
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        self.storage.create_report(&mut report).await?;
        Ok(report)
    }

    pub async fn list_reports(
        &self,
        moderator: &User,
        status: Option<ReportStatus>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Report>> {
        Self::require_moderator(moderator)?;
        self.storage.list_reports(status, limit, offset).await
    }

    pub async fn get_report(&self, moderator: &User, report_id: Uuid) -> Result<Report> {
        Self::require_moderator(moderator)?;
        self.storage
            .get_report_by_id(report_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("report".to_string()))
    }

    /// Move a pending report into review under this moderator.
    pub async fn claim_report(&self, moderator: &User, report_id: Uuid) -> Result<Report> {
        Self::require_moderator(moderator)?;
        let mut report = self
            .storage
            .get_report_by_id(report_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("report".to_string()))?;
        if report.status != ReportStatus::Pending {
            return Err(CoreError::Validation(format!(
                "report is {}, not pending",
                report.status.as_str()
            )));
        }
        report.status = ReportStatus::InReview;
        report.moderator_id = moderator.id;
        report.updated_at = Utc::now();
        self.storage.update_report(&report).await?;
        Ok(report)
    }

    /// Hide the reported content (reviews and comments only), and re-run the
    /// counter consistency rules it participates in.
    async fn apply_hide(&self, target: ContentRef) -> Result<()> {
        match target.kind {
            ContentKind::Review => {
                let mut review = self
                    .storage
                    .get_review_by_id(target.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
                review.status = ReviewStatus::Hidden;
                review.updated_at = Utc::now();
                self.storage.update_review(&review).await?;
                self.refresh_book_aggregates(review.book_id).await
            }
            ContentKind::Comment => {
                let mut comment = self
                    .storage
                    .get_comment_by_id(target.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
                comment.status = CommentStatus::Hidden;
                comment.updated_at = Utc::now();
                self.storage.update_comment(&comment).await?;
                self.refresh_comment_count(comment.review_id).await
            }
            other => Err(CoreError::Validation(format!(
                "cannot hide content of kind '{other}'"
            ))),
        }
    }

    /// Soft-delete the reported content.
    async fn apply_delete(&self, target: ContentRef) -> Result<()> {
        match target.kind {
            ContentKind::Review => {
                let mut review = self
                    .storage
                    .get_review_by_id(target.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
                review.is_active = false;
                review.updated_at = Utc::now();
                self.storage.update_review(&review).await?;
                self.refresh_book_aggregates(review.book_id).await
            }
            ContentKind::Comment => {
                let mut comment = self
                    .storage
                    .get_comment_by_id(target.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
                comment.is_active = false;
                comment.status = CommentStatus::Deleted;
                comment.updated_at = Utc::now();
                self.storage.update_comment(&comment).await?;
                self.refresh_comment_count(comment.review_id).await
            }
            ContentKind::Collection => {
                let mut collection = self
                    .storage
                    .get_collection_by_id(target.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
                collection.is_active = false;
                collection.updated_at = Utc::now();
                self.storage.update_collection(&collection).await
            }
            other => Err(CoreError::Validation(format!(
                "cannot delete content of kind '{other}'"
            ))),
        }
    }

    /// Warn the owner of the reported content.
    async fn apply_warn(&self, target: ContentRef, note: &str) -> Result<()> {
        let owner = match target.kind {
            ContentKind::Review => self
                .storage
                .get_review_by_id(target.id)
                .await?
                .map(|r| r.user_id),
            ContentKind::Comment => self
                .storage
                .get_comment_by_id(target.id)
                .await?
                .map(|c| c.user_id),
            ContentKind::Collection => self
                .storage
                .get_collection_by_id(target.id)
                .await?
                .map(|c| c.user_id),
            ContentKind::User => Some(target.id),
            _ => None,
        };
        let owner = owner.ok_or_else(|| CoreError::NotFound("reported content".to_string()))?;
        let message = if note.is_empty() {
            "A moderator has issued a warning about your content".to_string()
        } else {
            format!("A moderator has issued a warning: {note}")
        };
        notify(
            self.storage.as_ref(),
            owner,
            NotificationKind::System,
            Some(target),
            message,
        )
        .await;
        Ok(())
    }

    async fn refresh_book_aggregates(&self, book_id: Uuid) -> Result<()> {
        let mut stats = self.storage.book_rating_stats(book_id).await?;
        stats.avg_rating = (stats.avg_rating * 100.0).round() / 100.0;
        self.storage.set_book_aggregates(book_id, stats).await
    }

    async fn refresh_comment_count(&self, review_id: Uuid) -> Result<()> {
        if let Some(mut review) = self.storage.get_review_by_id(review_id).await? {
            review.comment_count = self.storage.count_public_comments(review_id).await?;
            self.storage.update_review(&review).await?;
        }
        Ok(())
    }

    /// Resolve an open report with an action. The action is applied to the
    /// reported content, an audit record is written, and the report is
    /// closed (rejected for `Reject`, resolved otherwise).
    pub async fn resolve_report(
        &self,
        moderator: &User,
        report_id: Uuid,
        action: ModerationAction,
        note: Option<String>,
    ) -> Result<Report> {
        Self::require_moderator(moderator)?;
        let mut report = self
            .storage
            .get_report_by_id(report_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("report".to_string()))?;
        if !report.status.is_open() {
            return Err(CoreError::Validation(
                "report is already closed".to_string(),
            ));
        }

        let note = note.unwrap_or_default();
        match action {
            ModerationAction::Hide => self.apply_hide(report.target).await?,
            ModerationAction::Delete => self.apply_delete(report.target).await?,
            ModerationAction::Warn => self.apply_warn(report.target, &note).await?,
            ModerationAction::Approve | ModerationAction::Reject => {}
        }

        let now = Utc::now();
        let mut audit = ModeratorAction {
            id: None,
            moderator_id: moderator.id.expect("authenticated user has id"),
            action,
            target: report.target,
            report_id: report.id,
            note: note.clone(),
            created_at: now,
        };
        self.storage.create_moderator_action(&mut audit).await?;

        report.status = if action == ModerationAction::Reject {
            ReportStatus::Rejected
        } else {
            ReportStatus::Resolved
        };
        report.moderator_id = moderator.id;
        report.moderator_note = note;
        report.updated_at = now;
        report.resolved_at = Some(now);
        self.storage.update_report(&report).await?;

        info!(
            "Report {} resolved with action '{}' by {}",
            report_id,
            action.as_str(),
            moderator.username
        );
        Ok(report)
    }

    pub async fn list_actions(
        &self,
        moderator: &User,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ModeratorAction>> {
        Self::require_moderator(moderator)?;
        self.storage.list_moderator_actions(limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accounts::AccountService;
    use crate::services::catalog::{CatalogService, NewBook};
    use crate::services::reviews::{NewReview, ReviewService};
    use crate::storage::InMemoryStorage;

    struct Fixture {
        storage: Arc<dyn Storage>,
        accounts: AccountService,
        catalog: CatalogService,
        reviews: ReviewService,
        moderation: ModerationService,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Fixture {
            accounts: AccountService::new(storage.clone()),
            catalog: CatalogService::new(storage.clone()),
            reviews: ReviewService::new(storage.clone()),
            moderation: ModerationService::new(storage.clone()),
            storage,
        }
    }

    async fn register(fx: &Fixture, name: &str) -> User {
        let (user, _) = fx
            .accounts
            .register(name, &format!("{name}@example.com"), "correcthorse")
            .await
            .unwrap();
        user
    }

    async fn register_moderator(fx: &Fixture, name: &str) -> User {
        let mut user = register(fx, name).await;
        user.role = Role::Moderator;
        fx.storage.update_user(&user).await.unwrap();
        user
    }

    async fn reviewed_book(fx: &Fixture, author: &User) -> (Uuid, Review) {
        let book = fx
            .catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let review = fx
            .reviews
            .create_review(
                author,
                NewReview {
                    book_id: book.id.unwrap(),
                    title: "Spam review".to_string(),
                    body_md: "buy pills".to_string(),
                    rating: Some(5.0),
                    status: None,
                },
            )
            .await
            .unwrap();
        (book.id.unwrap(), review)
    }

    #[tokio::test]
    async fn non_moderators_cannot_list_reports() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let err = fx
            .moderation
            .list_reports(&alice, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn duplicate_open_reports_conflict() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let (_, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        fx.moderation
            .submit_report(&bob, target, ReportReason::Spam, None)
            .await
            .unwrap();
        let err = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Spam, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn hide_resolution_removes_review_from_aggregates() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let moderator = register_moderator(&fx, "mod").await;
        let (book_id, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        let report = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Spam, None)
            .await
            .unwrap();
        let resolved = fx
            .moderation
            .resolve_report(
                &moderator,
                report.id.unwrap(),
                ModerationAction::Hide,
                Some("obvious spam".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let stored = fx
            .storage
            .get_review_by_id(review.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReviewStatus::Hidden);

        let book = fx.storage.get_book_by_id(book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 0);
        assert_eq!(book.rating_count, 0);

        let actions = fx
            .moderation
            .list_actions(&moderator, None, None)
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ModerationAction::Hide);
    }

    #[tokio::test]
    async fn reject_leaves_content_untouched() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let moderator = register_moderator(&fx, "mod").await;
        let (book_id, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        let report = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Other, None)
            .await
            .unwrap();
        let resolved = fx
            .moderation
            .resolve_report(&moderator, report.id.unwrap(), ModerationAction::Reject, None)
            .await
            .unwrap();
        assert_eq!(resolved.status, ReportStatus::Rejected);

        let book = fx.storage.get_book_by_id(book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 1);
    }

    #[tokio::test]
    async fn resolved_reports_are_immutable() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let moderator = register_moderator(&fx, "mod").await;
        let (_, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        let report = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Spam, None)
            .await
            .unwrap();
        fx.moderation
            .resolve_report(&moderator, report.id.unwrap(), ModerationAction::Approve, None)
            .await
            .unwrap();
        let err = fx
            .moderation
            .resolve_report(&moderator, report.id.unwrap(), ModerationAction::Hide, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn claim_moves_pending_to_in_review() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let moderator = register_moderator(&fx, "mod").await;
        let (_, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        let report = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Spam, None)
            .await
            .unwrap();
        let claimed = fx
            .moderation
            .claim_report(&moderator, report.id.unwrap())
            .await
            .unwrap();
        assert_eq!(claimed.status, ReportStatus::InReview);

        // claiming twice fails
        assert!(fx
            .moderation
            .claim_report(&moderator, report.id.unwrap())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn warn_notifies_the_content_owner() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let moderator = register_moderator(&fx, "mod").await;
        let (_, review) = reviewed_book(&fx, &alice).await;
        let target = ContentRef::new(ContentKind::Review, review.id.unwrap());

        let report = fx
            .moderation
            .submit_report(&bob, target, ReportReason::Harassment, None)
            .await
            .unwrap();
        fx.moderation
            .resolve_report(
                &moderator,
                report.id.unwrap(),
                ModerationAction::Warn,
                Some("tone it down".to_string()),
            )
            .await
            .unwrap();

        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::System));
    }
}
