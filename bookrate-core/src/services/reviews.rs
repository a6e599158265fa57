use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::notify::notify;
use crate::common::error::{CoreError, Result};
use crate::content::{ContentKind, ContentRef};
use crate::domain::*;
use crate::markdown::render_body;
use crate::storage::{ReviewFilter, Storage};

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub book_id: Uuid,
    pub title: String,
    pub body_md: String,
    pub rating: Option<f64>,
    pub status: Option<ReviewStatus>,
}

/// Partial review update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewUpdate {
    pub title: Option<String>,
    pub body_md: Option<String>,
    pub rating: Option<f64>,
    pub status: Option<ReviewStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub review_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
}

#[derive(Clone)]
pub struct ReviewService {
    storage: Arc<dyn Storage>,
}

impl ReviewService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Recompute a book's denormalized rating fields from its public,
    /// active reviews. Averages are rounded to two decimals.
    async fn refresh_book_aggregates(&self, book_id: Uuid) -> Result<()> {
        let mut stats = self.storage.book_rating_stats(book_id).await?;
        stats.avg_rating = (stats.avg_rating * 100.0).round() / 100.0;
        self.storage.set_book_aggregates(book_id, stats).await
    }

    /// Recompute a review's comment_count from its public, active comments.
    async fn refresh_comment_count(&self, review_id: Uuid) -> Result<()> {
        if let Some(mut review) = self.storage.get_review_by_id(review_id).await? {
            review.comment_count = self.storage.count_public_comments(review_id).await?;
            self.storage.update_review(&review).await?;
        }
        Ok(())
    }

    async fn fan_out_new_review(&self, review: &Review, author: &User) {
        let author_id = review.user_id;
        let follower_ids = match self
            .storage
            .list_follower_ids(ContentRef::new(ContentKind::User, author_id))
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Failed to load followers for new_review fan-out: {}", e);
                return;
            }
        };
        let book_title = match self.storage.get_book_by_id(review.book_id).await {
            Ok(Some(book)) => book.title,
            _ => String::new(),
        };
        let source = review.id.map(|id| ContentRef::new(ContentKind::Review, id));
        for follower_id in follower_ids {
            if follower_id == author_id {
                continue;
            }
            notify(
                self.storage.as_ref(),
                follower_id,
                NotificationKind::NewReview,
                source,
                format!(
                    "{} posted a new review of \"{}\"",
                    author.username, book_title
                ),
            )
            .await;
        }
    }

    /// Create a review. One review per (user, book); the book's aggregates
    /// are refreshed, and followers of the author are notified when the
    /// review is born public.
    pub async fn create_review(&self, user: &User, input: NewReview) -> Result<Review> {
        let user_id = user.id.expect("authenticated user has id");
        let book = self
            .storage
            .get_book_by_id(input.book_id)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound("book".to_string()))?;
        let book_id = book.id.expect("stored book has id");

        if input.title.trim().is_empty() {
            return Err(CoreError::Validation("review title is required".to_string()));
        }
        if let Some(rating) = input.rating {
            validate_rating(rating)?;
        }
        if self
            .storage
            .get_review_by_user_and_book(user_id, book_id)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(
                "you have already reviewed this book".to_string(),
            ));
        }

        let now = Utc::now();
        let mut review = Review {
            id: None,
            book_id,
            user_id,
            body_html: render_body(&input.body_md),
            title: input.title,
            body_md: input.body_md,
            rating: input.rating,
            status: input.status.unwrap_or(ReviewStatus::Public),
            is_active: true,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            edited_at: None,
        };
        self.storage.create_review(&mut review).await?;
        self.refresh_book_aggregates(book_id).await?;

        if review.counts_for_book() {
            self.fan_out_new_review(&review, user).await;
        }
        Ok(review)
    }

    /// Update own review: snapshot the previous contents as a revision,
    /// apply the changes, stamp edited_at, refresh book aggregates.
    pub async fn update_review(
        &self,
        user: &User,
        review_id: Uuid,
        update: ReviewUpdate,
    ) -> Result<Review> {
        let mut review = self
            .storage
            .get_review_by_id(review_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
        if review.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "only the author may edit a review".to_string(),
            ));
        }
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }

        let now = Utc::now();
        let mut revision = ReviewRevision {
            id: None,
            review_id,
            title: review.title.clone(),
            body_md: review.body_md.clone(),
            body_html: review.body_html.clone(),
            rating: review.rating,
            created_at: now,
        };
        self.storage.create_review_revision(&mut revision).await?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(CoreError::Validation("review title is required".to_string()));
            }
            review.title = title;
        }
        if let Some(body_md) = update.body_md {
            review.body_html = render_body(&body_md);
            review.body_md = body_md;
        }
        if let Some(rating) = update.rating {
            review.rating = Some(rating);
        }
        if let Some(status) = update.status {
            review.status = status;
        }
        review.updated_at = now;
        review.edited_at = Some(now);
        self.storage.update_review(&review).await?;
        self.refresh_book_aggregates(review.book_id).await?;
        Ok(review)
    }

    /// Delete own review and refresh the book's aggregates.
    pub async fn delete_review(&self, user: &User, review_id: Uuid) -> Result<()> {
        let review = self
            .storage
            .get_review_by_id(review_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
        if review.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "only the author may delete a review".to_string(),
            ));
        }
        self.storage.delete_review(review_id).await?;
        self.refresh_book_aggregates(review.book_id).await?;
        info!("Deleted review {}", review_id);
        Ok(())
    }

    pub async fn get_review(&self, review_id: Uuid) -> Result<Review> {
        self.storage
            .get_review_by_id(review_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| CoreError::NotFound("review".to_string()))
    }

    pub async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        self.storage.list_reviews(filter).await
    }

    /// Edit history of own review, newest first.
    pub async fn list_revisions(&self, user: &User, review_id: Uuid) -> Result<Vec<ReviewRevision>> {
        let review = self
            .storage
            .get_review_by_id(review_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
        if review.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "only the author may view a review's history".to_string(),
            ));
        }
        self.storage.list_review_revisions(review_id).await
    }

    async fn refresh_like_count(&self, target: ContentRef) -> Result<()> {
        let count = self.storage.count_likes(target).await?;
        match target.kind {
            ContentKind::Review => {
                if let Some(mut review) = self.storage.get_review_by_id(target.id).await? {
                    review.like_count = count;
                    self.storage.update_review(&review).await?;
                }
            }
            ContentKind::Comment => {
                if let Some(mut comment) = self.storage.get_comment_by_id(target.id).await? {
                    comment.like_count = count;
                    self.storage.update_comment(&comment).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn recipient_allows(&self, recipient: Uuid, check: fn(&Profile) -> bool) -> bool {
        match self.storage.get_profile_by_user(recipient).await {
            Ok(Some(profile)) => check(&profile),
            _ => true,
        }
    }

    /// Like a review. Returns false when the like already existed.
    pub async fn like_review(&self, user: &User, review_id: Uuid) -> Result<bool> {
        let user_id = user.id.expect("authenticated user has id");
        let review = self.get_review(review_id).await?;
        let target = ContentRef::new(ContentKind::Review, review_id);

        if self.storage.get_like(user_id, target).await?.is_some() {
            return Ok(false);
        }
        let mut like = Like {
            id: None,
            user_id,
            target,
            created_at: Utc::now(),
        };
        self.storage.create_like(&mut like).await?;
        self.refresh_like_count(target).await?;

        if review.user_id != user_id
            && self
                .recipient_allows(review.user_id, |p| p.notify_review_like)
                .await
        {
            let book_title = match self.storage.get_book_by_id(review.book_id).await {
                Ok(Some(book)) => book.title,
                _ => String::new(),
            };
            notify(
                self.storage.as_ref(),
                review.user_id,
                NotificationKind::ReviewLike,
                Some(target),
                format!("{} liked your review of \"{}\"", user.username, book_title),
            )
            .await;
        }
        Ok(true)
    }

    pub async fn unlike_review(&self, user: &User, review_id: Uuid) -> Result<()> {
        let user_id = user.id.expect("authenticated user has id");
        self.get_review(review_id).await?;
        let target = ContentRef::new(ContentKind::Review, review_id);
        self.storage.delete_like(user_id, target).await?;
        self.refresh_like_count(target).await
    }

    /// Like a comment. Returns false when the like already existed.
    pub async fn like_comment(&self, user: &User, comment_id: Uuid) -> Result<bool> {
        let user_id = user.id.expect("authenticated user has id");
        let comment = self
            .storage
            .get_comment_by_id(comment_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
        let target = ContentRef::new(ContentKind::Comment, comment_id);

        if self.storage.get_like(user_id, target).await?.is_some() {
            return Ok(false);
        }
        let mut like = Like {
            id: None,
            user_id,
            target,
            created_at: Utc::now(),
        };
        self.storage.create_like(&mut like).await?;
        self.refresh_like_count(target).await?;

        if comment.user_id != user_id
            && self
                .recipient_allows(comment.user_id, |p| p.notify_review_like)
                .await
        {
            notify(
                self.storage.as_ref(),
                comment.user_id,
                NotificationKind::CommentLike,
                Some(target),
                format!("{} liked your comment", user.username),
            )
            .await;
        }
        Ok(true)
    }

    pub async fn unlike_comment(&self, user: &User, comment_id: Uuid) -> Result<()> {
        let user_id = user.id.expect("authenticated user has id");
        self.storage
            .get_comment_by_id(comment_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
        let target = ContentRef::new(ContentKind::Comment, comment_id);
        self.storage.delete_like(user_id, target).await?;
        self.refresh_like_count(target).await
    }

    /// Comment on a review, optionally replying to a top-level comment on
    /// the same review. Refreshes the review's comment_count and notifies
    /// the review owner (or the parent comment's owner for replies).
    pub async fn create_comment(&self, user: &User, input: NewComment) -> Result<Comment> {
        let user_id = user.id.expect("authenticated user has id");
        let body = input.body.trim().to_string();
        if body.is_empty() {
            return Err(CoreError::Validation("comment body is required".to_string()));
        }
        if body.len() > COMMENT_MAX_LEN {
            return Err(CoreError::Validation(format!(
                "comment body exceeds {COMMENT_MAX_LEN} characters"
            )));
        }

        let review = self
            .storage
            .get_review_by_id(input.review_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| CoreError::NotFound("review".to_string()))?;
        let review_id = review.id.expect("stored review has id");

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .storage
                    .get_comment_by_id(parent_id)
                    .await?
                    .filter(|c| c.is_active)
                    .ok_or_else(|| CoreError::NotFound("parent comment".to_string()))?;
                if parent.review_id != review_id {
                    return Err(CoreError::Validation(
                        "parent comment belongs to a different review".to_string(),
                    ));
                }
                if parent.is_reply() {
                    return Err(CoreError::Validation(
                        "replies cannot be nested".to_string(),
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let now = Utc::now();
        let mut comment = Comment {
            id: None,
            review_id,
            user_id,
            parent_id: input.parent_id,
            body,
            status: CommentStatus::Public,
            is_active: true,
            like_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_comment(&mut comment).await?;
        self.refresh_comment_count(review_id).await?;

        let source = comment
            .id
            .map(|id| ContentRef::new(ContentKind::Comment, id));
        let book_title = match self.storage.get_book_by_id(review.book_id).await {
            Ok(Some(book)) => book.title,
            _ => String::new(),
        };
        match parent {
            Some(parent) if parent.user_id != user_id => {
                if self
                    .recipient_allows(parent.user_id, |p| p.notify_comment)
                    .await
                {
                    notify(
                        self.storage.as_ref(),
                        parent.user_id,
                        NotificationKind::CommentReply,
                        source,
                        format!(
                            "{} replied to your comment on the review of \"{}\"",
                            user.username, book_title
                        ),
                    )
                    .await;
                }
            }
            None if review.user_id != user_id => {
                if self
                    .recipient_allows(review.user_id, |p| p.notify_comment)
                    .await
                {
                    notify(
                        self.storage.as_ref(),
                        review.user_id,
                        NotificationKind::ReviewComment,
                        source,
                        format!(
                            "{} commented on your review of \"{}\"",
                            user.username, book_title
                        ),
                    )
                    .await;
                }
            }
            _ => {}
        }
        Ok(comment)
    }

    pub async fn update_comment(&self, user: &User, comment_id: Uuid, body: String) -> Result<Comment> {
        let mut comment = self
            .storage
            .get_comment_by_id(comment_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
        if comment.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "only the author may edit a comment".to_string(),
            ));
        }
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(CoreError::Validation("comment body is required".to_string()));
        }
        if body.len() > COMMENT_MAX_LEN {
            return Err(CoreError::Validation(format!(
                "comment body exceeds {COMMENT_MAX_LEN} characters"
            )));
        }
        comment.body = body;
        comment.updated_at = Utc::now();
        self.storage.update_comment(&comment).await?;
        Ok(comment)
    }

    pub async fn delete_comment(&self, user: &User, comment_id: Uuid) -> Result<()> {
        let comment = self
            .storage
            .get_comment_by_id(comment_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("comment".to_string()))?;
        if comment.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "only the author may delete a comment".to_string(),
            ));
        }
        self.storage.delete_comment(comment_id).await?;
        self.refresh_comment_count(comment.review_id).await?;
        Ok(())
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Comment> {
        self.storage
            .get_comment_by_id(comment_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("comment".to_string()))
    }

    pub async fn list_comments(&self, review_id: Uuid) -> Result<Vec<Comment>> {
        self.storage.list_comments_by_review(review_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accounts::AccountService;
    use crate::services::catalog::{CatalogService, NewBook};
    use crate::storage::InMemoryStorage;

    struct Fixture {
        storage: Arc<dyn Storage>,
        accounts: AccountService,
        reviews: ReviewService,
        book_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let accounts = AccountService::new(storage.clone());
        let catalog = CatalogService::new(storage.clone());
        let reviews = ReviewService::new(storage.clone());
        let book = catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        Fixture {
            storage,
            accounts,
            reviews,
            book_id: book.id.unwrap(),
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

    fn new_review(book_id: Uuid, rating: Option<f64>) -> NewReview {
        NewReview {
            book_id,
            title: "A landmark".to_string(),
            body_md: "Slow start.\n\nGreat ending.".to_string(),
            rating,
            status: None,
        }
    }

    #[tokio::test]
    async fn review_creation_updates_book_aggregates() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        fx.reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        fx.reviews
            .create_review(&bob, new_review(fx.book_id, Some(5.0)))
            .await
            .unwrap();

        let book = fx.storage.get_book_by_id(fx.book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 2);
        assert_eq!(book.rating_count, 2);
        assert_eq!(book.avg_rating, 4.5);
    }

    #[tokio::test]
    async fn unrated_reviews_count_as_reviews_but_not_ratings() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;

        fx.reviews
            .create_review(&alice, new_review(fx.book_id, None))
            .await
            .unwrap();

        let book = fx.storage.get_book_by_id(fx.book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 1);
        assert_eq!(book.rating_count, 0);
        assert_eq!(book.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn second_review_of_same_book_conflicts() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;

        fx.reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let err = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(2.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn hiding_a_review_removes_it_from_aggregates() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        fx.reviews
            .update_review(
                &alice,
                review.id.unwrap(),
                ReviewUpdate {
                    status: Some(ReviewStatus::Hidden),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let book = fx.storage.get_book_by_id(fx.book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 0);
        assert_eq!(book.rating_count, 0);
        assert_eq!(book.avg_rating, 0.0);
    }

    #[tokio::test]
    async fn deleting_a_review_refreshes_aggregates() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let alices = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(2.0)))
            .await
            .unwrap();
        fx.reviews
            .create_review(&bob, new_review(fx.book_id, Some(5.0)))
            .await
            .unwrap();

        fx.reviews
            .delete_review(&alice, alices.id.unwrap())
            .await
            .unwrap();

        let book = fx.storage.get_book_by_id(fx.book_id).await.unwrap().unwrap();
        assert_eq!(book.review_count, 1);
        assert_eq!(book.avg_rating, 5.0);
    }

    #[tokio::test]
    async fn editing_snapshots_a_revision() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let updated = fx
            .reviews
            .update_review(
                &alice,
                review.id.unwrap(),
                ReviewUpdate {
                    title: Some("Revised title".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.edited_at.is_some());

        let revisions = fx
            .reviews
            .list_revisions(&alice, review.id.unwrap())
            .await
            .unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].title, "A landmark");
    }

    #[tokio::test]
    async fn only_the_author_may_edit() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let err = fx
            .reviews
            .update_review(&bob, review.id.unwrap(), ReviewUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn likes_are_idempotent_and_counted() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let review_id = review.id.unwrap();

        assert!(fx.reviews.like_review(&bob, review_id).await.unwrap());
        assert!(!fx.reviews.like_review(&bob, review_id).await.unwrap());

        let stored = fx.storage.get_review_by_id(review_id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 1);

        // the author is notified once
        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert_eq!(
            notifications
                .iter()
                .filter(|n| n.kind == NotificationKind::ReviewLike)
                .count(),
            1
        );

        fx.reviews.unlike_review(&bob, review_id).await.unwrap();
        let stored = fx.storage.get_review_by_id(review_id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 0);
    }

    #[tokio::test]
    async fn self_likes_do_not_notify() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        fx.reviews
            .like_review(&alice, review.id.unwrap())
            .await
            .unwrap();

        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn comments_update_count_and_notify_owner() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let review_id = review.id.unwrap();

        let comment = fx
            .reviews
            .create_comment(
                &bob,
                NewComment {
                    review_id,
                    parent_id: None,
                    body: "Agreed on the ending.".to_string(),
                },
            )
            .await
            .unwrap();

        let stored = fx.storage.get_review_by_id(review_id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 1);

        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::ReviewComment));

        // reply notifies the parent comment's owner, not the review owner
        fx.reviews
            .create_comment(
                &alice,
                NewComment {
                    review_id,
                    parent_id: comment.id,
                    body: "Thanks!".to_string(),
                },
            )
            .await
            .unwrap();
        let bob_notifications = fx
            .storage
            .list_notifications(bob.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(bob_notifications
            .iter()
            .any(|n| n.kind == NotificationKind::CommentReply));

        let stored = fx.storage.get_review_by_id(review_id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 2);
    }

    #[tokio::test]
    async fn replies_cannot_nest() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let review_id = review.id.unwrap();

        let top = fx
            .reviews
            .create_comment(
                &bob,
                NewComment {
                    review_id,
                    parent_id: None,
                    body: "First".to_string(),
                },
            )
            .await
            .unwrap();
        let reply = fx
            .reviews
            .create_comment(
                &alice,
                NewComment {
                    review_id,
                    parent_id: top.id,
                    body: "Second".to_string(),
                },
            )
            .await
            .unwrap();

        let err = fx
            .reviews
            .create_comment(
                &bob,
                NewComment {
                    review_id,
                    parent_id: reply.id,
                    body: "Third".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn deleting_a_comment_refreshes_the_count() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let review = fx
            .reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();
        let review_id = review.id.unwrap();
        let comment = fx
            .reviews
            .create_comment(
                &bob,
                NewComment {
                    review_id,
                    parent_id: None,
                    body: "Hm.".to_string(),
                },
            )
            .await
            .unwrap();

        fx.reviews
            .delete_comment(&bob, comment.id.unwrap())
            .await
            .unwrap();
        let stored = fx.storage.get_review_by_id(review_id).await.unwrap().unwrap();
        assert_eq!(stored.comment_count, 0);
    }

    #[tokio::test]
    async fn new_review_notifies_followers() {
        let fx = fixture().await;
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        // bob follows alice
        let mut follow = Follow {
            id: None,
            follower_id: bob.id.unwrap(),
            target: ContentRef::new(ContentKind::User, alice.id.unwrap()),
            created_at: Utc::now(),
        };
        fx.storage.create_follow(&mut follow).await.unwrap();

        fx.reviews
            .create_review(&alice, new_review(fx.book_id, Some(4.0)))
            .await
            .unwrap();

        let notifications = fx
            .storage
            .list_notifications(bob.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(notifications
            .iter()
            .any(|n| n.kind == NotificationKind::NewReview));
    }
}
