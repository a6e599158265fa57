use crate::common::error::Result;
use crate::content::ContentRef;
use crate::domain::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter for review listings.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub book_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// When set, only public + active reviews are returned.
    pub only_public: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    /// Like-weighted, then newest. The default.
    #[default]
    Relevance,
    Rating,
    Date,
}

/// Filter for review search.
#[derive(Debug, Clone, Default)]
pub struct ReviewSearchFilter {
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub sort: ReviewSort,
    pub limit: Option<usize>,
}

/// Aggregates recomputed for a book from its public, active reviews.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookRatingStats {
    pub review_count: u32,
    pub rating_count: u32,
    pub avg_rating: f64,
}

/// Storage trait for persisting all platform data. Implemented by the
/// libSQL-backed store and by an in-memory store used in tests.
#[async_trait]
pub trait Storage: Send + Sync {
    // User operations
    async fn create_user(&self, user: &mut User) -> Result<()>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn update_user(&self, user: &User) -> Result<()>;

    async fn create_profile(&self, profile: &mut Profile) -> Result<()>;
    async fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn update_profile(&self, profile: &Profile) -> Result<()>;

    async fn create_session(&self, session: &mut Session) -> Result<()>;
    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> Result<()>;

    async fn create_verification_token(&self, token: &mut VerificationToken) -> Result<()>;
    async fn get_verification_token(&self, token: &str) -> Result<Option<VerificationToken>>;
    async fn update_verification_token(&self, token: &VerificationToken) -> Result<()>;

    // Catalog operations
    async fn create_author(&self, author: &mut Author) -> Result<()>;
    async fn get_author_by_id(&self, id: Uuid) -> Result<Option<Author>>;
    async fn get_author_by_slug(&self, slug: &str) -> Result<Option<Author>>;
    async fn update_author(&self, author: &Author) -> Result<()>;
    async fn list_authors(&self, limit: Option<usize>, offset: Option<usize>)
        -> Result<Vec<Author>>;

    async fn create_genre(&self, genre: &mut Genre) -> Result<()>;
    async fn get_genre_by_id(&self, id: Uuid) -> Result<Option<Genre>>;
    async fn get_genre_by_slug(&self, slug: &str) -> Result<Option<Genre>>;
    async fn list_genres(&self) -> Result<Vec<Genre>>;

    async fn create_publisher(&self, publisher: &mut Publisher) -> Result<()>;
    async fn get_publisher_by_id(&self, id: Uuid) -> Result<Option<Publisher>>;
    async fn get_publisher_by_slug(&self, slug: &str) -> Result<Option<Publisher>>;
    async fn list_publishers(&self) -> Result<Vec<Publisher>>;

    async fn create_tag(&self, tag: &mut Tag) -> Result<()>;
    async fn get_tag_by_id(&self, id: Uuid) -> Result<Option<Tag>>;
    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>>;
    async fn list_tags(&self) -> Result<Vec<Tag>>;

    async fn create_book(&self, book: &mut Book) -> Result<()>;
    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<Book>>;
    async fn get_book_by_slug(&self, slug: &str) -> Result<Option<Book>>;
    async fn update_book(&self, book: &Book) -> Result<()>;
    async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>>;
    /// Write recomputed aggregates without touching the rest of the row.
    async fn set_book_aggregates(&self, book_id: Uuid, stats: BookRatingStats) -> Result<()>;
    async fn list_book_ids_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Uuid>>;

    async fn create_edition(&self, edition: &mut Edition) -> Result<()>;
    async fn get_edition_by_isbn(&self, isbn13: &str) -> Result<Option<Edition>>;
    async fn list_editions_by_book(&self, book_id: Uuid) -> Result<Vec<Edition>>;

    // Review operations
    async fn create_review(&self, review: &mut Review) -> Result<()>;
    async fn get_review_by_id(&self, id: Uuid) -> Result<Option<Review>>;
    async fn get_review_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<Review>>;
    async fn update_review(&self, review: &Review) -> Result<()>;
    async fn delete_review(&self, id: Uuid) -> Result<()>;
    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>>;
    /// Aggregates over the book's public + active reviews.
    async fn book_rating_stats(&self, book_id: Uuid) -> Result<BookRatingStats>;
    async fn count_public_reviews_by_user(&self, user_id: Uuid) -> Result<u32>;

    async fn create_review_revision(&self, revision: &mut ReviewRevision) -> Result<()>;
    async fn list_review_revisions(&self, review_id: Uuid) -> Result<Vec<ReviewRevision>>;

    async fn create_comment(&self, comment: &mut Comment) -> Result<()>;
    async fn get_comment_by_id(&self, id: Uuid) -> Result<Option<Comment>>;
    async fn update_comment(&self, comment: &Comment) -> Result<()>;
    /// Hard delete; replies to the comment are removed with it.
    async fn delete_comment(&self, id: Uuid) -> Result<()>;
    /// Public + active comments of a review in creation order, replies
    /// included.
    async fn list_comments_by_review(&self, review_id: Uuid) -> Result<Vec<Comment>>;
    async fn count_public_comments(&self, review_id: Uuid) -> Result<u32>;

    async fn create_like(&self, like: &mut Like) -> Result<()>;
    async fn get_like(&self, user_id: Uuid, target: ContentRef) -> Result<Option<Like>>;
    async fn delete_like(&self, user_id: Uuid, target: ContentRef) -> Result<()>;
    async fn count_likes(&self, target: ContentRef) -> Result<u32>;

    // Shelf operations
    async fn create_shelf(&self, shelf: &mut Shelf) -> Result<()>;
    async fn get_shelf_by_id(&self, id: Uuid) -> Result<Option<Shelf>>;
    async fn list_shelves_by_user(&self, user_id: Uuid) -> Result<Vec<Shelf>>;
    async fn update_shelf(&self, shelf: &Shelf) -> Result<()>;
    async fn delete_shelf(&self, id: Uuid) -> Result<()>;

    async fn create_shelf_item(&self, item: &mut ShelfItem) -> Result<()>;
    async fn get_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<Option<ShelfItem>>;
    async fn delete_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<()>;
    async fn list_shelf_items(&self, shelf_id: Uuid) -> Result<Vec<ShelfItem>>;
    async fn count_shelf_items(&self, shelf_id: Uuid) -> Result<u32>;

    async fn create_reading_progress(&self, progress: &mut ReadingProgress) -> Result<()>;
    async fn get_reading_progress_by_id(&self, id: Uuid) -> Result<Option<ReadingProgress>>;
    async fn get_reading_progress(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<ReadingProgress>>;
    async fn update_reading_progress(&self, progress: &ReadingProgress) -> Result<()>;
    async fn delete_reading_progress(&self, id: Uuid) -> Result<()>;
    async fn list_reading_progress_by_user(&self, user_id: Uuid) -> Result<Vec<ReadingProgress>>;

    // Social operations
    async fn create_follow(&self, follow: &mut Follow) -> Result<()>;
    async fn get_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<Option<Follow>>;
    async fn delete_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<()>;
    async fn list_follows_by_follower(&self, follower_id: Uuid) -> Result<Vec<Follow>>;
    async fn list_follower_ids(&self, target: ContentRef) -> Result<Vec<Uuid>>;
    async fn count_followers(&self, target: ContentRef) -> Result<u32>;

    async fn create_notification(&self, notification: &mut Notification) -> Result<()>;
    async fn get_notification_by_id(&self, id: Uuid) -> Result<Option<Notification>>;
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>>;
    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<u32>;
    async fn mark_notification_read(&self, id: Uuid) -> Result<()>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<()>;

    async fn create_collection(&self, collection: &mut Collection) -> Result<()>;
    async fn get_collection_by_id(&self, id: Uuid) -> Result<Option<Collection>>;
    async fn list_collections_by_user(&self, user_id: Uuid) -> Result<Vec<Collection>>;
    /// The viewer's own collections plus everyone's public, active ones.
    async fn list_collections_visible_to(&self, viewer: Option<Uuid>) -> Result<Vec<Collection>>;
    async fn update_collection(&self, collection: &Collection) -> Result<()>;
    async fn delete_collection(&self, id: Uuid) -> Result<()>;

    async fn create_collection_item(&self, item: &mut CollectionItem) -> Result<()>;
    async fn get_collection_item(
        &self,
        collection_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<CollectionItem>>;
    async fn delete_collection_item(&self, collection_id: Uuid, book_id: Uuid) -> Result<()>;
    async fn list_collection_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>>;
    async fn count_collection_items(&self, collection_id: Uuid) -> Result<u32>;

    /// Public reviews authored by any of `user_ids` or about any of
    /// `book_ids`, newest first.
    async fn list_feed_reviews(
        &self,
        user_ids: &[Uuid],
        book_ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Review>>;

    // Search operations
    async fn search_books(&self, query: &str, filter: &BookFilter) -> Result<Vec<Book>>;
    async fn search_authors(&self, query: &str, limit: usize) -> Result<Vec<Author>>;
    async fn search_reviews(&self, query: &str, filter: &ReviewSearchFilter)
        -> Result<Vec<Review>>;
    async fn autocomplete_book_titles(&self, query: &str, limit: usize) -> Result<Vec<String>>;
    async fn autocomplete_author_names(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    // Moderation operations
    async fn create_report(&self, report: &mut Report) -> Result<()>;
    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>>;
    async fn find_open_report(
        &self,
        reporter_id: Uuid,
        target: ContentRef,
    ) -> Result<Option<Report>>;
    async fn update_report(&self, report: &Report) -> Result<()>;
    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Report>>;

    async fn create_moderator_action(&self, action: &mut ModeratorAction) -> Result<()>;
    async fn list_moderator_actions(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ModeratorAction>>;
}
