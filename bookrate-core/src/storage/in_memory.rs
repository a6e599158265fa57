use super::traits::{BookRatingStats, ReviewFilter, ReviewSearchFilter, ReviewSort, Storage};
use crate::common::error::{CoreError, Result};
use crate::content::ContentRef;
use crate::domain::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage implementation for development/testing.
#[derive(Default)]
pub struct InMemoryStorage {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    profiles: Arc<Mutex<HashMap<Uuid, Profile>>>,
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    verification_tokens: Arc<Mutex<HashMap<Uuid, VerificationToken>>>,
    authors: Arc<Mutex<HashMap<Uuid, Author>>>,
    genres: Arc<Mutex<HashMap<Uuid, Genre>>>,
    publishers: Arc<Mutex<HashMap<Uuid, Publisher>>>,
    tags: Arc<Mutex<HashMap<Uuid, Tag>>>,
    books: Arc<Mutex<HashMap<Uuid, Book>>>,
    editions: Arc<Mutex<HashMap<Uuid, Edition>>>,
    reviews: Arc<Mutex<HashMap<Uuid, Review>>>,
    review_revisions: Arc<Mutex<HashMap<Uuid, ReviewRevision>>>,
    comments: Arc<Mutex<HashMap<Uuid, Comment>>>,
    likes: Arc<Mutex<HashMap<Uuid, Like>>>,
    shelves: Arc<Mutex<HashMap<Uuid, Shelf>>>,
    shelf_items: Arc<Mutex<HashMap<Uuid, ShelfItem>>>,
    reading_progress: Arc<Mutex<HashMap<Uuid, ReadingProgress>>>,
    follows: Arc<Mutex<HashMap<Uuid, Follow>>>,
    notifications: Arc<Mutex<HashMap<Uuid, Notification>>>,
    collections: Arc<Mutex<HashMap<Uuid, Collection>>>,
    collection_items: Arc<Mutex<HashMap<Uuid, CollectionItem>>>,
    reports: Arc<Mutex<HashMap<Uuid, Report>>>,
    moderator_actions: Arc<Mutex<HashMap<Uuid, ModeratorAction>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn assign_id(id: &mut Option<Uuid>) -> Uuid {
    // Respect existing ID if provided; otherwise generate.
    let value = id.unwrap_or_else(Uuid::new_v4);
    *id = Some(value);
    value
}

fn page<T>(items: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> Vec<T> {
    let offset = offset.unwrap_or(0);
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn sort_books(books: &mut [Book], sort: BookSort) {
    match sort {
        BookSort::Rating => books.sort_by(|a, b| {
            b.avg_rating
                .partial_cmp(&a.avg_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.rating_count.cmp(&a.rating_count))
        }),
        BookSort::Date => books.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        BookSort::Title => books.sort_by(|a, b| a.title.cmp(&b.title)),
        BookSort::Relevance => books.sort_by(|a, b| {
            b.avg_rating
                .partial_cmp(&a.avg_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.rating_count.cmp(&a.rating_count))
                .then(b.created_at.cmp(&a.created_at))
        }),
    }
}

impl InMemoryStorage {
    /// Resolve a BookFilter's slug references against the catalog maps and
    /// apply every filter to the candidate set.
    fn filter_books(&self, candidates: Vec<Book>, filter: &BookFilter) -> Result<Vec<Book>> {
        let genre_id = match &filter.genre_slug {
            Some(slug) => {
                let genres = self.genres.lock().unwrap();
                Some(
                    genres
                        .values()
                        .find(|g| g.slug == *slug)
                        .and_then(|g| g.id),
                )
            }
            None => None,
        };
        let author_id = match &filter.author_slug {
            Some(slug) => {
                let authors = self.authors.lock().unwrap();
                Some(
                    authors
                        .values()
                        .find(|a| a.slug == *slug)
                        .and_then(|a| a.id),
                )
            }
            None => None,
        };
        let publisher_id = match &filter.publisher_slug {
            Some(slug) => {
                let publishers = self.publishers.lock().unwrap();
                Some(
                    publishers
                        .values()
                        .find(|p| p.slug == *slug)
                        .and_then(|p| p.id),
                )
            }
            None => None,
        };
        let tag_id = match &filter.tag_slug {
            Some(slug) => {
                let tags = self.tags.lock().unwrap();
                Some(tags.values().find(|t| t.slug == *slug).and_then(|t| t.id))
            }
            None => None,
        };

        let mut out = Vec::new();
        for book in candidates {
            if !book.is_active {
                continue;
            }
            if let Some(genre_id) = genre_id {
                match genre_id {
                    Some(id) if book.genre_ids.contains(&id) => {}
                    _ => continue,
                }
            }
            if let Some(author_id) = author_id {
                match author_id {
                    Some(id) if book.author_ids.contains(&id) => {}
                    _ => continue,
                }
            }
            if let Some(publisher_id) = publisher_id {
                match publisher_id {
                    Some(id) if book.publisher_id == Some(id) => {}
                    _ => continue,
                }
            }
            if let Some(tag_id) = tag_id {
                match tag_id {
                    Some(id) if book.tag_ids.contains(&id) => {}
                    _ => continue,
                }
            }
            if let Some(language) = &filter.language {
                if book.language != *language {
                    continue;
                }
            }
            if let Some(year) = filter.year {
                if book.year != Some(year) {
                    continue;
                }
            }
            if let Some(min) = filter.min_rating {
                if book.avg_rating < min {
                    continue;
                }
            }
            if let Some(max) = filter.max_rating {
                if book.avg_rating > max {
                    continue;
                }
            }
            out.push(book);
        }
        Ok(out)
    }

    /// Does `book` match the free-text query over title, description,
    /// author names and tag names?
    fn book_matches_query(&self, book: &Book, query: &str) -> bool {
        if contains_ci(&book.title, query) || contains_ci(&book.description, query) {
            return true;
        }
        let authors = self.authors.lock().unwrap();
        if book.author_ids.iter().any(|id| {
            authors
                .get(id)
                .map(|a| contains_ci(&a.name, query))
                .unwrap_or(false)
        }) {
            return true;
        }
        let tags = self.tags.lock().unwrap();
        book.tag_ids.iter().any(|id| {
            tags.get(id)
                .map(|t| contains_ci(&t.name, query))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    // ---- Users ----

    async fn create_user(&self, user: &mut User) -> Result<()> {
        let id = assign_id(&mut user.id);
        self.users.lock().unwrap().insert(id, user.clone());
        debug!("Created user: {} with id {}", user.username, id);
        Ok(())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.username.to_lowercase() == username.to_lowercase())
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|u| u.email.to_lowercase() == email.to_lowercase())
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let id = user
            .id
            .ok_or_else(|| CoreError::Validation("cannot update user without ID".to_string()))?;
        self.users.lock().unwrap().insert(id, user.clone());
        Ok(())
    }

    async fn create_profile(&self, profile: &mut Profile) -> Result<()> {
        let id = assign_id(&mut profile.id);
        self.profiles.lock().unwrap().insert(id, profile.clone());
        Ok(())
    }

    async fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn update_profile(&self, profile: &Profile) -> Result<()> {
        let id = profile
            .id
            .ok_or_else(|| CoreError::Validation("cannot update profile without ID".to_string()))?;
        self.profiles.lock().unwrap().insert(id, profile.clone());
        Ok(())
    }

    async fn create_session(&self, session: &mut Session) -> Result<()> {
        let id = assign_id(&mut session.id);
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(())
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.values().find(|s| s.token == token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, s| s.token != token);
        Ok(())
    }

    async fn create_verification_token(&self, token: &mut VerificationToken) -> Result<()> {
        let id = assign_id(&mut token.id);
        self.verification_tokens
            .lock()
            .unwrap()
            .insert(id, token.clone());
        Ok(())
    }

    async fn get_verification_token(&self, token: &str) -> Result<Option<VerificationToken>> {
        let tokens = self.verification_tokens.lock().unwrap();
        Ok(tokens.values().find(|t| t.token == token).cloned())
    }

    async fn update_verification_token(&self, token: &VerificationToken) -> Result<()> {
        let id = token
            .id
            .ok_or_else(|| CoreError::Validation("cannot update token without ID".to_string()))?;
        self.verification_tokens
            .lock()
            .unwrap()
            .insert(id, token.clone());
        Ok(())
    }

    // ---- Catalog ----

    async fn create_author(&self, author: &mut Author) -> Result<()> {
        let id = assign_id(&mut author.id);
        self.authors.lock().unwrap().insert(id, author.clone());
        debug!("Created author: {} with id {}", author.name, id);
        Ok(())
    }

    async fn get_author_by_id(&self, id: Uuid) -> Result<Option<Author>> {
        Ok(self.authors.lock().unwrap().get(&id).cloned())
    }

    async fn get_author_by_slug(&self, slug: &str) -> Result<Option<Author>> {
        let authors = self.authors.lock().unwrap();
        Ok(authors.values().find(|a| a.slug == slug).cloned())
    }

    async fn update_author(&self, author: &Author) -> Result<()> {
        let id = author
            .id
            .ok_or_else(|| CoreError::Validation("cannot update author without ID".to_string()))?;
        self.authors.lock().unwrap().insert(id, author.clone());
        Ok(())
    }

    async fn list_authors(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Author>> {
        let authors = self.authors.lock().unwrap();
        let mut all: Vec<Author> = authors.values().filter(|a| a.is_active).cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(all, limit, offset))
    }

    async fn create_genre(&self, genre: &mut Genre) -> Result<()> {
        let id = assign_id(&mut genre.id);
        self.genres.lock().unwrap().insert(id, genre.clone());
        Ok(())
    }

    async fn get_genre_by_id(&self, id: Uuid) -> Result<Option<Genre>> {
        Ok(self.genres.lock().unwrap().get(&id).cloned())
    }

    async fn get_genre_by_slug(&self, slug: &str) -> Result<Option<Genre>> {
        let genres = self.genres.lock().unwrap();
        Ok(genres.values().find(|g| g.slug == slug).cloned())
    }

    async fn list_genres(&self) -> Result<Vec<Genre>> {
        let genres = self.genres.lock().unwrap();
        let mut all: Vec<Genre> = genres.values().filter(|g| g.is_active).cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_publisher(&self, publisher: &mut Publisher) -> Result<()> {
        let id = assign_id(&mut publisher.id);
        self.publishers
            .lock()
            .unwrap()
            .insert(id, publisher.clone());
        Ok(())
    }

    async fn get_publisher_by_id(&self, id: Uuid) -> Result<Option<Publisher>> {
        Ok(self.publishers.lock().unwrap().get(&id).cloned())
    }

    async fn get_publisher_by_slug(&self, slug: &str) -> Result<Option<Publisher>> {
        let publishers = self.publishers.lock().unwrap();
        Ok(publishers.values().find(|p| p.slug == slug).cloned())
    }

    async fn list_publishers(&self) -> Result<Vec<Publisher>> {
        let publishers = self.publishers.lock().unwrap();
        let mut all: Vec<Publisher> = publishers
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_tag(&self, tag: &mut Tag) -> Result<()> {
        let id = assign_id(&mut tag.id);
        self.tags.lock().unwrap().insert(id, tag.clone());
        Ok(())
    }

    async fn get_tag_by_id(&self, id: Uuid) -> Result<Option<Tag>> {
        Ok(self.tags.lock().unwrap().get(&id).cloned())
    }

    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let tags = self.tags.lock().unwrap();
        Ok(tags.values().find(|t| t.slug == slug).cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let tags = self.tags.lock().unwrap();
        let mut all: Vec<Tag> = tags.values().filter(|t| t.is_active).cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_book(&self, book: &mut Book) -> Result<()> {
        let id = assign_id(&mut book.id);
        self.books.lock().unwrap().insert(id, book.clone());
        debug!("Created book: {} with id {}", book.title, id);
        Ok(())
    }

    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<Book>> {
        Ok(self.books.lock().unwrap().get(&id).cloned())
    }

    async fn get_book_by_slug(&self, slug: &str) -> Result<Option<Book>> {
        let books = self.books.lock().unwrap();
        Ok(books.values().find(|b| b.slug == slug).cloned())
    }

    async fn update_book(&self, book: &Book) -> Result<()> {
        let id = book
            .id
            .ok_or_else(|| CoreError::Validation("cannot update book without ID".to_string()))?;
        self.books.lock().unwrap().insert(id, book.clone());
        Ok(())
    }

    async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let candidates: Vec<Book> = self.books.lock().unwrap().values().cloned().collect();
        let mut matched = self.filter_books(candidates, filter)?;
        sort_books(&mut matched, filter.sort);
        Ok(page(matched, filter.limit, filter.offset))
    }

    async fn set_book_aggregates(&self, book_id: Uuid, stats: BookRatingStats) -> Result<()> {
        let mut books = self.books.lock().unwrap();
        let book = books
            .get_mut(&book_id)
            .ok_or_else(|| CoreError::NotFound(format!("book {book_id}")))?;
        book.avg_rating = stats.avg_rating;
        book.rating_count = stats.rating_count;
        book.review_count = stats.review_count;
        Ok(())
    }

    async fn list_book_ids_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let books = self.books.lock().unwrap();
        Ok(books
            .values()
            .filter(|b| b.author_ids.iter().any(|id| author_ids.contains(id)))
            .filter_map(|b| b.id)
            .collect())
    }

    async fn create_edition(&self, edition: &mut Edition) -> Result<()> {
        let id = assign_id(&mut edition.id);
        self.editions.lock().unwrap().insert(id, edition.clone());
        Ok(())
    }

    async fn get_edition_by_isbn(&self, isbn13: &str) -> Result<Option<Edition>> {
        let editions = self.editions.lock().unwrap();
        Ok(editions
            .values()
            .find(|e| e.isbn13.as_deref() == Some(isbn13))
            .cloned())
    }

    async fn list_editions_by_book(&self, book_id: Uuid) -> Result<Vec<Edition>> {
        let editions = self.editions.lock().unwrap();
        let mut all: Vec<Edition> = editions
            .values()
            .filter(|e| e.book_id == book_id && e.is_active)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(all)
    }

    // ---- Reviews ----

    async fn create_review(&self, review: &mut Review) -> Result<()> {
        let id = assign_id(&mut review.id);
        self.reviews.lock().unwrap().insert(id, review.clone());
        debug!("Created review: {} with id {}", review.title, id);
        Ok(())
    }

    async fn get_review_by_id(&self, id: Uuid) -> Result<Option<Review>> {
        Ok(self.reviews.lock().unwrap().get(&id).cloned())
    }

    async fn get_review_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<Review>> {
        let reviews = self.reviews.lock().unwrap();
        Ok(reviews
            .values()
            .find(|r| r.user_id == user_id && r.book_id == book_id)
            .cloned())
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        let id = review
            .id
            .ok_or_else(|| CoreError::Validation("cannot update review without ID".to_string()))?;
        self.reviews.lock().unwrap().insert(id, review.clone());
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> Result<()> {
        self.reviews.lock().unwrap().remove(&id);
        // Mirror the relational cascades.
        self.comments.lock().unwrap().retain(|_, c| c.review_id != id);
        self.review_revisions
            .lock()
            .unwrap()
            .retain(|_, r| r.review_id != id);
        Ok(())
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let reviews = self.reviews.lock().unwrap();
        let mut matched: Vec<Review> = reviews
            .values()
            .filter(|r| {
                (!filter.only_public || r.counts_for_book())
                    && filter.book_id.map_or(true, |id| r.book_id == id)
                    && filter.user_id.map_or(true, |id| r.user_id == id)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matched, filter.limit, filter.offset))
    }

    async fn book_rating_stats(&self, book_id: Uuid) -> Result<BookRatingStats> {
        let reviews = self.reviews.lock().unwrap();
        let public: Vec<&Review> = reviews
            .values()
            .filter(|r| r.book_id == book_id && r.counts_for_book())
            .collect();
        let rated: Vec<f64> = public.iter().filter_map(|r| r.rating).collect();
        let avg = if rated.is_empty() {
            0.0
        } else {
            rated.iter().sum::<f64>() / rated.len() as f64
        };
        Ok(BookRatingStats {
            review_count: public.len() as u32,
            rating_count: rated.len() as u32,
            avg_rating: avg,
        })
    }

    async fn count_public_reviews_by_user(&self, user_id: Uuid) -> Result<u32> {
        let reviews = self.reviews.lock().unwrap();
        Ok(reviews
            .values()
            .filter(|r| r.user_id == user_id && r.counts_for_book())
            .count() as u32)
    }

    async fn create_review_revision(&self, revision: &mut ReviewRevision) -> Result<()> {
        let id = assign_id(&mut revision.id);
        self.review_revisions
            .lock()
            .unwrap()
            .insert(id, revision.clone());
        Ok(())
    }

    async fn list_review_revisions(&self, review_id: Uuid) -> Result<Vec<ReviewRevision>> {
        let revisions = self.review_revisions.lock().unwrap();
        let mut all: Vec<ReviewRevision> = revisions
            .values()
            .filter(|r| r.review_id == review_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn create_comment(&self, comment: &mut Comment) -> Result<()> {
        let id = assign_id(&mut comment.id);
        self.comments.lock().unwrap().insert(id, comment.clone());
        Ok(())
    }

    async fn get_comment_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.lock().unwrap().get(&id).cloned())
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        let id = comment
            .id
            .ok_or_else(|| CoreError::Validation("cannot update comment without ID".to_string()))?;
        self.comments.lock().unwrap().insert(id, comment.clone());
        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<()> {
        let mut comments = self.comments.lock().unwrap();
        comments.retain(|_, c| c.id != Some(id) && c.parent_id != Some(id));
        Ok(())
    }

    async fn list_comments_by_review(&self, review_id: Uuid) -> Result<Vec<Comment>> {
        let comments = self.comments.lock().unwrap();
        let mut all: Vec<Comment> = comments
            .values()
            .filter(|c| c.review_id == review_id && c.counts_for_review())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn count_public_comments(&self, review_id: Uuid) -> Result<u32> {
        let comments = self.comments.lock().unwrap();
        Ok(comments
            .values()
            .filter(|c| c.review_id == review_id && c.counts_for_review())
            .count() as u32)
    }

    async fn create_like(&self, like: &mut Like) -> Result<()> {
        let id = assign_id(&mut like.id);
        self.likes.lock().unwrap().insert(id, like.clone());
        Ok(())
    }

    async fn get_like(&self, user_id: Uuid, target: ContentRef) -> Result<Option<Like>> {
        let likes = self.likes.lock().unwrap();
        Ok(likes
            .values()
            .find(|l| l.user_id == user_id && l.target == target)
            .cloned())
    }

    async fn delete_like(&self, user_id: Uuid, target: ContentRef) -> Result<()> {
        let mut likes = self.likes.lock().unwrap();
        likes.retain(|_, l| !(l.user_id == user_id && l.target == target));
        Ok(())
    }

    async fn count_likes(&self, target: ContentRef) -> Result<u32> {
        let likes = self.likes.lock().unwrap();
        Ok(likes.values().filter(|l| l.target == target).count() as u32)
    }

    // ---- Shelves ----

    async fn create_shelf(&self, shelf: &mut Shelf) -> Result<()> {
        let id = assign_id(&mut shelf.id);
        self.shelves.lock().unwrap().insert(id, shelf.clone());
        Ok(())
    }

    async fn get_shelf_by_id(&self, id: Uuid) -> Result<Option<Shelf>> {
        Ok(self.shelves.lock().unwrap().get(&id).cloned())
    }

    async fn list_shelves_by_user(&self, user_id: Uuid) -> Result<Vec<Shelf>> {
        let shelves = self.shelves.lock().unwrap();
        let mut all: Vec<Shelf> = shelves
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn update_shelf(&self, shelf: &Shelf) -> Result<()> {
        let id = shelf
            .id
            .ok_or_else(|| CoreError::Validation("cannot update shelf without ID".to_string()))?;
        self.shelves.lock().unwrap().insert(id, shelf.clone());
        Ok(())
    }

    async fn delete_shelf(&self, id: Uuid) -> Result<()> {
        self.shelves.lock().unwrap().remove(&id);
        self.shelf_items
            .lock()
            .unwrap()
            .retain(|_, i| i.shelf_id != id);
        Ok(())
    }

    async fn create_shelf_item(&self, item: &mut ShelfItem) -> Result<()> {
        let id = assign_id(&mut item.id);
        self.shelf_items.lock().unwrap().insert(id, item.clone());
        Ok(())
    }

    async fn get_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<Option<ShelfItem>> {
        let items = self.shelf_items.lock().unwrap();
        Ok(items
            .values()
            .find(|i| i.shelf_id == shelf_id && i.book_id == book_id)
            .cloned())
    }

    async fn delete_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<()> {
        let mut items = self.shelf_items.lock().unwrap();
        items.retain(|_, i| !(i.shelf_id == shelf_id && i.book_id == book_id));
        Ok(())
    }

    async fn list_shelf_items(&self, shelf_id: Uuid) -> Result<Vec<ShelfItem>> {
        let items = self.shelf_items.lock().unwrap();
        let mut all: Vec<ShelfItem> = items
            .values()
            .filter(|i| i.shelf_id == shelf_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.position.cmp(&b.position).then(a.added_at.cmp(&b.added_at)));
        Ok(all)
    }

    async fn count_shelf_items(&self, shelf_id: Uuid) -> Result<u32> {
        let items = self.shelf_items.lock().unwrap();
        Ok(items.values().filter(|i| i.shelf_id == shelf_id).count() as u32)
    }

    async fn create_reading_progress(&self, progress: &mut ReadingProgress) -> Result<()> {
        let id = assign_id(&mut progress.id);
        self.reading_progress
            .lock()
            .unwrap()
            .insert(id, progress.clone());
        Ok(())
    }

    async fn get_reading_progress_by_id(&self, id: Uuid) -> Result<Option<ReadingProgress>> {
        Ok(self.reading_progress.lock().unwrap().get(&id).cloned())
    }

    async fn get_reading_progress(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<ReadingProgress>> {
        let progress = self.reading_progress.lock().unwrap();
        Ok(progress
            .values()
            .find(|p| p.user_id == user_id && p.book_id == book_id)
            .cloned())
    }

    async fn update_reading_progress(&self, progress: &ReadingProgress) -> Result<()> {
        let id = progress.id.ok_or_else(|| {
            CoreError::Validation("cannot update reading progress without ID".to_string())
        })?;
        self.reading_progress
            .lock()
            .unwrap()
            .insert(id, progress.clone());
        Ok(())
    }

    async fn delete_reading_progress(&self, id: Uuid) -> Result<()> {
        self.reading_progress.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_reading_progress_by_user(&self, user_id: Uuid) -> Result<Vec<ReadingProgress>> {
        let progress = self.reading_progress.lock().unwrap();
        let mut all: Vec<ReadingProgress> = progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    // ---- Social ----

    async fn create_follow(&self, follow: &mut Follow) -> Result<()> {
        let id = assign_id(&mut follow.id);
        self.follows.lock().unwrap().insert(id, follow.clone());
        Ok(())
    }

    async fn get_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<Option<Follow>> {
        let follows = self.follows.lock().unwrap();
        Ok(follows
            .values()
            .find(|f| f.follower_id == follower_id && f.target == target)
            .cloned())
    }

    async fn delete_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<()> {
        let mut follows = self.follows.lock().unwrap();
        follows.retain(|_, f| !(f.follower_id == follower_id && f.target == target));
        Ok(())
    }

    async fn list_follows_by_follower(&self, follower_id: Uuid) -> Result<Vec<Follow>> {
        let follows = self.follows.lock().unwrap();
        let mut all: Vec<Follow> = follows
            .values()
            .filter(|f| f.follower_id == follower_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_follower_ids(&self, target: ContentRef) -> Result<Vec<Uuid>> {
        let follows = self.follows.lock().unwrap();
        Ok(follows
            .values()
            .filter(|f| f.target == target)
            .map(|f| f.follower_id)
            .collect())
    }

    async fn count_followers(&self, target: ContentRef) -> Result<u32> {
        let follows = self.follows.lock().unwrap();
        Ok(follows.values().filter(|f| f.target == target).count() as u32)
    }

    async fn create_notification(&self, notification: &mut Notification) -> Result<()> {
        let id = assign_id(&mut notification.id);
        self.notifications
            .lock()
            .unwrap()
            .insert(id, notification.clone());
        Ok(())
    }

    async fn get_notification_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.lock().unwrap().get(&id).cloned())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>> {
        let notifications = self.notifications.lock().unwrap();
        let mut all: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, None))
    }

    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<u32> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u32)
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        let mut notifications = self.notifications.lock().unwrap();
        if let Some(n) = notifications.get_mut(&id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<()> {
        let mut notifications = self.notifications.lock().unwrap();
        for n in notifications.values_mut() {
            if n.user_id == user_id {
                n.is_read = true;
            }
        }
        Ok(())
    }

    async fn create_collection(&self, collection: &mut Collection) -> Result<()> {
        let id = assign_id(&mut collection.id);
        self.collections
            .lock()
            .unwrap()
            .insert(id, collection.clone());
        Ok(())
    }

    async fn get_collection_by_id(&self, id: Uuid) -> Result<Option<Collection>> {
        Ok(self.collections.lock().unwrap().get(&id).cloned())
    }

    async fn list_collections_by_user(&self, user_id: Uuid) -> Result<Vec<Collection>> {
        let collections = self.collections.lock().unwrap();
        let mut all: Vec<Collection> = collections
            .values()
            .filter(|c| c.user_id == user_id && c.is_active)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn list_collections_visible_to(&self, viewer: Option<Uuid>) -> Result<Vec<Collection>> {
        let collections = self.collections.lock().unwrap();
        let mut all: Vec<Collection> = collections
            .values()
            .filter(|c| {
                (c.visibility == Visibility::Public && c.is_active)
                    || viewer.map_or(false, |v| c.user_id == v)
            })
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update_collection(&self, collection: &Collection) -> Result<()> {
        let id = collection.id.ok_or_else(|| {
            CoreError::Validation("cannot update collection without ID".to_string())
        })?;
        self.collections
            .lock()
            .unwrap()
            .insert(id, collection.clone());
        Ok(())
    }

    async fn delete_collection(&self, id: Uuid) -> Result<()> {
        self.collections.lock().unwrap().remove(&id);
        self.collection_items
            .lock()
            .unwrap()
            .retain(|_, i| i.collection_id != id);
        Ok(())
    }

    async fn create_collection_item(&self, item: &mut CollectionItem) -> Result<()> {
        let id = assign_id(&mut item.id);
        self.collection_items
            .lock()
            .unwrap()
            .insert(id, item.clone());
        Ok(())
    }

    async fn get_collection_item(
        &self,
        collection_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<CollectionItem>> {
        let items = self.collection_items.lock().unwrap();
        Ok(items
            .values()
            .find(|i| i.collection_id == collection_id && i.book_id == book_id)
            .cloned())
    }

    async fn delete_collection_item(&self, collection_id: Uuid, book_id: Uuid) -> Result<()> {
        let mut items = self.collection_items.lock().unwrap();
        items.retain(|_, i| !(i.collection_id == collection_id && i.book_id == book_id));
        Ok(())
    }

    async fn list_collection_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>> {
        let items = self.collection_items.lock().unwrap();
        let mut all: Vec<CollectionItem> = items
            .values()
            .filter(|i| i.collection_id == collection_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| a.position.cmp(&b.position).then(a.added_at.cmp(&b.added_at)));
        Ok(all)
    }

    async fn count_collection_items(&self, collection_id: Uuid) -> Result<u32> {
        let items = self.collection_items.lock().unwrap();
        Ok(items
            .values()
            .filter(|i| i.collection_id == collection_id)
            .count() as u32)
    }

    async fn list_feed_reviews(
        &self,
        user_ids: &[Uuid],
        book_ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Review>> {
        let reviews = self.reviews.lock().unwrap();
        let mut all: Vec<Review> = reviews
            .values()
            .filter(|r| {
                r.counts_for_book()
                    && (user_ids.contains(&r.user_id) || book_ids.contains(&r.book_id))
            })
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    // ---- Search ----

    async fn search_books(&self, query: &str, filter: &BookFilter) -> Result<Vec<Book>> {
        let candidates: Vec<Book> = self
            .books
            .lock()
            .unwrap()
            .values()
            .filter(|b| self.book_matches_query(b, query))
            .cloned()
            .collect();
        let mut matched = self.filter_books(candidates, filter)?;
        sort_books(&mut matched, filter.sort);
        Ok(page(matched, filter.limit, filter.offset))
    }

    async fn search_authors(&self, query: &str, limit: usize) -> Result<Vec<Author>> {
        let authors = self.authors.lock().unwrap();
        let mut matched: Vec<Author> = authors
            .values()
            .filter(|a| {
                a.is_active && (contains_ci(&a.name, query) || contains_ci(&a.bio, query))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn search_reviews(
        &self,
        query: &str,
        filter: &ReviewSearchFilter,
    ) -> Result<Vec<Review>> {
        let book_titles: HashMap<Uuid, String> = self
            .books
            .lock()
            .unwrap()
            .iter()
            .map(|(id, b)| (*id, b.title.clone()))
            .collect();
        let reviews = self.reviews.lock().unwrap();
        let mut matched: Vec<Review> = reviews
            .values()
            .filter(|r| {
                r.counts_for_book()
                    && (contains_ci(&r.title, query)
                        || contains_ci(&r.body_md, query)
                        || book_titles
                            .get(&r.book_id)
                            .map(|t| contains_ci(t, query))
                            .unwrap_or(false))
                    && filter.min_rating.map_or(true, |min| {
                        r.rating.map_or(false, |rating| rating >= min)
                    })
                    && filter
                        .max_rating
                        .map_or(true, |max| r.rating.map_or(true, |rating| rating <= max))
            })
            .cloned()
            .collect();
        match filter.sort {
            ReviewSort::Rating => matched.sort_by(|a, b| {
                b.rating
                    .partial_cmp(&a.rating)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.like_count.cmp(&a.like_count))
            }),
            ReviewSort::Date => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ReviewSort::Relevance => matched.sort_by(|a, b| {
                b.like_count
                    .cmp(&a.like_count)
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn autocomplete_book_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let books = self.books.lock().unwrap();
        let mut titles: Vec<String> = books
            .values()
            .filter(|b| b.is_active && contains_ci(&b.title, query))
            .map(|b| b.title.clone())
            .collect();
        titles.sort();
        titles.truncate(limit);
        Ok(titles)
    }

    async fn autocomplete_author_names(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let authors = self.authors.lock().unwrap();
        let mut names: Vec<String> = authors
            .values()
            .filter(|a| a.is_active && contains_ci(&a.name, query))
            .map(|a| a.name.clone())
            .collect();
        names.sort();
        names.truncate(limit);
        Ok(names)
    }

    // ---- Moderation ----

    async fn create_report(&self, report: &mut Report) -> Result<()> {
        let id = assign_id(&mut report.id);
        self.reports.lock().unwrap().insert(id, report.clone());
        Ok(())
    }

    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.reports.lock().unwrap().get(&id).cloned())
    }

    async fn find_open_report(
        &self,
        reporter_id: Uuid,
        target: ContentRef,
    ) -> Result<Option<Report>> {
        let reports = self.reports.lock().unwrap();
        Ok(reports
            .values()
            .find(|r| r.reporter_id == reporter_id && r.target == target && r.status.is_open())
            .cloned())
    }

    async fn update_report(&self, report: &Report) -> Result<()> {
        let id = report
            .id
            .ok_or_else(|| CoreError::Validation("cannot update report without ID".to_string()))?;
        self.reports.lock().unwrap().insert(id, report.clone());
        Ok(())
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Report>> {
        let reports = self.reports.lock().unwrap();
        let mut all: Vec<Report> = reports
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, offset))
    }

    async fn create_moderator_action(&self, action: &mut ModeratorAction) -> Result<()> {
        let id = assign_id(&mut action.id);
        self.moderator_actions
            .lock()
            .unwrap()
            .insert(id, action.clone());
        Ok(())
    }

    async fn list_moderator_actions(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ModeratorAction>> {
        let actions = self.moderator_actions.lock().unwrap();
        let mut all: Vec<ModeratorAction> = actions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, offset))
    }
}
