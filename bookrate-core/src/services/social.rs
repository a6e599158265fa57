use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::notify::notify;
use crate::common::error::{CoreError, Result};
use crate::content::{ensure_kind, ContentKind, ContentRef, FOLLOWABLE_KINDS};
use crate::domain::*;
use crate::slug::{slug_candidates, slugify};
use crate::storage::Storage;

const FEED_LIMIT: usize = 20;

/// Partial collection update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Clone)]
pub struct SocialService {
    storage: Arc<dyn Storage>,
}

impl SocialService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Verify the follow target actually exists and is active.
    async fn ensure_target_exists(&self, target: ContentRef) -> Result<()> {
        let exists = match target.kind {
            ContentKind::User => self
                .storage
                .get_user_by_id(target.id)
                .await?
                .map_or(false, |u| u.is_active),
            ContentKind::Author => self
                .storage
                .get_author_by_id(target.id)
                .await?
                .map_or(false, |a| a.is_active),
            ContentKind::Book => self
                .storage
                .get_book_by_id(target.id)
                .await?
                .map_or(false, |b| b.is_active),
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

    /// Follow a user, author, or book. Idempotent; returns false when the
    /// follow already existed.
    pub async fn follow(&self, user: &User, target: ContentRef) -> Result<bool> {
        ensure_kind(target, FOLLOWABLE_KINDS, "follow")?;
        let follower_id = user.id.expect("authenticated user has id");
        if target.kind == ContentKind::User && target.id == follower_id {
            return Err(CoreError::Validation(
                "you cannot follow yourself".to_string(),
            ));
        }
        self.ensure_target_exists(target).await?;

        if self.storage.get_follow(follower_id, target).await?.is_some() {
            return Ok(false);
        }
        let mut follow = Follow {
            id: None,
            follower_id,
            target,
            created_at: Utc::now(),
        };
        self.storage.create_follow(&mut follow).await?;

        // only user targets are notified, and only when they allow it
        if target.kind == ContentKind::User {
            let allows = match self.storage.get_profile_by_user(target.id).await {
                Ok(Some(profile)) => profile.notify_follow,
                _ => true,
            };
            if allows {
                notify(
                    self.storage.as_ref(),
                    target.id,
                    NotificationKind::Follow,
                    Some(ContentRef::new(ContentKind::User, follower_id)),
                    format!("{} started following you", user.username),
                )
                .await;
            }
        }
        Ok(true)
    }

    pub async fn unfollow(&self, user: &User, target: ContentRef) -> Result<()> {
        ensure_kind(target, FOLLOWABLE_KINDS, "follow")?;
        let follower_id = user.id.expect("authenticated user has id");
        self.storage
            .get_follow(follower_id, target)
            .await?
            .ok_or_else(|| CoreError::NotFound("follow".to_string()))?;
        self.storage.delete_follow(follower_id, target).await
    }

    pub async fn list_notifications(
        &self,
        user: &User,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>> {
        self.storage
            .list_notifications(
                user.id.expect("authenticated user has id"),
                unread_only,
                limit,
            )
            .await
    }

    pub async fn unread_count(&self, user: &User) -> Result<u32> {
        self.storage
            .count_unread_notifications(user.id.expect("authenticated user has id"))
            .await
    }

    pub async fn mark_read(&self, user: &User, notification_id: Uuid) -> Result<()> {
        let notification = self
            .storage
            .get_notification_by_id(notification_id)
            .await?
            .filter(|n| n.user_id == user.id.expect("authenticated user has id"))
            .ok_or_else(|| CoreError::NotFound("notification".to_string()))?;
        self.storage
            .mark_notification_read(notification.id.expect("stored notification has id"))
            .await
    }

    pub async fn mark_all_read(&self, user: &User) -> Result<()> {
        self.storage
            .mark_all_notifications_read(user.id.expect("authenticated user has id"))
            .await
    }

    async fn refresh_book_count(&self, collection_id: Uuid) -> Result<()> {
        if let Some(mut collection) = self.storage.get_collection_by_id(collection_id).await? {
            collection.book_count = self.storage.count_collection_items(collection_id).await?;
            self.storage.update_collection(&collection).await?;
        }
        Ok(())
    }

    async fn owned_collection(&self, user: &User, collection_id: Uuid) -> Result<Collection> {
        let collection = self
            .storage
            .get_collection_by_id(collection_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
        if collection.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "this collection belongs to another user".to_string(),
            ));
        }
        Ok(collection)
    }

    pub async fn create_collection(
        &self,
        user: &User,
        name: String,
        description: Option<String>,
        visibility: Option<Visibility>,
    ) -> Result<Collection> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation(
                "collection name is required".to_string(),
            ));
        }
        let slug = slug_candidates(&slugify(&name))
            .next()
            .expect("slug candidates are unbounded");
        let now = Utc::now();
        let mut collection = Collection {
            id: None,
            user_id: user.id.expect("authenticated user has id"),
            name,
            slug,
            description: description.unwrap_or_default(),
            visibility: visibility.unwrap_or(Visibility::Public),
            book_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_collection(&mut collection).await?;
        Ok(collection)
    }

    pub async fn list_collections(&self, viewer: Option<&User>) -> Result<Vec<Collection>> {
        self.storage
            .list_collections_visible_to(viewer.and_then(|u| u.id))
            .await
    }

    /// A collection with its items. Private collections are visible to the
    /// owner only.
    pub async fn collection_detail(
        &self,
        viewer: Option<&User>,
        collection_id: Uuid,
    ) -> Result<(Collection, Vec<CollectionItem>)> {
        let collection = self
            .storage
            .get_collection_by_id(collection_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
        let is_owner = viewer.map_or(false, |v| v.id == Some(collection.user_id));
        if collection.visibility == Visibility::Private && !is_owner {
            return Err(CoreError::NotFound("collection".to_string()));
        }
        let items = self.storage.list_collection_items(collection_id).await?;
        Ok((collection, items))
    }

    pub async fn update_collection(
        &self,
        user: &User,
        collection_id: Uuid,
        update: CollectionUpdate,
    ) -> Result<Collection> {
        let mut collection = self.owned_collection(user, collection_id).await?;
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(CoreError::Validation(
                    "collection name is required".to_string(),
                ));
            }
            collection.slug = slugify(&name);
            collection.name = name;
        }
        if let Some(description) = update.description {
            collection.description = description;
        }
        if let Some(visibility) = update.visibility {
            collection.visibility = visibility;
        }
        collection.updated_at = Utc::now();
        self.storage.update_collection(&collection).await?;
        Ok(collection)
    }

    pub async fn delete_collection(&self, user: &User, collection_id: Uuid) -> Result<()> {
        self.owned_collection(user, collection_id).await?;
        self.storage.delete_collection(collection_id).await
    }

    /// Add a book to a collection. Idempotent; returns false when the book
    /// was already there.
    pub async fn add_book(
        &self,
        user: &User,
        collection_id: Uuid,
        book_id: Uuid,
        notes: Option<String>,
    ) -> Result<bool> {
        self.owned_collection(user, collection_id).await?;
        self.storage
            .get_book_by_id(book_id)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound("book".to_string()))?;

        if self
            .storage
            .get_collection_item(collection_id, book_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        let mut item = CollectionItem {
            id: None,
            collection_id,
            book_id,
            notes: notes.unwrap_or_default(),
            position: self.storage.count_collection_items(collection_id).await?,
            added_at: Utc::now(),
        };
        self.storage.create_collection_item(&mut item).await?;
        self.refresh_book_count(collection_id).await?;
        Ok(true)
    }

    pub async fn remove_book(
        &self,
        user: &User,
        collection_id: Uuid,
        book_id: Uuid,
    ) -> Result<()> {
        self.owned_collection(user, collection_id).await?;
        self.storage
            .get_collection_item(collection_id, book_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("collection item".to_string()))?;
        self.storage
            .delete_collection_item(collection_id, book_id)
            .await?;
        self.refresh_book_count(collection_id).await
    }

    /// The follow feed: latest public reviews by followed users, about
    /// followed books, or about books by followed authors.
    pub async fn feed(&self, user: &User) -> Result<Vec<Review>> {
        let follows = self
            .storage
            .list_follows_by_follower(user.id.expect("authenticated user has id"))
            .await?;

        let mut user_ids = Vec::new();
        let mut book_ids = Vec::new();
        let mut author_ids = Vec::new();
        for follow in &follows {
            match follow.target.kind {
                ContentKind::User => user_ids.push(follow.target.id),
                ContentKind::Book => book_ids.push(follow.target.id),
                ContentKind::Author => author_ids.push(follow.target.id),
                _ => {}
            }
        }
        for book_id in self.storage.list_book_ids_by_authors(&author_ids).await? {
            if !book_ids.contains(&book_id) {
                book_ids.push(book_id);
            }
        }
        self.storage
            .list_feed_reviews(&user_ids, &book_ids, FEED_LIMIT)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accounts::AccountService;
    use crate::services::catalog::{CatalogService, NewAuthor, NewBook};
    use crate::services::reviews::{NewReview, ReviewService};
    use crate::storage::InMemoryStorage;

    struct Fixture {
        storage: Arc<dyn Storage>,
        accounts: AccountService,
        catalog: CatalogService,
        reviews: ReviewService,
        social: SocialService,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Fixture {
            accounts: AccountService::new(storage.clone()),
            catalog: CatalogService::new(storage.clone()),
            reviews: ReviewService::new(storage.clone()),
            social: SocialService::new(storage.clone()),
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

    fn user_ref(user: &User) -> ContentRef {
        ContentRef::new(ContentKind::User, user.id.unwrap())
    }

    #[tokio::test]
    async fn follow_is_idempotent_and_notifies_once() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        assert!(fx.social.follow(&bob, user_ref(&alice)).await.unwrap());
        assert!(!fx.social.follow(&bob, user_ref(&alice)).await.unwrap());

        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert_eq!(
            notifications
                .iter()
                .filter(|n| n.kind == NotificationKind::Follow)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let err = fx.social.follow(&alice, user_ref(&alice)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn unfollow_missing_follow_is_not_found() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let err = fx.social.unfollow(&bob, user_ref(&alice)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn follow_respects_notification_preference() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let mut profile = fx
            .storage
            .get_profile_by_user(alice.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        profile.notify_follow = false;
        fx.storage.update_profile(&profile).await.unwrap();

        fx.social.follow(&bob, user_ref(&alice)).await.unwrap();
        let notifications = fx
            .storage
            .list_notifications(alice.id.unwrap(), false, None)
            .await
            .unwrap();
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn collection_items_maintain_book_count() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let book = fx
            .catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let collection = fx
            .social
            .create_collection(&alice, "Sci-fi".to_string(), None, None)
            .await
            .unwrap();
        let collection_id = collection.id.unwrap();

        assert!(fx
            .social
            .add_book(&alice, collection_id, book.id.unwrap(), None)
            .await
            .unwrap());
        assert!(!fx
            .social
            .add_book(&alice, collection_id, book.id.unwrap(), None)
            .await
            .unwrap());

        let stored = fx
            .storage
            .get_collection_by_id(collection_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.book_count, 1);

        fx.social
            .remove_book(&alice, collection_id, book.id.unwrap())
            .await
            .unwrap();
        let stored = fx
            .storage
            .get_collection_by_id(collection_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.book_count, 0);
    }

    #[tokio::test]
    async fn feed_includes_followed_users_books_and_authors() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;
        let carol = register(&fx, "carol").await;
        let dave = register(&fx, "dave").await;

        let author = fx
            .catalog
            .create_author(NewAuthor {
                name: "Frank Herbert".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let followed_book = fx
            .catalog
            .create_book(NewBook {
                title: "Followed Book".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let authors_book = fx
            .catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                author_slugs: vec![author.slug.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        let unrelated_book = fx
            .catalog
            .create_book(NewBook {
                title: "Unrelated".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        // alice follows bob, the followed book, and the author
        fx.social.follow(&alice, user_ref(&bob)).await.unwrap();
        fx.social
            .follow(
                &alice,
                ContentRef::new(ContentKind::Book, followed_book.id.unwrap()),
            )
            .await
            .unwrap();
        fx.social
            .follow(
                &alice,
                ContentRef::new(ContentKind::Author, author.id.unwrap()),
            )
            .await
            .unwrap();

        // bob reviews the unrelated book (followed user)
        fx.reviews
            .create_review(
                &bob,
                NewReview {
                    book_id: unrelated_book.id.unwrap(),
                    title: "By bob".to_string(),
                    body_md: "text".to_string(),
                    rating: Some(4.0),
                    status: None,
                },
            )
            .await
            .unwrap();
        // carol reviews the followed book
        fx.reviews
            .create_review(
                &carol,
                NewReview {
                    book_id: followed_book.id.unwrap(),
                    title: "By carol".to_string(),
                    body_md: "text".to_string(),
                    rating: None,
                    status: None,
                },
            )
            .await
            .unwrap();
        // dave reviews the followed author's book
        fx.reviews
            .create_review(
                &dave,
                NewReview {
                    book_id: authors_book.id.unwrap(),
                    title: "By dave".to_string(),
                    body_md: "text".to_string(),
                    rating: None,
                    status: None,
                },
            )
            .await
            .unwrap();
        // carol also reviews the unrelated book; not in alice's feed
        fx.reviews
            .create_review(
                &carol,
                NewReview {
                    book_id: unrelated_book.id.unwrap(),
                    title: "Unrelated by carol".to_string(),
                    body_md: "text".to_string(),
                    rating: None,
                    status: None,
                },
            )
            .await
            .unwrap();

        let feed = fx.social.feed(&alice).await.unwrap();
        let titles: Vec<&str> = feed.iter().map(|r| r.title.as_str()).collect();
        assert!(titles.contains(&"By bob"));
        assert!(titles.contains(&"By carol"));
        assert!(titles.contains(&"By dave"));
        assert!(!titles.contains(&"Unrelated by carol"));
    }
}
