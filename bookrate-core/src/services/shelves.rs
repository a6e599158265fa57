use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::domain::*;
use crate::storage::Storage;

/// Partial shelf update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShelfUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Clone)]
pub struct ShelfService {
    storage: Arc<dyn Storage>,
}

impl ShelfService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn refresh_book_count(&self, shelf_id: Uuid) -> Result<()> {
        if let Some(mut shelf) = self.storage.get_shelf_by_id(shelf_id).await? {
            shelf.book_count = self.storage.count_shelf_items(shelf_id).await?;
            self.storage.update_shelf(&shelf).await?;
        }
        Ok(())
    }

    async fn owned_shelf(&self, user: &User, shelf_id: Uuid) -> Result<Shelf> {
        let shelf = self
            .storage
            .get_shelf_by_id(shelf_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| CoreError::NotFound("shelf".to_string()))?;
        if shelf.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "this shelf belongs to another user".to_string(),
            ));
        }
        Ok(shelf)
    }

    pub async fn list_own(&self, user: &User) -> Result<Vec<Shelf>> {
        self.storage
            .list_shelves_by_user(user.id.expect("authenticated user has id"))
            .await
    }

    /// Another user's shelves: all of them for the owner, public ones for
    /// everyone else.
    pub async fn list_for_username(
        &self,
        viewer: Option<&User>,
        username: &str,
    ) -> Result<Vec<Shelf>> {
        let owner = self
            .storage
            .get_user_by_username(username)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("user '{username}'")))?;
        let owner_id = owner.id.expect("stored user has id");
        let shelves = self.storage.list_shelves_by_user(owner_id).await?;
        let is_owner = viewer.map_or(false, |v| v.id == owner.id);
        Ok(shelves
            .into_iter()
            .filter(|s| is_owner || s.visibility == Visibility::Public)
            .collect())
    }

    pub async fn create_shelf(
        &self,
        user: &User,
        name: String,
        description: Option<String>,
        visibility: Option<Visibility>,
    ) -> Result<Shelf> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("shelf name is required".to_string()));
        }
        let now = Utc::now();
        let mut shelf = Shelf {
            id: None,
            user_id: user.id.expect("authenticated user has id"),
            name,
            system_kind: None,
            description: description.unwrap_or_default(),
            visibility: visibility.unwrap_or(Visibility::Public),
            book_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_shelf(&mut shelf).await?;
        Ok(shelf)
    }

    pub async fn update_shelf(
        &self,
        user: &User,
        shelf_id: Uuid,
        update: ShelfUpdate,
    ) -> Result<Shelf> {
        let mut shelf = self.owned_shelf(user, shelf_id).await?;
        if let Some(name) = update.name {
            if shelf.is_system() {
                return Err(CoreError::Validation(
                    "system shelves cannot be renamed".to_string(),
                ));
            }
            if name.trim().is_empty() {
                return Err(CoreError::Validation("shelf name is required".to_string()));
            }
            shelf.name = name;
        }
        if let Some(description) = update.description {
            shelf.description = description;
        }
        if let Some(visibility) = update.visibility {
            shelf.visibility = visibility;
        }
        shelf.updated_at = Utc::now();
        self.storage.update_shelf(&shelf).await?;
        Ok(shelf)
    }

    pub async fn delete_shelf(&self, user: &User, shelf_id: Uuid) -> Result<()> {
        let shelf = self.owned_shelf(user, shelf_id).await?;
        if shelf.is_system() {
            return Err(CoreError::Validation(
                "system shelves cannot be deleted".to_string(),
            ));
        }
        self.storage.delete_shelf(shelf_id).await
    }

    /// A shelf with its items. Private shelves are visible to their owner
    /// only.
    pub async fn shelf_detail(
        &self,
        viewer: Option<&User>,
        shelf_id: Uuid,
    ) -> Result<(Shelf, Vec<ShelfItem>)> {
        let shelf = self
            .storage
            .get_shelf_by_id(shelf_id)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| CoreError::NotFound("shelf".to_string()))?;
        let is_owner = viewer.map_or(false, |v| v.id == Some(shelf.user_id));
        if shelf.visibility == Visibility::Private && !is_owner {
            return Err(CoreError::NotFound("shelf".to_string()));
        }
        let items = self.storage.list_shelf_items(shelf_id).await?;
        Ok((shelf, items))
    }

    /// Put a book on a shelf. Idempotent; new items are appended at the end.
    pub async fn add_book(&self, user: &User, shelf_id: Uuid, book_id: Uuid) -> Result<bool> {
        self.owned_shelf(user, shelf_id).await?;
        self.storage
            .get_book_by_id(book_id)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound("book".to_string()))?;

        if self.storage.get_shelf_item(shelf_id, book_id).await?.is_some() {
            return Ok(false);
        }
        let mut item = ShelfItem {
            id: None,
            shelf_id,
            book_id,
            position: self.storage.count_shelf_items(shelf_id).await?,
            added_at: Utc::now(),
        };
        self.storage.create_shelf_item(&mut item).await?;
        self.refresh_book_count(shelf_id).await?;
        Ok(true)
    }

    pub async fn remove_book(&self, user: &User, shelf_id: Uuid, book_id: Uuid) -> Result<()> {
        self.owned_shelf(user, shelf_id).await?;
        self.storage
            .get_shelf_item(shelf_id, book_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("shelf item".to_string()))?;
        self.storage.delete_shelf_item(shelf_id, book_id).await?;
        self.refresh_book_count(shelf_id).await
    }

    /// Create or update reading progress for a book. Page and percent are
    /// derived from one another using the book's page count.
    pub async fn upsert_progress(
        &self,
        user: &User,
        book_id: Uuid,
        page: Option<u32>,
        percent: Option<f64>,
        notes: Option<String>,
    ) -> Result<ReadingProgress> {
        let user_id = user.id.expect("authenticated user has id");
        let book = self
            .storage
            .get_book_by_id(book_id)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound("book".to_string()))?;

        let now = Utc::now();
        match self.storage.get_reading_progress(user_id, book_id).await? {
            Some(mut progress) => {
                if page.is_some() || percent.is_some() {
                    progress.page = page;
                    progress.percent = percent;
                }
                if let Some(notes) = notes {
                    progress.notes = notes;
                }
                progress.normalize(book.pages)?;
                progress.updated_at = now;
                self.storage.update_reading_progress(&progress).await?;
                Ok(progress)
            }
            None => {
                let mut progress = ReadingProgress {
                    id: None,
                    user_id,
                    book_id,
                    page,
                    percent,
                    notes: notes.unwrap_or_default(),
                    created_at: now,
                    updated_at: now,
                };
                progress.normalize(book.pages)?;
                self.storage.create_reading_progress(&mut progress).await?;
                Ok(progress)
            }
        }
    }

    pub async fn list_progress(&self, user: &User) -> Result<Vec<ReadingProgress>> {
        self.storage
            .list_reading_progress_by_user(user.id.expect("authenticated user has id"))
            .await
    }

    pub async fn delete_progress(&self, user: &User, progress_id: Uuid) -> Result<()> {
        let progress = self
            .storage
            .get_reading_progress_by_id(progress_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("reading progress".to_string()))?;
        if progress.user_id != user.id.expect("authenticated user has id") {
            return Err(CoreError::Forbidden(
                "this progress entry belongs to another user".to_string(),
            ));
        }
        self.storage.delete_reading_progress(progress_id).await
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
        shelves: ShelfService,
        catalog: CatalogService,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Fixture {
            accounts: AccountService::new(storage.clone()),
            shelves: ShelfService::new(storage.clone()),
            catalog: CatalogService::new(storage.clone()),
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

    async fn make_book(fx: &Fixture, title: &str, pages: Option<u32>) -> Uuid {
        fx.catalog
            .create_book(NewBook {
                title: title.to_string(),
                pages,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
            .unwrap()
    }

    #[tokio::test]
    async fn adding_and_removing_books_maintains_count() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let shelves = fx.shelves.list_own(&alice).await.unwrap();
        let shelf_id = shelves[0].id.unwrap();
        let book = make_book(&fx, "Dune", None).await;

        assert!(fx.shelves.add_book(&alice, shelf_id, book).await.unwrap());
        // idempotent
        assert!(!fx.shelves.add_book(&alice, shelf_id, book).await.unwrap());

        let shelf = fx.storage.get_shelf_by_id(shelf_id).await.unwrap().unwrap();
        assert_eq!(shelf.book_count, 1);

        fx.shelves.remove_book(&alice, shelf_id, book).await.unwrap();
        let shelf = fx.storage.get_shelf_by_id(shelf_id).await.unwrap().unwrap();
        assert_eq!(shelf.book_count, 0);
    }

    #[tokio::test]
    async fn system_shelves_cannot_be_deleted_or_renamed() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let shelves = fx.shelves.list_own(&alice).await.unwrap();
        let system = shelves.iter().find(|s| s.is_system()).unwrap();
        let shelf_id = system.id.unwrap();

        assert!(fx.shelves.delete_shelf(&alice, shelf_id).await.is_err());
        assert!(fx
            .shelves
            .update_shelf(
                &alice,
                shelf_id,
                ShelfUpdate {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                }
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn custom_shelves_are_owner_scoped() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let shelf = fx
            .shelves
            .create_shelf(&alice, "Favorites".to_string(), None, None)
            .await
            .unwrap();
        let err = fx
            .shelves
            .delete_shelf(&bob, shelf.id.unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn private_shelves_hidden_from_other_users() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let bob = register(&fx, "bob").await;

        let shelf = fx
            .shelves
            .create_shelf(
                &alice,
                "Secret".to_string(),
                None,
                Some(Visibility::Private),
            )
            .await
            .unwrap();
        let shelf_id = shelf.id.unwrap();

        assert!(fx.shelves.shelf_detail(Some(&alice), shelf_id).await.is_ok());
        assert!(fx.shelves.shelf_detail(Some(&bob), shelf_id).await.is_err());

        let visible = fx
            .shelves
            .list_for_username(Some(&bob), "alice")
            .await
            .unwrap();
        assert!(visible.iter().all(|s| s.name != "Secret"));
    }

    #[tokio::test]
    async fn progress_derives_percent_and_validates_bounds() {
        let fx = fixture();
        let alice = register(&fx, "alice").await;
        let book = make_book(&fx, "Dune", Some(400)).await;

        let progress = fx
            .shelves
            .upsert_progress(&alice, book, Some(100), None, None)
            .await
            .unwrap();
        assert_eq!(progress.percent, Some(25.0));

        // updating the same row, not creating a second one
        let updated = fx
            .shelves
            .upsert_progress(&alice, book, Some(200), None, None)
            .await
            .unwrap();
        assert_eq!(updated.id, progress.id);
        assert_eq!(updated.percent, Some(50.0));

        let err = fx
            .shelves
            .upsert_progress(&alice, book, Some(500), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
