//! Use-case layer. Handlers call into these services; every denormalized
//! counter (book aggregates, like/comment counts, shelf/collection sizes)
//! is recomputed here, synchronously, after the mutation that affects it.

mod accounts;
mod catalog;
mod moderation;
mod notify;
mod reviews;
mod search;
mod shelves;
mod social;

pub use accounts::{AccountService, ProfileUpdate, UserDetail};
pub use catalog::{
    BookDetail, BookUpdate, CatalogService, NewAuthor, NewBook, NewEdition, NewGenre,
    NewPublisher, NewTag,
};
pub use moderation::ModerationService;
pub use reviews::{NewComment, NewReview, ReviewService, ReviewUpdate};
pub use search::{SearchResults, SearchScope, SearchService, Suggestion};
pub use shelves::{ShelfService, ShelfUpdate};
pub use social::{CollectionUpdate, SocialService};

use crate::storage::Storage;
use std::sync::Arc;

/// Bundle of all services over a shared storage backend.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub reviews: ReviewService,
    pub shelves: ShelfService,
    pub social: SocialService,
    pub moderation: ModerationService,
    pub search: SearchService,
}

impl Services {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            accounts: AccountService::new(storage.clone()),
            catalog: CatalogService::new(storage.clone()),
            reviews: ReviewService::new(storage.clone()),
            shelves: ShelfService::new(storage.clone()),
            social: SocialService::new(storage.clone()),
            moderation: ModerationService::new(storage.clone()),
            search: SearchService::new(storage),
        }
    }
}
