mod in_memory;
mod traits;

#[cfg(feature = "db")]
mod database;

pub use in_memory::InMemoryStorage;
pub use traits::{BookRatingStats, ReviewFilter, ReviewSearchFilter, ReviewSort, Storage};

#[cfg(feature = "db")]
pub use database::DatabaseStorage;
