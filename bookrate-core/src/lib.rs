pub mod auth;
pub mod common;
pub mod content;
pub mod domain;
pub mod markdown;
pub mod services;
pub mod slug;
pub mod storage;

#[cfg(feature = "db")]
pub mod database;

// Re-export commonly used types
pub use common::error::{CoreError, Result};
pub use content::{ContentKind, ContentRef};
pub use domain::*;

// Re-export external dependencies that consumers will need
pub use chrono;
pub use serde;
pub use serde_json;
pub use uuid;
