use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};

/// The three built-in shelves every account gets at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShelfKind {
    WantToRead,
    Reading,
    Read,
}

impl ShelfKind {
    pub const ALL: [ShelfKind; 3] = [ShelfKind::WantToRead, ShelfKind::Reading, ShelfKind::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShelfKind::WantToRead => "want_to_read",
            ShelfKind::Reading => "reading",
            ShelfKind::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "want_to_read" => Ok(ShelfKind::WantToRead),
            "reading" => Ok(ShelfKind::Reading),
            "read" => Ok(ShelfKind::Read),
            other => Err(CoreError::Validation(format!(
                "unknown shelf kind '{other}'"
            ))),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ShelfKind::WantToRead => "Want to Read",
            ShelfKind::Reading => "Reading",
            ShelfKind::Read => "Read",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(CoreError::Validation(format!(
                "unknown visibility '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shelf {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub name: String,
    /// Set for the built-in shelves; None for user-created ones.
    pub system_kind: Option<ShelfKind>,
    pub description: String,
    pub visibility: Visibility,
    pub book_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shelf {
    pub fn is_system(&self) -> bool {
        self.system_kind.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfItem {
    pub id: Option<Uuid>,
    pub shelf_id: Uuid,
    pub book_id: Uuid,
    pub position: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub id: Option<Uuid>,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub page: Option<u32>,
    pub percent: Option<f64>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReadingProgress {
    /// Derive page from percent (or vice versa) using the book's page count,
    /// then validate bounds.
    pub fn normalize(&mut self, book_pages: Option<u32>) -> Result<()> {
        if let Some(total) = book_pages {
            if total > 0 {
                match (self.page, self.percent) {
                    (Some(page), None) => {
                        self.percent = Some((page as f64 / total as f64) * 100.0);
                    }
                    (None, Some(percent)) => {
                        self.page = Some(((percent / 100.0) * total as f64) as u32);
                    }
                    _ => {}
                }
            }
            if let Some(page) = self.page {
                if page > total {
                    return Err(CoreError::Validation(
                        "page cannot exceed total pages of the book".to_string(),
                    ));
                }
            }
        }
        if let Some(percent) = self.percent {
            if !(0.0..=100.0).contains(&percent) {
                return Err(CoreError::Validation(
                    "percent must be between 0 and 100".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn progress(page: Option<u32>, percent: Option<f64>) -> ReadingProgress {
        ReadingProgress {
            id: None,
            user_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            page,
            percent,
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn percent_derived_from_page() {
        let mut p = progress(Some(50), None);
        p.normalize(Some(200)).unwrap();
        assert_eq!(p.percent, Some(25.0));
    }

    #[test]
    fn page_derived_from_percent() {
        let mut p = progress(None, Some(50.0));
        p.normalize(Some(300)).unwrap();
        assert_eq!(p.page, Some(150));
    }

    #[test]
    fn page_beyond_book_rejected() {
        let mut p = progress(Some(500), None);
        assert!(p.normalize(Some(300)).is_err());
    }

    #[test]
    fn percent_out_of_range_rejected() {
        let mut p = progress(None, Some(120.0));
        assert!(p.normalize(None).is_err());
    }
}
