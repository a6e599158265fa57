use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub bio: String,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub nationality: String,
    pub website: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub website: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub year: Option<i32>,
    pub pages: Option<u32>,
    pub language: String,
    pub publisher_id: Option<Uuid>,
    pub author_ids: Vec<Uuid>,
    pub genre_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,

    // Aggregates, maintained by the review consistency rules only.
    pub avg_rating: f64,
    pub rating_count: u32,
    pub review_count: u32,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionFormat {
    Paperback,
    Hardcover,
    Ebook,
    Audiobook,
}

impl EditionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditionFormat::Paperback => "paperback",
            EditionFormat::Hardcover => "hardcover",
            EditionFormat::Ebook => "ebook",
            EditionFormat::Audiobook => "audiobook",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "paperback" => Ok(EditionFormat::Paperback),
            "hardcover" => Ok(EditionFormat::Hardcover),
            "ebook" => Ok(EditionFormat::Ebook),
            "audiobook" => Ok(EditionFormat::Audiobook),
            other => Err(CoreError::Validation(format!(
                "unknown edition format '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edition {
    pub id: Option<Uuid>,
    pub book_id: Uuid,
    pub isbn13: Option<String>,
    pub format: EditionFormat,
    pub published_at: Option<NaiveDate>,
    pub language: String,
    pub pages: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edition {
    /// ISBN-13 values must be exactly 13 digits when present.
    pub fn validate(&self) -> Result<()> {
        if let Some(isbn) = &self.isbn13 {
            if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
                return Err(CoreError::Validation(
                    "ISBN-13 must be 13 digits".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Filters for book listing and search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookFilter {
    pub genre_slug: Option<String>,
    pub author_slug: Option<String>,
    pub publisher_slug: Option<String>,
    pub tag_slug: Option<String>,
    pub language: Option<String>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub sort: BookSort,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    /// Rating-weighted, then newest. The default.
    #[default]
    Relevance,
    Rating,
    Date,
    Title,
}
