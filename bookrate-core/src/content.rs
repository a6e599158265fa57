use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};

/// Kinds of content that polymorphic associations (likes, follows, reports,
/// notifications) may point at. Stored in SQL as a text discriminator next
/// to the target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    User,
    Author,
    Book,
    Review,
    Comment,
    Collection,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::User => "user",
            ContentKind::Author => "author",
            ContentKind::Book => "book",
            ContentKind::Review => "review",
            ContentKind::Comment => "comment",
            ContentKind::Collection => "collection",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(ContentKind::User),
            "author" => Ok(ContentKind::Author),
            "book" => Ok(ContentKind::Book),
            "review" => Ok(ContentKind::Review),
            "comment" => Ok(ContentKind::Comment),
            "collection" => Ok(ContentKind::Collection),
            other => Err(CoreError::Validation(format!(
                "unknown content kind '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference to a piece of content: the Rust rendering of a
/// `(content_type, object_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: Uuid,
}

impl ContentRef {
    pub fn new(kind: ContentKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Kinds a like may target.
pub const LIKEABLE_KINDS: &[ContentKind] = &[ContentKind::Review, ContentKind::Comment];

/// Kinds a follow may target.
pub const FOLLOWABLE_KINDS: &[ContentKind] =
    &[ContentKind::User, ContentKind::Author, ContentKind::Book];

/// Kinds a report may target.
pub const REPORTABLE_KINDS: &[ContentKind] = &[
    ContentKind::Review,
    ContentKind::Comment,
    ContentKind::User,
    ContentKind::Collection,
];

/// Validate that `target` is acceptable for an association limited to
/// `allowed` kinds.
pub fn ensure_kind(target: ContentRef, allowed: &[ContentKind], what: &str) -> Result<()> {
    if allowed.contains(&target.kind) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{what} cannot target content of kind '{}'",
            target.kind
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            ContentKind::User,
            ContentKind::Author,
            ContentKind::Book,
            ContentKind::Review,
            ContentKind::Comment,
            ContentKind::Collection,
        ] {
            assert_eq!(ContentKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(ContentKind::parse("shelf").is_err());
    }

    #[test]
    fn likes_only_target_reviews_and_comments() {
        let review = ContentRef::new(ContentKind::Review, Uuid::new_v4());
        let book = ContentRef::new(ContentKind::Book, Uuid::new_v4());
        assert!(ensure_kind(review, LIKEABLE_KINDS, "like").is_ok());
        assert!(ensure_kind(book, LIKEABLE_KINDS, "like").is_err());
    }
}
