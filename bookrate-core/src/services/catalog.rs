use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::domain::*;
use crate::slug::{slug_candidates, slugify};
use crate::storage::Storage;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAuthor {
    pub name: String,
    pub bio: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGenre {
    pub name: String,
    pub description: Option<String>,
    pub parent_slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPublisher {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub pages: Option<u32>,
    pub language: Option<String>,
    pub publisher_slug: Option<String>,
    #[serde(default)]
    pub author_slugs: Vec<String>,
    #[serde(default)]
    pub genre_slugs: Vec<String>,
    #[serde(default)]
    pub tag_slugs: Vec<String>,
}

/// Partial book update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub pages: Option<u32>,
    pub language: Option<String>,
    pub publisher_slug: Option<String>,
    pub author_slugs: Option<Vec<String>>,
    pub genre_slugs: Option<Vec<String>>,
    pub tag_slugs: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEdition {
    pub isbn13: Option<String>,
    pub format: Option<EditionFormat>,
    pub published_at: Option<NaiveDate>,
    pub language: Option<String>,
    pub pages: Option<u32>,
}

/// A book with its associations expanded for detail responses.
#[derive(Debug, Clone, Serialize)]
pub struct BookDetail {
    pub book: Book,
    pub authors: Vec<Author>,
    pub genres: Vec<Genre>,
    pub tags: Vec<Tag>,
    pub publisher: Option<Publisher>,
    pub editions: Vec<Edition>,
}

#[derive(Clone)]
pub struct CatalogService {
    storage: Arc<dyn Storage>,
}

impl CatalogService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn unique_author_slug(&self, name: &str) -> Result<String> {
        let base = slugify(name);
        for candidate in slug_candidates(&base) {
            if self.storage.get_author_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        unreachable!("slug candidates are unbounded")
    }

    async fn unique_book_slug(&self, title: &str) -> Result<String> {
        let base = slugify(title);
        for candidate in slug_candidates(&base) {
            if self.storage.get_book_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        unreachable!("slug candidates are unbounded")
    }

    pub async fn create_author(&self, input: NewAuthor) -> Result<Author> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation("author name is required".to_string()));
        }
        let now = Utc::now();
        let mut author = Author {
            id: None,
            slug: self.unique_author_slug(&input.name).await?,
            name: input.name,
            bio: input.bio.unwrap_or_default(),
            birth_date: input.birth_date,
            death_date: input.death_date,
            nationality: input.nationality.unwrap_or_default(),
            website: input.website.unwrap_or_default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_author(&mut author).await?;
        Ok(author)
    }

    pub async fn create_genre(&self, input: NewGenre) -> Result<Genre> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation("genre name is required".to_string()));
        }
        let parent_id = match &input.parent_slug {
            Some(slug) => Some(
                self.storage
                    .get_genre_by_slug(slug)
                    .await?
                    .and_then(|g| g.id)
                    .ok_or_else(|| CoreError::NotFound(format!("genre '{slug}'")))?,
            ),
            None => None,
        };
        let base = slugify(&input.name);
        let mut slug = base.clone();
        for candidate in slug_candidates(&base) {
            if self.storage.get_genre_by_slug(&candidate).await?.is_none() {
                slug = candidate;
                break;
            }
        }
        let now = Utc::now();
        let mut genre = Genre {
            id: None,
            name: input.name,
            slug,
            description: input.description.unwrap_or_default(),
            parent_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_genre(&mut genre).await?;
        Ok(genre)
    }

    pub async fn create_publisher(&self, input: NewPublisher) -> Result<Publisher> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "publisher name is required".to_string(),
            ));
        }
        let base = slugify(&input.name);
        let mut slug = base.clone();
        for candidate in slug_candidates(&base) {
            if self
                .storage
                .get_publisher_by_slug(&candidate)
                .await?
                .is_none()
            {
                slug = candidate;
                break;
            }
        }
        let now = Utc::now();
        let mut publisher = Publisher {
            id: None,
            name: input.name,
            slug,
            description: input.description.unwrap_or_default(),
            website: input.website.unwrap_or_default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_publisher(&mut publisher).await?;
        Ok(publisher)
    }

    pub async fn create_tag(&self, input: NewTag) -> Result<Tag> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation("tag name is required".to_string()));
        }
        let base = slugify(&input.name);
        let mut slug = base.clone();
        for candidate in slug_candidates(&base) {
            if self.storage.get_tag_by_slug(&candidate).await?.is_none() {
                slug = candidate;
                break;
            }
        }
        let now = Utc::now();
        let mut tag = Tag {
            id: None,
            name: input.name,
            slug,
            description: input.description.unwrap_or_default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_tag(&mut tag).await?;
        Ok(tag)
    }

    async fn resolve_publisher(&self, slug: &str) -> Result<Uuid> {
        self.storage
            .get_publisher_by_slug(slug)
            .await?
            .and_then(|p| p.id)
            .ok_or_else(|| CoreError::NotFound(format!("publisher '{slug}'")))
    }

    async fn resolve_authors(&self, slugs: &[String]) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let id = self
                .storage
                .get_author_by_slug(slug)
                .await?
                .and_then(|a| a.id)
                .ok_or_else(|| CoreError::NotFound(format!("author '{slug}'")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn resolve_genres(&self, slugs: &[String]) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let id = self
                .storage
                .get_genre_by_slug(slug)
                .await?
                .and_then(|g| g.id)
                .ok_or_else(|| CoreError::NotFound(format!("genre '{slug}'")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn resolve_tags(&self, slugs: &[String]) -> Result<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let id = self
                .storage
                .get_tag_by_slug(slug)
                .await?
                .and_then(|t| t.id)
                .ok_or_else(|| CoreError::NotFound(format!("tag '{slug}'")))?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn create_book(&self, input: NewBook) -> Result<Book> {
        if input.title.trim().is_empty() {
            return Err(CoreError::Validation("book title is required".to_string()));
        }
        let publisher_id = match &input.publisher_slug {
            Some(slug) => Some(self.resolve_publisher(slug).await?),
            None => None,
        };
        let author_ids = self.resolve_authors(&input.author_slugs).await?;
        let genre_ids = self.resolve_genres(&input.genre_slugs).await?;
        let tag_ids = self.resolve_tags(&input.tag_slugs).await?;

        let now = Utc::now();
        let mut book = Book {
            id: None,
            slug: self.unique_book_slug(&input.title).await?,
            title: input.title,
            description: input.description.unwrap_or_default(),
            year: input.year,
            pages: input.pages,
            language: input.language.unwrap_or_else(|| "en".to_string()),
            publisher_id,
            author_ids,
            genre_ids,
            tag_ids,
            avg_rating: 0.0,
            rating_count: 0,
            review_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_book(&mut book).await?;
        Ok(book)
    }

    pub async fn update_book(&self, slug: &str, update: BookUpdate) -> Result<Book> {
        let mut book = self
            .storage
            .get_book_by_slug(slug)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("book '{slug}'")))?;

        if let Some(title) = update.title {
            if title.trim().is_empty() {
                return Err(CoreError::Validation("book title is required".to_string()));
            }
            book.title = title;
        }
        if let Some(description) = update.description {
            book.description = description;
        }
        if let Some(year) = update.year {
            book.year = Some(year);
        }
        if let Some(pages) = update.pages {
            book.pages = Some(pages);
        }
        if let Some(language) = update.language {
            book.language = language;
        }
        if let Some(publisher_slug) = update.publisher_slug {
            book.publisher_id = Some(self.resolve_publisher(&publisher_slug).await?);
        }
        if let Some(author_slugs) = update.author_slugs {
            book.author_ids = self.resolve_authors(&author_slugs).await?;
        }
        if let Some(genre_slugs) = update.genre_slugs {
            book.genre_ids = self.resolve_genres(&genre_slugs).await?;
        }
        if let Some(tag_slugs) = update.tag_slugs {
            book.tag_ids = self.resolve_tags(&tag_slugs).await?;
        }
        if let Some(is_active) = update.is_active {
            book.is_active = is_active;
        }
        book.updated_at = Utc::now();
        self.storage.update_book(&book).await?;
        Ok(book)
    }

    pub async fn create_edition(&self, book_slug: &str, input: NewEdition) -> Result<Edition> {
        let book = self
            .storage
            .get_book_by_slug(book_slug)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("book '{book_slug}'")))?;

        if let Some(isbn) = &input.isbn13 {
            if self.storage.get_edition_by_isbn(isbn).await?.is_some() {
                return Err(CoreError::Conflict(format!(
                    "ISBN {isbn} is already registered"
                )));
            }
        }

        let now = Utc::now();
        let mut edition = Edition {
            id: None,
            book_id: book.id.expect("stored book has id"),
            isbn13: input.isbn13,
            format: input.format.unwrap_or(EditionFormat::Paperback),
            published_at: input.published_at,
            language: input.language.unwrap_or_else(|| book.language.clone()),
            pages: input.pages,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        edition.validate()?;
        self.storage.create_edition(&mut edition).await?;
        Ok(edition)
    }

    pub async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        self.storage.list_books(filter).await
    }

    /// Book detail with associations and editions expanded.
    pub async fn book_detail(&self, slug: &str) -> Result<BookDetail> {
        let book = self
            .storage
            .get_book_by_slug(slug)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("book '{slug}'")))?;
        let book_id = book.id.expect("stored book has id");

        let mut authors = Vec::new();
        for id in &book.author_ids {
            if let Some(author) = self.storage.get_author_by_id(*id).await? {
                authors.push(author);
            }
        }
        let mut genres = Vec::new();
        for id in &book.genre_ids {
            if let Some(genre) = self.storage.get_genre_by_id(*id).await? {
                genres.push(genre);
            }
        }
        let mut tags = Vec::new();
        for id in &book.tag_ids {
            if let Some(tag) = self.storage.get_tag_by_id(*id).await? {
                tags.push(tag);
            }
        }
        let publisher = match book.publisher_id {
            Some(id) => self.storage.get_publisher_by_id(id).await?,
            None => None,
        };
        let editions = self.storage.list_editions_by_book(book_id).await?;

        Ok(BookDetail {
            book,
            authors,
            genres,
            tags,
            publisher,
            editions,
        })
    }

    pub async fn list_authors(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Author>> {
        self.storage.list_authors(limit, offset).await
    }

    /// Author page: the author and their active books.
    pub async fn author_detail(&self, slug: &str) -> Result<(Author, Vec<Book>)> {
        let author = self
            .storage
            .get_author_by_slug(slug)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("author '{slug}'")))?;
        let books = self
            .storage
            .list_books(&BookFilter {
                author_slug: Some(slug.to_string()),
                ..Default::default()
            })
            .await?;
        Ok((author, books))
    }

    pub async fn list_genres(&self) -> Result<Vec<Genre>> {
        self.storage.list_genres().await
    }

    pub async fn genre_detail(&self, slug: &str) -> Result<(Genre, Vec<Book>)> {
        let genre = self
            .storage
            .get_genre_by_slug(slug)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("genre '{slug}'")))?;
        let books = self
            .storage
            .list_books(&BookFilter {
                genre_slug: Some(slug.to_string()),
                ..Default::default()
            })
            .await?;
        Ok((genre, books))
    }

    pub async fn list_publishers(&self) -> Result<Vec<Publisher>> {
        self.storage.list_publishers().await
    }

    pub async fn publisher_detail(&self, slug: &str) -> Result<(Publisher, Vec<Book>)> {
        let publisher = self
            .storage
            .get_publisher_by_slug(slug)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("publisher '{slug}'")))?;
        let books = self
            .storage
            .list_books(&BookFilter {
                publisher_slug: Some(slug.to_string()),
                ..Default::default()
            })
            .await?;
        Ok((publisher, books))
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.storage.list_tags().await
    }

    pub async fn tag_detail(&self, slug: &str) -> Result<(Tag, Vec<Book>)> {
        let tag = self
            .storage
            .get_tag_by_slug(slug)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| CoreError::NotFound(format!("tag '{slug}'")))?;
        let books = self
            .storage
            .list_books(&BookFilter {
                tag_slug: Some(slug.to_string()),
                ..Default::default()
            })
            .await?;
        Ok((tag, books))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(InMemoryStorage::new()))
    }

    #[tokio::test]
    async fn book_slugs_deduplicate_with_suffixes() {
        let catalog = service();
        let first = catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.slug, "dune");
        assert_eq!(second.slug, "dune-2");
    }

    #[tokio::test]
    async fn create_book_resolves_catalog_slugs() {
        let catalog = service();
        let author = catalog
            .create_author(NewAuthor {
                name: "Frank Herbert".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let book = catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                author_slugs: vec![author.slug.clone()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(book.author_ids, vec![author.id.unwrap()]);

        let err = catalog
            .create_book(NewBook {
                title: "Ghost Book".to_string(),
                author_slugs: vec!["missing".to_string()],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn edition_isbn_is_validated_and_unique() {
        let catalog = service();
        catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = catalog
            .create_edition(
                "dune",
                NewEdition {
                    isbn13: Some("not-an-isbn".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        catalog
            .create_edition(
                "dune",
                NewEdition {
                    isbn13: Some("9780441172719".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = catalog
            .create_edition(
                "dune",
                NewEdition {
                    isbn13: Some("9780441172719".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }
}
