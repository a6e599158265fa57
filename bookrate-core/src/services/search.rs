use serde::Serialize;
use std::sync::Arc;

use crate::common::error::Result;
use crate::domain::*;
use crate::storage::{ReviewSearchFilter, ReviewSort, Storage};

const SECTION_LIMIT: usize = 20;
const AUTOCOMPLETE_LIMIT: usize = 10;
const AUTOCOMPLETE_MIN_LEN: usize = 2;

/// Unified search results, one section per content type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub books: Vec<Book>,
    pub authors: Vec<Author>,
    pub reviews: Vec<Review>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Which sections a search request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    All,
    Books,
    Authors,
    Reviews,
}

impl SearchScope {
    pub fn parse(s: &str) -> Self {
        match s {
            "books" => SearchScope::Books,
            "authors" => SearchScope::Authors,
            "reviews" => SearchScope::Reviews,
            _ => SearchScope::All,
        }
    }

    fn covers_books(&self) -> bool {
        matches!(self, SearchScope::All | SearchScope::Books)
    }

    fn covers_authors(&self) -> bool {
        matches!(self, SearchScope::All | SearchScope::Authors)
    }

    fn covers_reviews(&self) -> bool {
        matches!(self, SearchScope::All | SearchScope::Reviews)
    }
}

#[derive(Clone)]
pub struct SearchService {
    storage: Arc<dyn Storage>,
}

impl SearchService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Unified search over books, authors and reviews. Book filters apply to
    /// the book section; rating bounds also narrow the review section.
    pub async fn search(
        &self,
        query: &str,
        scope: SearchScope,
        mut book_filter: BookFilter,
    ) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let mut results = SearchResults::default();

        if scope.covers_books() {
            book_filter.limit = Some(SECTION_LIMIT);
            results.books = self.storage.search_books(query, &book_filter).await?;
        }
        if scope.covers_authors() {
            results.authors = self.storage.search_authors(query, SECTION_LIMIT).await?;
        }
        if scope.covers_reviews() {
            let review_filter = ReviewSearchFilter {
                min_rating: book_filter.min_rating,
                max_rating: book_filter.max_rating,
                sort: match book_filter.sort {
                    BookSort::Rating => ReviewSort::Rating,
                    BookSort::Date => ReviewSort::Date,
                    _ => ReviewSort::Relevance,
                },
                limit: Some(SECTION_LIMIT),
            };
            results.reviews = self.storage.search_reviews(query, &review_filter).await?;
        }

        results.total = results.books.len() + results.authors.len() + results.reviews.len();
        Ok(results)
    }

    /// Prefix suggestions over book titles or author names.
    pub async fn autocomplete(&self, query: &str, kind: &str) -> Result<Vec<Suggestion>> {
        let query = query.trim();
        if query.len() < AUTOCOMPLETE_MIN_LEN {
            return Ok(Vec::new());
        }
        match kind {
            "authors" => Ok(self
                .storage
                .autocomplete_author_names(query, AUTOCOMPLETE_LIMIT)
                .await?
                .into_iter()
                .map(|text| Suggestion {
                    text,
                    kind: "author",
                })
                .collect()),
            _ => Ok(self
                .storage
                .autocomplete_book_titles(query, AUTOCOMPLETE_LIMIT)
                .await?
                .into_iter()
                .map(|text| Suggestion { text, kind: "book" })
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accounts::AccountService;
    use crate::services::catalog::{CatalogService, NewAuthor, NewBook, NewTag};
    use crate::services::reviews::{NewReview, ReviewService};
    use crate::storage::InMemoryStorage;

    struct Fixture {
        accounts: AccountService,
        catalog: CatalogService,
        reviews: ReviewService,
        search: SearchService,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Fixture {
            accounts: AccountService::new(storage.clone()),
            catalog: CatalogService::new(storage.clone()),
            reviews: ReviewService::new(storage.clone()),
            search: SearchService::new(storage),
        }
    }

    async fn seed(fx: &Fixture) {
        let author = fx
            .catalog
            .create_author(NewAuthor {
                name: "Frank Herbert".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let tag = fx
            .catalog
            .create_tag(NewTag {
                name: "desert".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let book = fx
            .catalog
            .create_book(NewBook {
                title: "Dune".to_string(),
                description: "Spice and sandworms".to_string().into(),
                author_slugs: vec![author.slug],
                tag_slugs: vec![tag.slug],
                ..Default::default()
            })
            .await
            .unwrap();
        fx.catalog
            .create_book(NewBook {
                title: "Emma".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let (user, _) = fx
            .accounts
            .register("reader", "reader@example.com", "correcthorse")
            .await
            .unwrap();
        fx.reviews
            .create_review(
                &user,
                NewReview {
                    book_id: book.id.unwrap(),
                    title: "Sandworm of a book".to_string(),
                    body_md: "Loved the ecology of Arrakis.".to_string(),
                    rating: Some(4.5),
                    status: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unified_search_spans_sections() {
        let fx = fixture();
        seed(&fx).await;

        let results = fx
            .search
            .search("dune", SearchScope::All, BookFilter::default())
            .await
            .unwrap();
        assert_eq!(results.books.len(), 1);
        assert_eq!(results.reviews.len(), 1); // matched via the book title
        assert_eq!(results.total, results.books.len() + results.reviews.len());
    }

    #[tokio::test]
    async fn search_matches_author_and_tag_names() {
        let fx = fixture();
        seed(&fx).await;

        let by_author = fx
            .search
            .search("herbert", SearchScope::Books, BookFilter::default())
            .await
            .unwrap();
        assert_eq!(by_author.books.len(), 1);

        let by_tag = fx
            .search
            .search("desert", SearchScope::Books, BookFilter::default())
            .await
            .unwrap();
        assert_eq!(by_tag.books.len(), 1);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let fx = fixture();
        seed(&fx).await;
        let results = fx
            .search
            .search("  ", SearchScope::All, BookFilter::default())
            .await
            .unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn rating_filter_narrows_books() {
        let fx = fixture();
        seed(&fx).await;

        let results = fx
            .search
            .search(
                "dune",
                SearchScope::Books,
                BookFilter {
                    min_rating: Some(4.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.books.len(), 1);

        let results = fx
            .search
            .search(
                "dune",
                SearchScope::Books,
                BookFilter {
                    min_rating: Some(4.9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(results.books.is_empty());
    }

    #[tokio::test]
    async fn autocomplete_requires_two_chars() {
        let fx = fixture();
        seed(&fx).await;

        assert!(fx.search.autocomplete("d", "books").await.unwrap().is_empty());
        let suggestions = fx.search.autocomplete("du", "books").await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].text, "Dune");

        let authors = fx.search.autocomplete("fra", "authors").await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].kind, "author");
    }
}
