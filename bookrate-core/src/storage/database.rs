mod rows;

use super::traits::{BookRatingStats, ReviewFilter, ReviewSearchFilter, ReviewSort, Storage};
use crate::common::error::Result;
use crate::content::ContentRef;
use crate::database::DatabaseManager;
use crate::domain::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Row, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use rows::*;

/// Storage implementation backed by Turso/libSQL.
pub struct DatabaseStorage {
    db: Arc<DatabaseManager>,
}

fn v_text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn v_opt_text(o: Option<&str>) -> Value {
    match o {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn v_uuid(u: Uuid) -> Value {
    Value::Text(u.to_string())
}

fn v_opt_uuid(o: Option<Uuid>) -> Value {
    match o {
        Some(u) => Value::Text(u.to_string()),
        None => Value::Null,
    }
}

fn v_dt(t: DateTime<Utc>) -> Value {
    Value::Text(t.to_rfc3339())
}

fn v_opt_dt(o: Option<DateTime<Utc>>) -> Value {
    match o {
        Some(t) => Value::Text(t.to_rfc3339()),
        None => Value::Null,
    }
}

fn v_opt_date(o: Option<NaiveDate>) -> Value {
    match o {
        Some(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn v_bool(b: bool) -> Value {
    Value::Integer(b as i64)
}

fn v_int(i: i64) -> Value {
    Value::Integer(i)
}

fn v_opt_int(o: Option<i64>) -> Value {
    match o {
        Some(i) => Value::Integer(i),
        None => Value::Null,
    }
}

fn v_real(f: f64) -> Value {
    Value::Real(f)
}

fn v_opt_real(o: Option<f64>) -> Value {
    match o {
        Some(f) => Value::Real(f),
        None => Value::Null,
    }
}

fn assign_id(id: &mut Option<Uuid>) -> Uuid {
    // Respect existing ID if provided; otherwise generate.
    let value = id.unwrap_or_else(Uuid::new_v4);
    *id = Some(value);
    value
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", query.to_lowercase())
}

/// Prefix each column of a `*_COLS` list with a table alias.
fn prefix_cols(cols: &str, alias: &str) -> String {
    cols.split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Placeholder list (`?, ?, ?`) for an IN clause of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl DatabaseStorage {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect()
    }

    async fn exec(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        let conn = self.conn()?;
        conn.execute(sql, params)
            .await
            .map_err(|e| db_err("statement failed", e))
    }

    async fn fetch_all<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        convert: fn(&Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| db_err("query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            out.push(convert(&row)?);
        }
        Ok(out)
    }

    async fn fetch_one<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        convert: fn(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| db_err("query failed", e))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            Some(row) => Ok(Some(convert(&row)?)),
            None => Ok(None),
        }
    }

    async fn count(&self, sql: &str, params: impl IntoParams) -> Result<u32> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| db_err("count query failed", e))?;
        match rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            Some(row) => Ok(get_i64(&row, 0)? as u32),
            None => Ok(0),
        }
    }

    async fn load_assoc_ids(&self, table: &str, key_col: &str, value_col: &str, id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {value_col} FROM {table} WHERE {key_col} = ?");
        let mut rows = conn
            .query(&sql, [v_uuid(id)])
            .await
            .map_err(|e| db_err("association query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            let raw = row
                .get::<String>(0)
                .map_err(|e| db_err("failed to read association id", e))?;
            out.push(parse_uuid(&raw)?);
        }
        Ok(out)
    }

    async fn store_assoc_ids(
        &self,
        table: &str,
        key_col: &str,
        value_col: &str,
        id: Uuid,
        values: &[Uuid],
    ) -> Result<()> {
        self.exec(
            &format!("DELETE FROM {table} WHERE {key_col} = ?"),
            [v_uuid(id)],
        )
        .await?;
        for value in values {
            self.exec(
                &format!("INSERT OR IGNORE INTO {table} ({key_col}, {value_col}) VALUES (?, ?)"),
                [v_uuid(id), v_uuid(*value)],
            )
            .await?;
        }
        Ok(())
    }

    async fn hydrate_book(&self, mut book: Book) -> Result<Book> {
        let id = book.id.expect("book row always carries an id");
        book.author_ids = self
            .load_assoc_ids("book_authors", "book_id", "author_id", id)
            .await?;
        book.genre_ids = self
            .load_assoc_ids("book_genres", "book_id", "genre_id", id)
            .await?;
        book.tag_ids = self
            .load_assoc_ids("book_tags", "book_id", "tag_id", id)
            .await?;
        Ok(book)
    }

    async fn hydrate_books(&self, books: Vec<Book>) -> Result<Vec<Book>> {
        let mut out = Vec::with_capacity(books.len());
        for book in books {
            out.push(self.hydrate_book(book).await?);
        }
        Ok(out)
    }

    /// Shared WHERE builder for book listing and search. Appends filter
    /// clauses and their parameters; the caller opens with its own prefix.
    fn push_book_filter(sql: &mut String, params: &mut Vec<Value>, filter: &BookFilter) {
        if filter.genre_slug.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM book_genres bg JOIN genres g ON g.id = bg.genre_id \
                 WHERE bg.book_id = b.id AND g.slug = ?)",
            );
            params.push(v_text(filter.genre_slug.as_deref().unwrap()));
        }
        if filter.author_slug.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
                 WHERE ba.book_id = b.id AND a.slug = ?)",
            );
            params.push(v_text(filter.author_slug.as_deref().unwrap()));
        }
        if filter.publisher_slug.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM publishers p \
                 WHERE p.id = b.publisher_id AND p.slug = ?)",
            );
            params.push(v_text(filter.publisher_slug.as_deref().unwrap()));
        }
        if filter.tag_slug.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM book_tags bt JOIN tags t ON t.id = bt.tag_id \
                 WHERE bt.book_id = b.id AND t.slug = ?)",
            );
            params.push(v_text(filter.tag_slug.as_deref().unwrap()));
        }
        if let Some(language) = &filter.language {
            sql.push_str(" AND b.language = ?");
            params.push(v_text(language));
        }
        if let Some(year) = filter.year {
            sql.push_str(" AND b.year = ?");
            params.push(v_int(year as i64));
        }
        if let Some(min) = filter.min_rating {
            sql.push_str(" AND b.avg_rating >= ?");
            params.push(v_real(min));
        }
        if let Some(max) = filter.max_rating {
            sql.push_str(" AND b.avg_rating <= ?");
            params.push(v_real(max));
        }
    }

    fn push_book_order_and_page(sql: &mut String, params: &mut Vec<Value>, filter: &BookFilter) {
        sql.push_str(match filter.sort {
            BookSort::Rating => " ORDER BY b.avg_rating DESC, b.rating_count DESC",
            BookSort::Date => " ORDER BY b.created_at DESC",
            BookSort::Title => " ORDER BY b.title ASC",
            BookSort::Relevance => {
                " ORDER BY b.avg_rating DESC, b.rating_count DESC, b.created_at DESC"
            }
        });
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(v_int(filter.limit.map(|l| l as i64).unwrap_or(-1)));
        params.push(v_int(filter.offset.unwrap_or(0) as i64));
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    // ---- Users ----

    async fn create_user(&self, user: &mut User) -> Result<()> {
        let id = assign_id(&mut user.id);
        self.exec(
            "INSERT INTO users (id, username, email, password_hash, role, is_verified, \
             is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&user.username),
                v_text(&user.email),
                v_text(&user.password_hash),
                v_text(user.role.as_str()),
                v_bool(user.is_verified),
                v_bool(user.is_active),
                v_dt(user.created_at),
                v_dt(user.updated_at),
            ],
        )
        .await?;
        info!("Created user: {} with id {}", user.username, id);
        Ok(())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.fetch_one(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?"),
            [v_uuid(id)],
            row_to_user,
        )
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one(
            &format!("SELECT {USER_COLS} FROM users WHERE LOWER(username) = LOWER(?)"),
            [v_text(username)],
            row_to_user,
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one(
            &format!("SELECT {USER_COLS} FROM users WHERE LOWER(email) = LOWER(?)"),
            [v_text(email)],
            row_to_user,
        )
        .await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.exec(
            "UPDATE users SET username = ?, email = ?, password_hash = ?, role = ?, \
             is_verified = ?, is_active = ?, updated_at = ? WHERE id = ?",
            vec![
                v_text(&user.username),
                v_text(&user.email),
                v_text(&user.password_hash),
                v_text(user.role.as_str()),
                v_bool(user.is_verified),
                v_bool(user.is_active),
                v_dt(user.updated_at),
                v_opt_uuid(user.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn create_profile(&self, profile: &mut Profile) -> Result<()> {
        let id = assign_id(&mut profile.id);
        self.exec(
            "INSERT INTO profiles (id, user_id, bio, location, website, facebook_url, \
             twitter_url, instagram_url, language, notify_follow, notify_review_like, \
             notify_comment, notify_mention, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(profile.user_id),
                v_text(&profile.bio),
                v_text(&profile.location),
                v_text(&profile.website),
                v_text(&profile.facebook_url),
                v_text(&profile.twitter_url),
                v_text(&profile.instagram_url),
                v_text(&profile.language),
                v_bool(profile.notify_follow),
                v_bool(profile.notify_review_like),
                v_bool(profile.notify_comment),
                v_bool(profile.notify_mention),
                v_dt(profile.created_at),
                v_dt(profile.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_profile_by_user(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.fetch_one(
            &format!("SELECT {PROFILE_COLS} FROM profiles WHERE user_id = ?"),
            [v_uuid(user_id)],
            row_to_profile,
        )
        .await
    }

    async fn update_profile(&self, profile: &Profile) -> Result<()> {
        self.exec(
            "UPDATE profiles SET bio = ?, location = ?, website = ?, facebook_url = ?, \
             twitter_url = ?, instagram_url = ?, language = ?, notify_follow = ?, \
             notify_review_like = ?, notify_comment = ?, notify_mention = ?, updated_at = ? \
             WHERE id = ?",
            vec![
                v_text(&profile.bio),
                v_text(&profile.location),
                v_text(&profile.website),
                v_text(&profile.facebook_url),
                v_text(&profile.twitter_url),
                v_text(&profile.instagram_url),
                v_text(&profile.language),
                v_bool(profile.notify_follow),
                v_bool(profile.notify_review_like),
                v_bool(profile.notify_comment),
                v_bool(profile.notify_mention),
                v_dt(profile.updated_at),
                v_opt_uuid(profile.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn create_session(&self, session: &mut Session) -> Result<()> {
        let id = assign_id(&mut session.id);
        self.exec(
            "INSERT INTO sessions (id, user_id, token, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(session.user_id),
                v_text(&session.token),
                v_dt(session.expires_at),
                v_dt(session.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        self.fetch_one(
            &format!("SELECT {SESSION_COLS} FROM sessions WHERE token = ?"),
            [v_text(token)],
            row_to_session,
        )
        .await
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        self.exec("DELETE FROM sessions WHERE token = ?", [v_text(token)])
            .await?;
        Ok(())
    }

    async fn create_verification_token(&self, token: &mut VerificationToken) -> Result<()> {
        let id = assign_id(&mut token.id);
        self.exec(
            "INSERT INTO verification_tokens (id, user_id, token, expires_at, is_used, \
             created_at) VALUES (?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(token.user_id),
                v_text(&token.token),
                v_dt(token.expires_at),
                v_bool(token.is_used),
                v_dt(token.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_verification_token(&self, token: &str) -> Result<Option<VerificationToken>> {
        self.fetch_one(
            &format!("SELECT {VERIFICATION_TOKEN_COLS} FROM verification_tokens WHERE token = ?"),
            [v_text(token)],
            row_to_verification_token,
        )
        .await
    }

    async fn update_verification_token(&self, token: &VerificationToken) -> Result<()> {
        self.exec(
            "UPDATE verification_tokens SET is_used = ? WHERE id = ?",
            vec![v_bool(token.is_used), v_opt_uuid(token.id)],
        )
        .await?;
        Ok(())
    }

    // ---- Catalog ----

    async fn create_author(&self, author: &mut Author) -> Result<()> {
        let id = assign_id(&mut author.id);
        self.exec(
            "INSERT INTO authors (id, name, slug, bio, birth_date, death_date, nationality, \
             website, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&author.name),
                v_text(&author.slug),
                v_text(&author.bio),
                v_opt_date(author.birth_date),
                v_opt_date(author.death_date),
                v_text(&author.nationality),
                v_text(&author.website),
                v_bool(author.is_active),
                v_dt(author.created_at),
                v_dt(author.updated_at),
            ],
        )
        .await?;
        info!("Created author: {} with id {}", author.name, id);
        Ok(())
    }

    async fn get_author_by_id(&self, id: Uuid) -> Result<Option<Author>> {
        self.fetch_one(
            &format!("SELECT {AUTHOR_COLS} FROM authors WHERE id = ?"),
            [v_uuid(id)],
            row_to_author,
        )
        .await
    }

    async fn get_author_by_slug(&self, slug: &str) -> Result<Option<Author>> {
        self.fetch_one(
            &format!("SELECT {AUTHOR_COLS} FROM authors WHERE slug = ?"),
            [v_text(slug)],
            row_to_author,
        )
        .await
    }

    async fn update_author(&self, author: &Author) -> Result<()> {
        self.exec(
            "UPDATE authors SET name = ?, slug = ?, bio = ?, birth_date = ?, death_date = ?, \
             nationality = ?, website = ?, is_active = ?, updated_at = ? WHERE id = ?",
            vec![
                v_text(&author.name),
                v_text(&author.slug),
                v_text(&author.bio),
                v_opt_date(author.birth_date),
                v_opt_date(author.death_date),
                v_text(&author.nationality),
                v_text(&author.website),
                v_bool(author.is_active),
                v_dt(author.updated_at),
                v_opt_uuid(author.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_authors(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Author>> {
        self.fetch_all(
            &format!(
                "SELECT {AUTHOR_COLS} FROM authors WHERE is_active = 1 ORDER BY name \
                 LIMIT ? OFFSET ?"
            ),
            vec![
                v_int(limit.map(|l| l as i64).unwrap_or(-1)),
                v_int(offset.unwrap_or(0) as i64),
            ],
            row_to_author,
        )
        .await
    }

    async fn create_genre(&self, genre: &mut Genre) -> Result<()> {
        let id = assign_id(&mut genre.id);
        self.exec(
            "INSERT INTO genres (id, name, slug, description, parent_id, is_active, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&genre.name),
                v_text(&genre.slug),
                v_text(&genre.description),
                v_opt_uuid(genre.parent_id),
                v_bool(genre.is_active),
                v_dt(genre.created_at),
                v_dt(genre.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_genre_by_id(&self, id: Uuid) -> Result<Option<Genre>> {
        self.fetch_one(
            &format!("SELECT {GENRE_COLS} FROM genres WHERE id = ?"),
            [v_uuid(id)],
            row_to_genre,
        )
        .await
    }

    async fn get_genre_by_slug(&self, slug: &str) -> Result<Option<Genre>> {
        self.fetch_one(
            &format!("SELECT {GENRE_COLS} FROM genres WHERE slug = ?"),
            [v_text(slug)],
            row_to_genre,
        )
        .await
    }

    async fn list_genres(&self) -> Result<Vec<Genre>> {
        self.fetch_all(
            &format!("SELECT {GENRE_COLS} FROM genres WHERE is_active = 1 ORDER BY name"),
            (),
            row_to_genre,
        )
        .await
    }

    async fn create_publisher(&self, publisher: &mut Publisher) -> Result<()> {
        let id = assign_id(&mut publisher.id);
        self.exec(
            "INSERT INTO publishers (id, name, slug, description, website, is_active, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&publisher.name),
                v_text(&publisher.slug),
                v_text(&publisher.description),
                v_text(&publisher.website),
                v_bool(publisher.is_active),
                v_dt(publisher.created_at),
                v_dt(publisher.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_publisher_by_id(&self, id: Uuid) -> Result<Option<Publisher>> {
        self.fetch_one(
            &format!("SELECT {PUBLISHER_COLS} FROM publishers WHERE id = ?"),
            [v_uuid(id)],
            row_to_publisher,
        )
        .await
    }

    async fn get_publisher_by_slug(&self, slug: &str) -> Result<Option<Publisher>> {
        self.fetch_one(
            &format!("SELECT {PUBLISHER_COLS} FROM publishers WHERE slug = ?"),
            [v_text(slug)],
            row_to_publisher,
        )
        .await
    }

    async fn list_publishers(&self) -> Result<Vec<Publisher>> {
        self.fetch_all(
            &format!("SELECT {PUBLISHER_COLS} FROM publishers WHERE is_active = 1 ORDER BY name"),
            (),
            row_to_publisher,
        )
        .await
    }

    async fn create_tag(&self, tag: &mut Tag) -> Result<()> {
        let id = assign_id(&mut tag.id);
        self.exec(
            "INSERT INTO tags (id, name, slug, description, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&tag.name),
                v_text(&tag.slug),
                v_text(&tag.description),
                v_bool(tag.is_active),
                v_dt(tag.created_at),
                v_dt(tag.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_tag_by_id(&self, id: Uuid) -> Result<Option<Tag>> {
        self.fetch_one(
            &format!("SELECT {TAG_COLS} FROM tags WHERE id = ?"),
            [v_uuid(id)],
            row_to_tag,
        )
        .await
    }

    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        self.fetch_one(
            &format!("SELECT {TAG_COLS} FROM tags WHERE slug = ?"),
            [v_text(slug)],
            row_to_tag,
        )
        .await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.fetch_all(
            &format!("SELECT {TAG_COLS} FROM tags WHERE is_active = 1 ORDER BY name"),
            (),
            row_to_tag,
        )
        .await
    }

    async fn create_book(&self, book: &mut Book) -> Result<()> {
        let id = assign_id(&mut book.id);
        self.exec(
            "INSERT INTO books (id, title, slug, description, year, pages, language, \
             publisher_id, avg_rating, rating_count, review_count, is_active, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_text(&book.title),
                v_text(&book.slug),
                v_text(&book.description),
                v_opt_int(book.year.map(|y| y as i64)),
                v_opt_int(book.pages.map(|p| p as i64)),
                v_text(&book.language),
                v_opt_uuid(book.publisher_id),
                v_real(book.avg_rating),
                v_int(book.rating_count as i64),
                v_int(book.review_count as i64),
                v_bool(book.is_active),
                v_dt(book.created_at),
                v_dt(book.updated_at),
            ],
        )
        .await?;
        self.store_assoc_ids("book_authors", "book_id", "author_id", id, &book.author_ids)
            .await?;
        self.store_assoc_ids("book_genres", "book_id", "genre_id", id, &book.genre_ids)
            .await?;
        self.store_assoc_ids("book_tags", "book_id", "tag_id", id, &book.tag_ids)
            .await?;
        info!("Created book: {} with id {}", book.title, id);
        Ok(())
    }

    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<Book>> {
        let book = self
            .fetch_one(
                &format!("SELECT {BOOK_COLS} FROM books WHERE id = ?"),
                [v_uuid(id)],
                row_to_book,
            )
            .await?;
        match book {
            Some(book) => Ok(Some(self.hydrate_book(book).await?)),
            None => Ok(None),
        }
    }

    async fn get_book_by_slug(&self, slug: &str) -> Result<Option<Book>> {
        let book = self
            .fetch_one(
                &format!("SELECT {BOOK_COLS} FROM books WHERE slug = ?"),
                [v_text(slug)],
                row_to_book,
            )
            .await?;
        match book {
            Some(book) => Ok(Some(self.hydrate_book(book).await?)),
            None => Ok(None),
        }
    }

    async fn update_book(&self, book: &Book) -> Result<()> {
        let id = book.id.ok_or_else(|| {
            crate::common::error::CoreError::Validation("cannot update book without ID".to_string())
        })?;
        self.exec(
            "UPDATE books SET title = ?, slug = ?, description = ?, year = ?, pages = ?, \
             language = ?, publisher_id = ?, is_active = ?, updated_at = ? WHERE id = ?",
            vec![
                v_text(&book.title),
                v_text(&book.slug),
                v_text(&book.description),
                v_opt_int(book.year.map(|y| y as i64)),
                v_opt_int(book.pages.map(|p| p as i64)),
                v_text(&book.language),
                v_opt_uuid(book.publisher_id),
                v_bool(book.is_active),
                v_dt(book.updated_at),
                v_uuid(id),
            ],
        )
        .await?;
        self.store_assoc_ids("book_authors", "book_id", "author_id", id, &book.author_ids)
            .await?;
        self.store_assoc_ids("book_genres", "book_id", "genre_id", id, &book.genre_ids)
            .await?;
        self.store_assoc_ids("book_tags", "book_id", "tag_id", id, &book.tag_ids)
            .await?;
        Ok(())
    }

    async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let mut sql = format!("SELECT {BOOK_COLS} FROM books b WHERE b.is_active = 1");
        let mut params: Vec<Value> = Vec::new();
        Self::push_book_filter(&mut sql, &mut params, filter);
        Self::push_book_order_and_page(&mut sql, &mut params, filter);
        let books = self.fetch_all(&sql, params, row_to_book).await?;
        self.hydrate_books(books).await
    }

    async fn set_book_aggregates(&self, book_id: Uuid, stats: BookRatingStats) -> Result<()> {
        debug!(
            "Setting aggregates for book {}: avg {} over {} ratings, {} reviews",
            book_id, stats.avg_rating, stats.rating_count, stats.review_count
        );
        self.exec(
            "UPDATE books SET avg_rating = ?, rating_count = ?, review_count = ? WHERE id = ?",
            vec![
                v_real(stats.avg_rating),
                v_int(stats.rating_count as i64),
                v_int(stats.review_count as i64),
                v_uuid(book_id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_book_ids_by_authors(&self, author_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT book_id FROM book_authors WHERE author_id IN ({})",
            placeholders(author_ids.len())
        );
        let params: Vec<Value> = author_ids.iter().map(|id| v_uuid(*id)).collect();
        let conn = self.conn()?;
        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| db_err("query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            let raw = row
                .get::<String>(0)
                .map_err(|e| db_err("failed to read book id", e))?;
            out.push(parse_uuid(&raw)?);
        }
        Ok(out)
    }

    async fn create_edition(&self, edition: &mut Edition) -> Result<()> {
        let id = assign_id(&mut edition.id);
        self.exec(
            "INSERT INTO editions (id, book_id, isbn13, format, published_at, language, pages, \
             is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(edition.book_id),
                v_opt_text(edition.isbn13.as_deref()),
                v_text(edition.format.as_str()),
                v_opt_date(edition.published_at),
                v_text(&edition.language),
                v_opt_int(edition.pages.map(|p| p as i64)),
                v_bool(edition.is_active),
                v_dt(edition.created_at),
                v_dt(edition.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_edition_by_isbn(&self, isbn13: &str) -> Result<Option<Edition>> {
        self.fetch_one(
            &format!("SELECT {EDITION_COLS} FROM editions WHERE isbn13 = ?"),
            [v_text(isbn13)],
            row_to_edition,
        )
        .await
    }

    async fn list_editions_by_book(&self, book_id: Uuid) -> Result<Vec<Edition>> {
        self.fetch_all(
            &format!(
                "SELECT {EDITION_COLS} FROM editions WHERE book_id = ? AND is_active = 1 \
                 ORDER BY published_at DESC"
            ),
            [v_uuid(book_id)],
            row_to_edition,
        )
        .await
    }

    // ---- Reviews ----

    async fn create_review(&self, review: &mut Review) -> Result<()> {
        let id = assign_id(&mut review.id);
        self.exec(
            "INSERT INTO reviews (id, book_id, user_id, title, body_md, body_html, rating, \
             status, is_active, like_count, comment_count, created_at, updated_at, edited_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(review.book_id),
                v_uuid(review.user_id),
                v_text(&review.title),
                v_text(&review.body_md),
                v_text(&review.body_html),
                v_opt_real(review.rating),
                v_text(review.status.as_str()),
                v_bool(review.is_active),
                v_int(review.like_count as i64),
                v_int(review.comment_count as i64),
                v_dt(review.created_at),
                v_dt(review.updated_at),
                v_opt_dt(review.edited_at),
            ],
        )
        .await?;
        info!("Created review: {} with id {}", review.title, id);
        Ok(())
    }

    async fn get_review_by_id(&self, id: Uuid) -> Result<Option<Review>> {
        self.fetch_one(
            &format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = ?"),
            [v_uuid(id)],
            row_to_review,
        )
        .await
    }

    async fn get_review_by_user_and_book(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<Review>> {
        self.fetch_one(
            &format!("SELECT {REVIEW_COLS} FROM reviews WHERE user_id = ? AND book_id = ?"),
            vec![v_uuid(user_id), v_uuid(book_id)],
            row_to_review,
        )
        .await
    }

    async fn update_review(&self, review: &Review) -> Result<()> {
        self.exec(
            "UPDATE reviews SET title = ?, body_md = ?, body_html = ?, rating = ?, status = ?, \
             is_active = ?, like_count = ?, comment_count = ?, updated_at = ?, edited_at = ? \
             WHERE id = ?",
            vec![
                v_text(&review.title),
                v_text(&review.body_md),
                v_text(&review.body_html),
                v_opt_real(review.rating),
                v_text(review.status.as_str()),
                v_bool(review.is_active),
                v_int(review.like_count as i64),
                v_int(review.comment_count as i64),
                v_dt(review.updated_at),
                v_opt_dt(review.edited_at),
                v_opt_uuid(review.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> Result<()> {
        // comments and revisions cascade via foreign keys
        self.exec("DELETE FROM reviews WHERE id = ?", [v_uuid(id)])
            .await?;
        Ok(())
    }

    async fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let mut sql = format!("SELECT {REVIEW_COLS} FROM reviews WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();
        if filter.only_public {
            sql.push_str(" AND status = 'public' AND is_active = 1");
        }
        if let Some(book_id) = filter.book_id {
            sql.push_str(" AND book_id = ?");
            params.push(v_uuid(book_id));
        }
        if let Some(user_id) = filter.user_id {
            sql.push_str(" AND user_id = ?");
            params.push(v_uuid(user_id));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
        params.push(v_int(filter.limit.map(|l| l as i64).unwrap_or(-1)));
        params.push(v_int(filter.offset.unwrap_or(0) as i64));
        self.fetch_all(&sql, params, row_to_review).await
    }

    async fn book_rating_stats(&self, book_id: Uuid) -> Result<BookRatingStats> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), COUNT(rating), COALESCE(AVG(rating), 0) FROM reviews \
                 WHERE book_id = ? AND status = 'public' AND is_active = 1",
                [v_uuid(book_id)],
            )
            .await
            .map_err(|e| db_err("stats query failed", e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
            .ok_or_else(|| db_err("stats query returned no rows", "empty result"))?;
        Ok(BookRatingStats {
            review_count: get_i64(&row, 0)? as u32,
            rating_count: get_i64(&row, 1)? as u32,
            avg_rating: get_f64(&row, 2)?,
        })
    }

    async fn count_public_reviews_by_user(&self, user_id: Uuid) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM reviews WHERE user_id = ? AND status = 'public' \
             AND is_active = 1",
            [v_uuid(user_id)],
        )
        .await
    }

    async fn create_review_revision(&self, revision: &mut ReviewRevision) -> Result<()> {
        let id = assign_id(&mut revision.id);
        self.exec(
            "INSERT INTO review_revisions (id, review_id, title, body_md, body_html, rating, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(revision.review_id),
                v_text(&revision.title),
                v_text(&revision.body_md),
                v_text(&revision.body_html),
                v_opt_real(revision.rating),
                v_dt(revision.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_review_revisions(&self, review_id: Uuid) -> Result<Vec<ReviewRevision>> {
        self.fetch_all(
            &format!(
                "SELECT {REVISION_COLS} FROM review_revisions WHERE review_id = ? \
                 ORDER BY created_at DESC"
            ),
            [v_uuid(review_id)],
            row_to_revision,
        )
        .await
    }

    async fn create_comment(&self, comment: &mut Comment) -> Result<()> {
        let id = assign_id(&mut comment.id);
        self.exec(
            "INSERT INTO comments (id, review_id, user_id, parent_id, body, status, is_active, \
             like_count, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(comment.review_id),
                v_uuid(comment.user_id),
                v_opt_uuid(comment.parent_id),
                v_text(&comment.body),
                v_text(comment.status.as_str()),
                v_bool(comment.is_active),
                v_int(comment.like_count as i64),
                v_dt(comment.created_at),
                v_dt(comment.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_comment_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        self.fetch_one(
            &format!("SELECT {COMMENT_COLS} FROM comments WHERE id = ?"),
            [v_uuid(id)],
            row_to_comment,
        )
        .await
    }

    async fn update_comment(&self, comment: &Comment) -> Result<()> {
        self.exec(
            "UPDATE comments SET body = ?, status = ?, is_active = ?, like_count = ?, \
             updated_at = ? WHERE id = ?",
            vec![
                v_text(&comment.body),
                v_text(comment.status.as_str()),
                v_bool(comment.is_active),
                v_int(comment.like_count as i64),
                v_dt(comment.updated_at),
                v_opt_uuid(comment.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<()> {
        // replies cascade via the parent_id foreign key
        self.exec("DELETE FROM comments WHERE id = ?", [v_uuid(id)])
            .await?;
        Ok(())
    }

    async fn list_comments_by_review(&self, review_id: Uuid) -> Result<Vec<Comment>> {
        self.fetch_all(
            &format!(
                "SELECT {COMMENT_COLS} FROM comments WHERE review_id = ? AND status = 'public' \
                 AND is_active = 1 ORDER BY created_at ASC"
            ),
            [v_uuid(review_id)],
            row_to_comment,
        )
        .await
    }

    async fn count_public_comments(&self, review_id: Uuid) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM comments WHERE review_id = ? AND status = 'public' \
             AND is_active = 1",
            [v_uuid(review_id)],
        )
        .await
    }

    async fn create_like(&self, like: &mut Like) -> Result<()> {
        let id = assign_id(&mut like.id);
        self.exec(
            "INSERT INTO likes (id, user_id, target_kind, target_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(like.user_id),
                v_text(like.target.kind.as_str()),
                v_uuid(like.target.id),
                v_dt(like.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_like(&self, user_id: Uuid, target: ContentRef) -> Result<Option<Like>> {
        self.fetch_one(
            &format!(
                "SELECT {LIKE_COLS} FROM likes WHERE user_id = ? AND target_kind = ? \
                 AND target_id = ?"
            ),
            vec![
                v_uuid(user_id),
                v_text(target.kind.as_str()),
                v_uuid(target.id),
            ],
            row_to_like,
        )
        .await
    }

    async fn delete_like(&self, user_id: Uuid, target: ContentRef) -> Result<()> {
        self.exec(
            "DELETE FROM likes WHERE user_id = ? AND target_kind = ? AND target_id = ?",
            vec![
                v_uuid(user_id),
                v_text(target.kind.as_str()),
                v_uuid(target.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn count_likes(&self, target: ContentRef) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM likes WHERE target_kind = ? AND target_id = ?",
            vec![v_text(target.kind.as_str()), v_uuid(target.id)],
        )
        .await
    }

    // ---- Shelves ----

    async fn create_shelf(&self, shelf: &mut Shelf) -> Result<()> {
        let id = assign_id(&mut shelf.id);
        self.exec(
            "INSERT INTO shelves (id, user_id, name, system_kind, description, visibility, \
             book_count, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(shelf.user_id),
                v_text(&shelf.name),
                v_opt_text(shelf.system_kind.map(|k| k.as_str())),
                v_text(&shelf.description),
                v_text(shelf.visibility.as_str()),
                v_int(shelf.book_count as i64),
                v_bool(shelf.is_active),
                v_dt(shelf.created_at),
                v_dt(shelf.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_shelf_by_id(&self, id: Uuid) -> Result<Option<Shelf>> {
        self.fetch_one(
            &format!("SELECT {SHELF_COLS} FROM shelves WHERE id = ?"),
            [v_uuid(id)],
            row_to_shelf,
        )
        .await
    }

    async fn list_shelves_by_user(&self, user_id: Uuid) -> Result<Vec<Shelf>> {
        self.fetch_all(
            &format!(
                "SELECT {SHELF_COLS} FROM shelves WHERE user_id = ? AND is_active = 1 \
                 ORDER BY created_at ASC"
            ),
            [v_uuid(user_id)],
            row_to_shelf,
        )
        .await
    }

    async fn update_shelf(&self, shelf: &Shelf) -> Result<()> {
        self.exec(
            "UPDATE shelves SET name = ?, description = ?, visibility = ?, book_count = ?, \
             is_active = ?, updated_at = ? WHERE id = ?",
            vec![
                v_text(&shelf.name),
                v_text(&shelf.description),
                v_text(shelf.visibility.as_str()),
                v_int(shelf.book_count as i64),
                v_bool(shelf.is_active),
                v_dt(shelf.updated_at),
                v_opt_uuid(shelf.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_shelf(&self, id: Uuid) -> Result<()> {
        self.exec("DELETE FROM shelves WHERE id = ?", [v_uuid(id)])
            .await?;
        Ok(())
    }

    async fn create_shelf_item(&self, item: &mut ShelfItem) -> Result<()> {
        let id = assign_id(&mut item.id);
        self.exec(
            "INSERT INTO shelf_items (id, shelf_id, book_id, position, added_at) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(item.shelf_id),
                v_uuid(item.book_id),
                v_int(item.position as i64),
                v_dt(item.added_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<Option<ShelfItem>> {
        self.fetch_one(
            &format!("SELECT {SHELF_ITEM_COLS} FROM shelf_items WHERE shelf_id = ? AND book_id = ?"),
            vec![v_uuid(shelf_id), v_uuid(book_id)],
            row_to_shelf_item,
        )
        .await
    }

    async fn delete_shelf_item(&self, shelf_id: Uuid, book_id: Uuid) -> Result<()> {
        self.exec(
            "DELETE FROM shelf_items WHERE shelf_id = ? AND book_id = ?",
            vec![v_uuid(shelf_id), v_uuid(book_id)],
        )
        .await?;
        Ok(())
    }

    async fn list_shelf_items(&self, shelf_id: Uuid) -> Result<Vec<ShelfItem>> {
        self.fetch_all(
            &format!(
                "SELECT {SHELF_ITEM_COLS} FROM shelf_items WHERE shelf_id = ? \
                 ORDER BY position ASC, added_at ASC"
            ),
            [v_uuid(shelf_id)],
            row_to_shelf_item,
        )
        .await
    }

    async fn count_shelf_items(&self, shelf_id: Uuid) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM shelf_items WHERE shelf_id = ?",
            [v_uuid(shelf_id)],
        )
        .await
    }

    async fn create_reading_progress(&self, progress: &mut ReadingProgress) -> Result<()> {
        let id = assign_id(&mut progress.id);
        self.exec(
            "INSERT INTO reading_progress (id, user_id, book_id, page, percent, notes, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(progress.user_id),
                v_uuid(progress.book_id),
                v_opt_int(progress.page.map(|p| p as i64)),
                v_opt_real(progress.percent),
                v_text(&progress.notes),
                v_dt(progress.created_at),
                v_dt(progress.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_reading_progress_by_id(&self, id: Uuid) -> Result<Option<ReadingProgress>> {
        self.fetch_one(
            &format!("SELECT {PROGRESS_COLS} FROM reading_progress WHERE id = ?"),
            [v_uuid(id)],
            row_to_progress,
        )
        .await
    }

    async fn get_reading_progress(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<ReadingProgress>> {
        self.fetch_one(
            &format!("SELECT {PROGRESS_COLS} FROM reading_progress WHERE user_id = ? AND book_id = ?"),
            vec![v_uuid(user_id), v_uuid(book_id)],
            row_to_progress,
        )
        .await
    }

    async fn update_reading_progress(&self, progress: &ReadingProgress) -> Result<()> {
        self.exec(
            "UPDATE reading_progress SET page = ?, percent = ?, notes = ?, updated_at = ? \
             WHERE id = ?",
            vec![
                v_opt_int(progress.page.map(|p| p as i64)),
                v_opt_real(progress.percent),
                v_text(&progress.notes),
                v_dt(progress.updated_at),
                v_opt_uuid(progress.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_reading_progress(&self, id: Uuid) -> Result<()> {
        self.exec("DELETE FROM reading_progress WHERE id = ?", [v_uuid(id)])
            .await?;
        Ok(())
    }

    async fn list_reading_progress_by_user(&self, user_id: Uuid) -> Result<Vec<ReadingProgress>> {
        self.fetch_all(
            &format!(
                "SELECT {PROGRESS_COLS} FROM reading_progress WHERE user_id = ? \
                 ORDER BY updated_at DESC"
            ),
            [v_uuid(user_id)],
            row_to_progress,
        )
        .await
    }

    // ---- Social ----

    async fn create_follow(&self, follow: &mut Follow) -> Result<()> {
        let id = assign_id(&mut follow.id);
        self.exec(
            "INSERT INTO follows (id, follower_id, target_kind, target_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(follow.follower_id),
                v_text(follow.target.kind.as_str()),
                v_uuid(follow.target.id),
                v_dt(follow.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<Option<Follow>> {
        self.fetch_one(
            &format!(
                "SELECT {FOLLOW_COLS} FROM follows WHERE follower_id = ? AND target_kind = ? \
                 AND target_id = ?"
            ),
            vec![
                v_uuid(follower_id),
                v_text(target.kind.as_str()),
                v_uuid(target.id),
            ],
            row_to_follow,
        )
        .await
    }

    async fn delete_follow(&self, follower_id: Uuid, target: ContentRef) -> Result<()> {
        self.exec(
            "DELETE FROM follows WHERE follower_id = ? AND target_kind = ? AND target_id = ?",
            vec![
                v_uuid(follower_id),
                v_text(target.kind.as_str()),
                v_uuid(target.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_follows_by_follower(&self, follower_id: Uuid) -> Result<Vec<Follow>> {
        self.fetch_all(
            &format!(
                "SELECT {FOLLOW_COLS} FROM follows WHERE follower_id = ? ORDER BY created_at DESC"
            ),
            [v_uuid(follower_id)],
            row_to_follow,
        )
        .await
    }

    async fn list_follower_ids(&self, target: ContentRef) -> Result<Vec<Uuid>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT follower_id FROM follows WHERE target_kind = ? AND target_id = ?",
                vec![v_text(target.kind.as_str()), v_uuid(target.id)],
            )
            .await
            .map_err(|e| db_err("query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            let raw = row
                .get::<String>(0)
                .map_err(|e| db_err("failed to read follower id", e))?;
            out.push(parse_uuid(&raw)?);
        }
        Ok(out)
    }

    async fn count_followers(&self, target: ContentRef) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM follows WHERE target_kind = ? AND target_id = ?",
            vec![v_text(target.kind.as_str()), v_uuid(target.id)],
        )
        .await
    }

    async fn create_notification(&self, notification: &mut Notification) -> Result<()> {
        let id = assign_id(&mut notification.id);
        let payload = serde_json::to_string(&notification.payload)?;
        self.exec(
            "INSERT INTO notifications (id, user_id, kind, source_kind, source_id, payload, \
             is_read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(notification.user_id),
                v_text(notification.kind.as_str()),
                v_opt_text(notification.source.map(|s| s.kind.as_str())),
                v_opt_uuid(notification.source.map(|s| s.id)),
                v_text(&payload),
                v_bool(notification.is_read),
                v_dt(notification.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_notification_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        self.fetch_one(
            &format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = ?"),
            [v_uuid(id)],
            row_to_notification,
        )
        .await
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Notification>> {
        let mut sql = format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE user_id = ?");
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        self.fetch_all(
            &sql,
            vec![
                v_uuid(user_id),
                v_int(limit.map(|l| l as i64).unwrap_or(-1)),
            ],
            row_to_notification,
        )
        .await
    }

    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
            [v_uuid(user_id)],
        )
        .await
    }

    async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        self.exec(
            "UPDATE notifications SET is_read = 1 WHERE id = ?",
            [v_uuid(id)],
        )
        .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<()> {
        self.exec(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
            [v_uuid(user_id)],
        )
        .await?;
        Ok(())
    }

    async fn create_collection(&self, collection: &mut Collection) -> Result<()> {
        let id = assign_id(&mut collection.id);
        self.exec(
            "INSERT INTO collections (id, user_id, name, slug, description, visibility, \
             book_count, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(collection.user_id),
                v_text(&collection.name),
                v_text(&collection.slug),
                v_text(&collection.description),
                v_text(collection.visibility.as_str()),
                v_int(collection.book_count as i64),
                v_bool(collection.is_active),
                v_dt(collection.created_at),
                v_dt(collection.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_collection_by_id(&self, id: Uuid) -> Result<Option<Collection>> {
        self.fetch_one(
            &format!("SELECT {COLLECTION_COLS} FROM collections WHERE id = ?"),
            [v_uuid(id)],
            row_to_collection,
        )
        .await
    }

    async fn list_collections_by_user(&self, user_id: Uuid) -> Result<Vec<Collection>> {
        self.fetch_all(
            &format!(
                "SELECT {COLLECTION_COLS} FROM collections WHERE user_id = ? AND is_active = 1 \
                 ORDER BY created_at DESC"
            ),
            [v_uuid(user_id)],
            row_to_collection,
        )
        .await
    }

    async fn list_collections_visible_to(&self, viewer: Option<Uuid>) -> Result<Vec<Collection>> {
        match viewer {
            Some(viewer) => {
                self.fetch_all(
                    &format!(
                        "SELECT {COLLECTION_COLS} FROM collections WHERE \
                         (visibility = 'public' AND is_active = 1) OR user_id = ? \
                         ORDER BY created_at DESC"
                    ),
                    [v_uuid(viewer)],
                    row_to_collection,
                )
                .await
            }
            None => {
                self.fetch_all(
                    &format!(
                        "SELECT {COLLECTION_COLS} FROM collections WHERE visibility = 'public' \
                         AND is_active = 1 ORDER BY created_at DESC"
                    ),
                    (),
                    row_to_collection,
                )
                .await
            }
        }
    }

    async fn update_collection(&self, collection: &Collection) -> Result<()> {
        self.exec(
            "UPDATE collections SET name = ?, slug = ?, description = ?, visibility = ?, \
             book_count = ?, is_active = ?, updated_at = ? WHERE id = ?",
            vec![
                v_text(&collection.name),
                v_text(&collection.slug),
                v_text(&collection.description),
                v_text(collection.visibility.as_str()),
                v_int(collection.book_count as i64),
                v_bool(collection.is_active),
                v_dt(collection.updated_at),
                v_opt_uuid(collection.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, id: Uuid) -> Result<()> {
        self.exec("DELETE FROM collections WHERE id = ?", [v_uuid(id)])
            .await?;
        Ok(())
    }

    async fn create_collection_item(&self, item: &mut CollectionItem) -> Result<()> {
        let id = assign_id(&mut item.id);
        self.exec(
            "INSERT INTO collection_items (id, collection_id, book_id, notes, position, added_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(item.collection_id),
                v_uuid(item.book_id),
                v_text(&item.notes),
                v_int(item.position as i64),
                v_dt(item.added_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_collection_item(
        &self,
        collection_id: Uuid,
        book_id: Uuid,
    ) -> Result<Option<CollectionItem>> {
        self.fetch_one(
            &format!(
                "SELECT {COLLECTION_ITEM_COLS} FROM collection_items WHERE collection_id = ? \
                 AND book_id = ?"
            ),
            vec![v_uuid(collection_id), v_uuid(book_id)],
            row_to_collection_item,
        )
        .await
    }

    async fn delete_collection_item(&self, collection_id: Uuid, book_id: Uuid) -> Result<()> {
        self.exec(
            "DELETE FROM collection_items WHERE collection_id = ? AND book_id = ?",
            vec![v_uuid(collection_id), v_uuid(book_id)],
        )
        .await?;
        Ok(())
    }

    async fn list_collection_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>> {
        self.fetch_all(
            &format!(
                "SELECT {COLLECTION_ITEM_COLS} FROM collection_items WHERE collection_id = ? \
                 ORDER BY position ASC, added_at ASC"
            ),
            [v_uuid(collection_id)],
            row_to_collection_item,
        )
        .await
    }

    async fn count_collection_items(&self, collection_id: Uuid) -> Result<u32> {
        self.count(
            "SELECT COUNT(*) FROM collection_items WHERE collection_id = ?",
            [v_uuid(collection_id)],
        )
        .await
    }

    async fn list_feed_reviews(
        &self,
        user_ids: &[Uuid],
        book_ids: &[Uuid],
        limit: usize,
    ) -> Result<Vec<Review>> {
        if user_ids.is_empty() && book_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut clauses = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if !user_ids.is_empty() {
            clauses.push(format!("user_id IN ({})", placeholders(user_ids.len())));
            params.extend(user_ids.iter().map(|id| v_uuid(*id)));
        }
        if !book_ids.is_empty() {
            clauses.push(format!("book_id IN ({})", placeholders(book_ids.len())));
            params.extend(book_ids.iter().map(|id| v_uuid(*id)));
        }
        let sql = format!(
            "SELECT {REVIEW_COLS} FROM reviews WHERE status = 'public' AND is_active = 1 \
             AND ({}) ORDER BY created_at DESC LIMIT ?",
            clauses.join(" OR ")
        );
        params.push(v_int(limit as i64));
        self.fetch_all(&sql, params, row_to_review).await
    }

    // ---- Search ----

    async fn search_books(&self, query: &str, filter: &BookFilter) -> Result<Vec<Book>> {
        let pattern = like_pattern(query);
        let mut sql = format!(
            "SELECT {BOOK_COLS} FROM books b WHERE b.is_active = 1 AND \
             (LOWER(b.title) LIKE ? OR LOWER(b.description) LIKE ? \
              OR EXISTS (SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
                         WHERE ba.book_id = b.id AND LOWER(a.name) LIKE ?) \
              OR EXISTS (SELECT 1 FROM book_tags bt JOIN tags t ON t.id = bt.tag_id \
                         WHERE bt.book_id = b.id AND LOWER(t.name) LIKE ?))"
        );
        let mut params: Vec<Value> = vec![
            v_text(&pattern),
            v_text(&pattern),
            v_text(&pattern),
            v_text(&pattern),
        ];
        Self::push_book_filter(&mut sql, &mut params, filter);
        Self::push_book_order_and_page(&mut sql, &mut params, filter);
        let books = self.fetch_all(&sql, params, row_to_book).await?;
        self.hydrate_books(books).await
    }

    async fn search_authors(&self, query: &str, limit: usize) -> Result<Vec<Author>> {
        let pattern = like_pattern(query);
        self.fetch_all(
            &format!(
                "SELECT {AUTHOR_COLS} FROM authors WHERE is_active = 1 AND \
                 (LOWER(name) LIKE ? OR LOWER(bio) LIKE ?) ORDER BY name LIMIT ?"
            ),
            vec![v_text(&pattern), v_text(&pattern), v_int(limit as i64)],
            row_to_author,
        )
        .await
    }

    async fn search_reviews(
        &self,
        query: &str,
        filter: &ReviewSearchFilter,
    ) -> Result<Vec<Review>> {
        let pattern = like_pattern(query);
        let cols = prefix_cols(REVIEW_COLS, "r");
        let mut sql = format!(
            "SELECT {cols} FROM reviews r JOIN books b ON b.id = r.book_id \
             WHERE r.status = 'public' AND r.is_active = 1 AND \
             (LOWER(r.title) LIKE ? OR LOWER(r.body_md) LIKE ? OR LOWER(b.title) LIKE ?)"
        );
        let mut params: Vec<Value> = vec![v_text(&pattern), v_text(&pattern), v_text(&pattern)];
        if let Some(min) = filter.min_rating {
            sql.push_str(" AND r.rating >= ?");
            params.push(v_real(min));
        }
        if let Some(max) = filter.max_rating {
            sql.push_str(" AND (r.rating IS NULL OR r.rating <= ?)");
            params.push(v_real(max));
        }
        sql.push_str(match filter.sort {
            ReviewSort::Rating => " ORDER BY r.rating DESC, r.like_count DESC",
            ReviewSort::Date => " ORDER BY r.created_at DESC",
            ReviewSort::Relevance => " ORDER BY r.like_count DESC, r.created_at DESC",
        });
        sql.push_str(" LIMIT ?");
        params.push(v_int(filter.limit.map(|l| l as i64).unwrap_or(-1)));
        self.fetch_all(&sql, params, row_to_review).await
    }

    async fn autocomplete_book_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = like_pattern(query);
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT title FROM books WHERE is_active = 1 AND LOWER(title) LIKE ? \
                 ORDER BY title LIMIT ?",
                vec![v_text(&pattern), v_int(limit as i64)],
            )
            .await
            .map_err(|e| db_err("autocomplete query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            out.push(
                row.get::<String>(0)
                    .map_err(|e| db_err("failed to read title", e))?,
            );
        }
        Ok(out)
    }

    async fn autocomplete_author_names(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let pattern = like_pattern(query);
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT name FROM authors WHERE is_active = 1 AND LOWER(name) LIKE ? \
                 ORDER BY name LIMIT ?",
                vec![v_text(&pattern), v_int(limit as i64)],
            )
            .await
            .map_err(|e| db_err("autocomplete query failed", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| db_err("failed to read row", e))?
        {
            out.push(
                row.get::<String>(0)
                    .map_err(|e| db_err("failed to read name", e))?,
            );
        }
        Ok(out)
    }

    // ---- Moderation ----

    async fn create_report(&self, report: &mut Report) -> Result<()> {
        let id = assign_id(&mut report.id);
        self.exec(
            "INSERT INTO reports (id, reporter_id, target_kind, target_id, reason, note, \
             status, moderator_id, moderator_note, created_at, updated_at, resolved_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(report.reporter_id),
                v_text(report.target.kind.as_str()),
                v_uuid(report.target.id),
                v_text(report.reason.as_str()),
                v_text(&report.note),
                v_text(report.status.as_str()),
                v_opt_uuid(report.moderator_id),
                v_text(&report.moderator_note),
                v_dt(report.created_at),
                v_dt(report.updated_at),
                v_opt_dt(report.resolved_at),
            ],
        )
        .await?;
        info!("Created report {} targeting {}", id, report.target);
        Ok(())
    }

    async fn get_report_by_id(&self, id: Uuid) -> Result<Option<Report>> {
        self.fetch_one(
            &format!("SELECT {REPORT_COLS} FROM reports WHERE id = ?"),
            [v_uuid(id)],
            row_to_report,
        )
        .await
    }

    async fn find_open_report(
        &self,
        reporter_id: Uuid,
        target: ContentRef,
    ) -> Result<Option<Report>> {
        self.fetch_one(
            &format!(
                "SELECT {REPORT_COLS} FROM reports WHERE reporter_id = ? AND target_kind = ? \
                 AND target_id = ? AND status IN ('pending', 'in_review')"
            ),
            vec![
                v_uuid(reporter_id),
                v_text(target.kind.as_str()),
                v_uuid(target.id),
            ],
            row_to_report,
        )
        .await
    }

    async fn update_report(&self, report: &Report) -> Result<()> {
        self.exec(
            "UPDATE reports SET status = ?, moderator_id = ?, moderator_note = ?, \
             updated_at = ?, resolved_at = ? WHERE id = ?",
            vec![
                v_text(report.status.as_str()),
                v_opt_uuid(report.moderator_id),
                v_text(&report.moderator_note),
                v_dt(report.updated_at),
                v_opt_dt(report.resolved_at),
                v_opt_uuid(report.id),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Report>> {
        let mut sql = format!("SELECT {REPORT_COLS} FROM reports WHERE 1 = 1");
        let mut params: Vec<Value> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            params.push(v_text(status.as_str()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");
        params.push(v_int(limit.map(|l| l as i64).unwrap_or(-1)));
        params.push(v_int(offset.unwrap_or(0) as i64));
        self.fetch_all(&sql, params, row_to_report).await
    }

    async fn create_moderator_action(&self, action: &mut ModeratorAction) -> Result<()> {
        let id = assign_id(&mut action.id);
        self.exec(
            "INSERT INTO moderator_actions (id, moderator_id, action, target_kind, target_id, \
             report_id, note, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                v_uuid(id),
                v_uuid(action.moderator_id),
                v_text(action.action.as_str()),
                v_text(action.target.kind.as_str()),
                v_uuid(action.target.id),
                v_opt_uuid(action.report_id),
                v_text(&action.note),
                v_dt(action.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_moderator_actions(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ModeratorAction>> {
        self.fetch_all(
            &format!(
                "SELECT {MODERATOR_ACTION_COLS} FROM moderator_actions \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?"
            ),
            vec![
                v_int(limit.map(|l| l as i64).unwrap_or(-1)),
                v_int(offset.unwrap_or(0) as i64),
            ],
            row_to_moderator_action,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    async fn storage() -> (tempfile::TempDir, DatabaseStorage) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bookrate-test.db");
        let manager = DatabaseManager::new_local(path.to_str().unwrap())
            .await
            .unwrap();
        manager.run_migrations().await.unwrap();
        (dir, DatabaseStorage::new(Arc::new(manager)))
    }

    fn sample_user(name: &str) -> User {
        let now = Utc::now();
        User {
            id: None,
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "salt$hash".to_string(),
            role: Role::Member,
            is_verified: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn user_round_trip() {
        let (_dir, storage) = storage().await;
        let mut user = sample_user("reader");
        storage.create_user(&mut user).await.unwrap();
        let id = user.id.unwrap();

        let by_id = storage.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "reader");
        let by_name = storage.get_user_by_username("READER").await.unwrap();
        assert!(by_name.is_some());
    }

    #[tokio::test]
    async fn unique_review_constraint_is_enforced() {
        let (_dir, storage) = storage().await;
        let mut user = sample_user("reader");
        storage.create_user(&mut user).await.unwrap();

        let now = Utc::now();
        let mut book = Book {
            id: None,
            title: "Dune".to_string(),
            slug: "dune".to_string(),
            description: String::new(),
            year: None,
            pages: None,
            language: "en".to_string(),
            publisher_id: None,
            author_ids: Vec::new(),
            genre_ids: Vec::new(),
            tag_ids: Vec::new(),
            avg_rating: 0.0,
            rating_count: 0,
            review_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        storage.create_book(&mut book).await.unwrap();

        let make_review = || Review {
            id: None,
            book_id: book.id.unwrap(),
            user_id: user.id.unwrap(),
            title: "t".to_string(),
            body_md: "b".to_string(),
            body_html: "<p>b</p>".to_string(),
            rating: Some(4.0),
            status: ReviewStatus::Public,
            is_active: true,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            edited_at: None,
        };
        storage.create_review(&mut make_review()).await.unwrap();
        assert!(storage.create_review(&mut make_review()).await.is_err());

        let stats = storage.book_rating_stats(book.id.unwrap()).await.unwrap();
        assert_eq!(stats.review_count, 1);
        assert_eq!(stats.rating_count, 1);
        assert_eq!(stats.avg_rating, 4.0);
    }
}
