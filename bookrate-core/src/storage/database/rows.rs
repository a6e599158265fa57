//! Row-to-domain conversion for the libSQL store.
//!
//! Each `*_COLS` constant is the exact column order the matching `row_to_*`
//! function expects; queries interpolate the constant into their SELECT list.

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Row, Value};
use uuid::Uuid;

use crate::common::error::{CoreError, Result};
use crate::content::{ContentKind, ContentRef};
use crate::domain::*;

pub(super) fn db_err(context: &str, e: impl std::fmt::Display) -> CoreError {
    CoreError::Database {
        message: format!("{context}: {e}"),
    }
}

fn col(row: &Row, idx: i32) -> Result<Value> {
    row.get_value(idx)
        .map_err(|e| db_err("failed to read column", e))
}

fn get_text(row: &Row, idx: i32) -> Result<String> {
    match col(row, idx)? {
        Value::Text(s) => Ok(s),
        other => Err(db_err("expected text column", format!("{other:?}"))),
    }
}

pub(super) fn get_text_opt(row: &Row, idx: i32) -> Result<Option<String>> {
    match col(row, idx)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(db_err("expected nullable text column", format!("{other:?}"))),
    }
}

pub(super) fn get_i64(row: &Row, idx: i32) -> Result<i64> {
    match col(row, idx)? {
        Value::Integer(i) => Ok(i),
        other => Err(db_err("expected integer column", format!("{other:?}"))),
    }
}

fn get_i64_opt(row: &Row, idx: i32) -> Result<Option<i64>> {
    match col(row, idx)? {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        other => Err(db_err(
            "expected nullable integer column",
            format!("{other:?}"),
        )),
    }
}

/// SQLite may hand back integers for REAL expressions (e.g. COALESCE(.., 0)).
pub(super) fn get_f64(row: &Row, idx: i32) -> Result<f64> {
    match col(row, idx)? {
        Value::Real(f) => Ok(f),
        Value::Integer(i) => Ok(i as f64),
        other => Err(db_err("expected real column", format!("{other:?}"))),
    }
}

fn get_f64_opt(row: &Row, idx: i32) -> Result<Option<f64>> {
    match col(row, idx)? {
        Value::Null => Ok(None),
        Value::Real(f) => Ok(Some(f)),
        Value::Integer(i) => Ok(Some(i as f64)),
        other => Err(db_err(
            "expected nullable real column",
            format!("{other:?}"),
        )),
    }
}

fn get_bool(row: &Row, idx: i32) -> Result<bool> {
    Ok(get_i64(row, idx)? != 0)
}

fn get_u32(row: &Row, idx: i32) -> Result<u32> {
    Ok(get_i64(row, idx)? as u32)
}

fn get_u32_opt(row: &Row, idx: i32) -> Result<Option<u32>> {
    Ok(get_i64_opt(row, idx)?.map(|v| v as u32))
}

pub(super) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| db_err("invalid UUID in database", e))
}

fn get_uuid(row: &Row, idx: i32) -> Result<Uuid> {
    parse_uuid(&get_text(row, idx)?)
}

fn get_uuid_opt(row: &Row, idx: i32) -> Result<Option<Uuid>> {
    get_text_opt(row, idx)?
        .map(|s| parse_uuid(&s))
        .transpose()
}

pub(super) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| db_err("invalid timestamp in database", e))
}

fn get_datetime(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_datetime(&get_text(row, idx)?)
}

fn get_datetime_opt(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    get_text_opt(row, idx)?
        .map(|s| parse_datetime(&s))
        .transpose()
}

fn get_date_opt(row: &Row, idx: i32) -> Result<Option<NaiveDate>> {
    get_text_opt(row, idx)?
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| db_err("invalid date in database", e))
        })
        .transpose()
}

fn get_content_ref(row: &Row, kind_idx: i32, id_idx: i32) -> Result<ContentRef> {
    Ok(ContentRef {
        kind: ContentKind::parse(&get_text(row, kind_idx)?)?,
        id: get_uuid(row, id_idx)?,
    })
}

fn get_content_ref_opt(row: &Row, kind_idx: i32, id_idx: i32) -> Result<Option<ContentRef>> {
    match (get_text_opt(row, kind_idx)?, get_uuid_opt(row, id_idx)?) {
        (Some(kind), Some(id)) => Ok(Some(ContentRef {
            kind: ContentKind::parse(&kind)?,
            id,
        })),
        _ => Ok(None),
    }
}

pub(super) const USER_COLS: &str =
    "id, username, email, password_hash, role, is_verified, is_active, created_at, updated_at";

pub(super) fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: Some(get_uuid(row, 0)?),
        username: get_text(row, 1)?,
        email: get_text(row, 2)?,
        password_hash: get_text(row, 3)?,
        role: Role::parse(&get_text(row, 4)?)?,
        is_verified: get_bool(row, 5)?,
        is_active: get_bool(row, 6)?,
        created_at: get_datetime(row, 7)?,
        updated_at: get_datetime(row, 8)?,
    })
}

pub(super) const PROFILE_COLS: &str = "id, user_id, bio, location, website, facebook_url, \
     twitter_url, instagram_url, language, notify_follow, notify_review_like, notify_comment, \
     notify_mention, created_at, updated_at";

pub(super) fn row_to_profile(row: &Row) -> Result<Profile> {
    Ok(Profile {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        bio: get_text(row, 2)?,
        location: get_text(row, 3)?,
        website: get_text(row, 4)?,
        facebook_url: get_text(row, 5)?,
        twitter_url: get_text(row, 6)?,
        instagram_url: get_text(row, 7)?,
        language: get_text(row, 8)?,
        notify_follow: get_bool(row, 9)?,
        notify_review_like: get_bool(row, 10)?,
        notify_comment: get_bool(row, 11)?,
        notify_mention: get_bool(row, 12)?,
        created_at: get_datetime(row, 13)?,
        updated_at: get_datetime(row, 14)?,
    })
}

pub(super) const SESSION_COLS: &str = "id, user_id, token, expires_at, created_at";

pub(super) fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        token: get_text(row, 2)?,
        expires_at: get_datetime(row, 3)?,
        created_at: get_datetime(row, 4)?,
    })
}

pub(super) const VERIFICATION_TOKEN_COLS: &str =
    "id, user_id, token, expires_at, is_used, created_at";

pub(super) fn row_to_verification_token(row: &Row) -> Result<VerificationToken> {
    Ok(VerificationToken {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        token: get_text(row, 2)?,
        expires_at: get_datetime(row, 3)?,
        is_used: get_bool(row, 4)?,
        created_at: get_datetime(row, 5)?,
    })
}

pub(super) const AUTHOR_COLS: &str = "id, name, slug, bio, birth_date, death_date, nationality, \
     website, is_active, created_at, updated_at";

pub(super) fn row_to_author(row: &Row) -> Result<Author> {
    Ok(Author {
        id: Some(get_uuid(row, 0)?),
        name: get_text(row, 1)?,
        slug: get_text(row, 2)?,
        bio: get_text(row, 3)?,
        birth_date: get_date_opt(row, 4)?,
        death_date: get_date_opt(row, 5)?,
        nationality: get_text(row, 6)?,
        website: get_text(row, 7)?,
        is_active: get_bool(row, 8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_datetime(row, 10)?,
    })
}

pub(super) const GENRE_COLS: &str =
    "id, name, slug, description, parent_id, is_active, created_at, updated_at";

pub(super) fn row_to_genre(row: &Row) -> Result<Genre> {
    Ok(Genre {
        id: Some(get_uuid(row, 0)?),
        name: get_text(row, 1)?,
        slug: get_text(row, 2)?,
        description: get_text(row, 3)?,
        parent_id: get_uuid_opt(row, 4)?,
        is_active: get_bool(row, 5)?,
        created_at: get_datetime(row, 6)?,
        updated_at: get_datetime(row, 7)?,
    })
}

pub(super) const PUBLISHER_COLS: &str =
    "id, name, slug, description, website, is_active, created_at, updated_at";

pub(super) fn row_to_publisher(row: &Row) -> Result<Publisher> {
    Ok(Publisher {
        id: Some(get_uuid(row, 0)?),
        name: get_text(row, 1)?,
        slug: get_text(row, 2)?,
        description: get_text(row, 3)?,
        website: get_text(row, 4)?,
        is_active: get_bool(row, 5)?,
        created_at: get_datetime(row, 6)?,
        updated_at: get_datetime(row, 7)?,
    })
}

pub(super) const TAG_COLS: &str =
    "id, name, slug, description, is_active, created_at, updated_at";

pub(super) fn row_to_tag(row: &Row) -> Result<Tag> {
    Ok(Tag {
        id: Some(get_uuid(row, 0)?),
        name: get_text(row, 1)?,
        slug: get_text(row, 2)?,
        description: get_text(row, 3)?,
        is_active: get_bool(row, 4)?,
        created_at: get_datetime(row, 5)?,
        updated_at: get_datetime(row, 6)?,
    })
}

pub(super) const BOOK_COLS: &str = "id, title, slug, description, year, pages, language, \
     publisher_id, avg_rating, rating_count, review_count, is_active, created_at, updated_at";

/// Association id-vectors are loaded separately from the join tables.
pub(super) fn row_to_book(row: &Row) -> Result<Book> {
    Ok(Book {
        id: Some(get_uuid(row, 0)?),
        title: get_text(row, 1)?,
        slug: get_text(row, 2)?,
        description: get_text(row, 3)?,
        year: get_i64_opt(row, 4)?.map(|v| v as i32),
        pages: get_u32_opt(row, 5)?,
        language: get_text(row, 6)?,
        publisher_id: get_uuid_opt(row, 7)?,
        author_ids: Vec::new(),
        genre_ids: Vec::new(),
        tag_ids: Vec::new(),
        avg_rating: get_f64(row, 8)?,
        rating_count: get_u32(row, 9)?,
        review_count: get_u32(row, 10)?,
        is_active: get_bool(row, 11)?,
        created_at: get_datetime(row, 12)?,
        updated_at: get_datetime(row, 13)?,
    })
}

pub(super) const EDITION_COLS: &str = "id, book_id, isbn13, format, published_at, language, \
     pages, is_active, created_at, updated_at";

pub(super) fn row_to_edition(row: &Row) -> Result<Edition> {
    Ok(Edition {
        id: Some(get_uuid(row, 0)?),
        book_id: get_uuid(row, 1)?,
        isbn13: get_text_opt(row, 2)?,
        format: EditionFormat::parse(&get_text(row, 3)?)?,
        published_at: get_date_opt(row, 4)?,
        language: get_text(row, 5)?,
        pages: get_u32_opt(row, 6)?,
        is_active: get_bool(row, 7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_datetime(row, 9)?,
    })
}

pub(super) const REVIEW_COLS: &str = "id, book_id, user_id, title, body_md, body_html, rating, \
     status, is_active, like_count, comment_count, created_at, updated_at, edited_at";

pub(super) fn row_to_review(row: &Row) -> Result<Review> {
    Ok(Review {
        id: Some(get_uuid(row, 0)?),
        book_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        title: get_text(row, 3)?,
        body_md: get_text(row, 4)?,
        body_html: get_text(row, 5)?,
        rating: get_f64_opt(row, 6)?,
        status: ReviewStatus::parse(&get_text(row, 7)?)?,
        is_active: get_bool(row, 8)?,
        like_count: get_u32(row, 9)?,
        comment_count: get_u32(row, 10)?,
        created_at: get_datetime(row, 11)?,
        updated_at: get_datetime(row, 12)?,
        edited_at: get_datetime_opt(row, 13)?,
    })
}

pub(super) const REVISION_COLS: &str =
    "id, review_id, title, body_md, body_html, rating, created_at";

pub(super) fn row_to_revision(row: &Row) -> Result<ReviewRevision> {
    Ok(ReviewRevision {
        id: Some(get_uuid(row, 0)?),
        review_id: get_uuid(row, 1)?,
        title: get_text(row, 2)?,
        body_md: get_text(row, 3)?,
        body_html: get_text(row, 4)?,
        rating: get_f64_opt(row, 5)?,
        created_at: get_datetime(row, 6)?,
    })
}

pub(super) const COMMENT_COLS: &str = "id, review_id, user_id, parent_id, body, status, \
     is_active, like_count, created_at, updated_at";

pub(super) fn row_to_comment(row: &Row) -> Result<Comment> {
    Ok(Comment {
        id: Some(get_uuid(row, 0)?),
        review_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        parent_id: get_uuid_opt(row, 3)?,
        body: get_text(row, 4)?,
        status: CommentStatus::parse(&get_text(row, 5)?)?,
        is_active: get_bool(row, 6)?,
        like_count: get_u32(row, 7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_datetime(row, 9)?,
    })
}

pub(super) const LIKE_COLS: &str = "id, user_id, target_kind, target_id, created_at";

pub(super) fn row_to_like(row: &Row) -> Result<Like> {
    Ok(Like {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        target: get_content_ref(row, 2, 3)?,
        created_at: get_datetime(row, 4)?,
    })
}

pub(super) const SHELF_COLS: &str = "id, user_id, name, system_kind, description, visibility, \
     book_count, is_active, created_at, updated_at";

pub(super) fn row_to_shelf(row: &Row) -> Result<Shelf> {
    Ok(Shelf {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        name: get_text(row, 2)?,
        system_kind: get_text_opt(row, 3)?
            .map(|s| ShelfKind::parse(&s))
            .transpose()?,
        description: get_text(row, 4)?,
        visibility: Visibility::parse(&get_text(row, 5)?)?,
        book_count: get_u32(row, 6)?,
        is_active: get_bool(row, 7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_datetime(row, 9)?,
    })
}

pub(super) const SHELF_ITEM_COLS: &str = "id, shelf_id, book_id, position, added_at";

pub(super) fn row_to_shelf_item(row: &Row) -> Result<ShelfItem> {
    Ok(ShelfItem {
        id: Some(get_uuid(row, 0)?),
        shelf_id: get_uuid(row, 1)?,
        book_id: get_uuid(row, 2)?,
        position: get_u32(row, 3)?,
        added_at: get_datetime(row, 4)?,
    })
}

pub(super) const PROGRESS_COLS: &str =
    "id, user_id, book_id, page, percent, notes, created_at, updated_at";

pub(super) fn row_to_progress(row: &Row) -> Result<ReadingProgress> {
    Ok(ReadingProgress {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        book_id: get_uuid(row, 2)?,
        page: get_u32_opt(row, 3)?,
        percent: get_f64_opt(row, 4)?,
        notes: get_text(row, 5)?,
        created_at: get_datetime(row, 6)?,
        updated_at: get_datetime(row, 7)?,
    })
}

pub(super) const FOLLOW_COLS: &str = "id, follower_id, target_kind, target_id, created_at";

pub(super) fn row_to_follow(row: &Row) -> Result<Follow> {
    Ok(Follow {
        id: Some(get_uuid(row, 0)?),
        follower_id: get_uuid(row, 1)?,
        target: get_content_ref(row, 2, 3)?,
        created_at: get_datetime(row, 4)?,
    })
}

pub(super) const NOTIFICATION_COLS: &str =
    "id, user_id, kind, source_kind, source_id, payload, is_read, created_at";

pub(super) fn row_to_notification(row: &Row) -> Result<Notification> {
    Ok(Notification {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        kind: NotificationKind::parse(&get_text(row, 2)?)?,
        source: get_content_ref_opt(row, 3, 4)?,
        payload: serde_json::from_str(&get_text(row, 5)?)
            .map_err(|e| db_err("invalid notification payload", e))?,
        is_read: get_bool(row, 6)?,
        created_at: get_datetime(row, 7)?,
    })
}

pub(super) const COLLECTION_COLS: &str = "id, user_id, name, slug, description, visibility, \
     book_count, is_active, created_at, updated_at";

pub(super) fn row_to_collection(row: &Row) -> Result<Collection> {
    Ok(Collection {
        id: Some(get_uuid(row, 0)?),
        user_id: get_uuid(row, 1)?,
        name: get_text(row, 2)?,
        slug: get_text(row, 3)?,
        description: get_text(row, 4)?,
        visibility: Visibility::parse(&get_text(row, 5)?)?,
        book_count: get_u32(row, 6)?,
        is_active: get_bool(row, 7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_datetime(row, 9)?,
    })
}

pub(super) const COLLECTION_ITEM_COLS: &str =
    "id, collection_id, book_id, notes, position, added_at";

pub(super) fn row_to_collection_item(row: &Row) -> Result<CollectionItem> {
    Ok(CollectionItem {
        id: Some(get_uuid(row, 0)?),
        collection_id: get_uuid(row, 1)?,
        book_id: get_uuid(row, 2)?,
        notes: get_text(row, 3)?,
        position: get_u32(row, 4)?,
        added_at: get_datetime(row, 5)?,
    })
}

pub(super) const REPORT_COLS: &str = "id, reporter_id, target_kind, target_id, reason, note, \
     status, moderator_id, moderator_note, created_at, updated_at, resolved_at";

pub(super) fn row_to_report(row: &Row) -> Result<Report> {
    Ok(Report {
        id: Some(get_uuid(row, 0)?),
        reporter_id: get_uuid(row, 1)?,
        target: get_content_ref(row, 2, 3)?,
        reason: ReportReason::parse(&get_text(row, 4)?)?,
        note: get_text(row, 5)?,
        status: ReportStatus::parse(&get_text(row, 6)?)?,
        moderator_id: get_uuid_opt(row, 7)?,
        moderator_note: get_text(row, 8)?,
        created_at: get_datetime(row, 9)?,
        updated_at: get_datetime(row, 10)?,
        resolved_at: get_datetime_opt(row, 11)?,
    })
}

pub(super) const MODERATOR_ACTION_COLS: &str =
    "id, moderator_id, action, target_kind, target_id, report_id, note, created_at";

pub(super) fn row_to_moderator_action(row: &Row) -> Result<ModeratorAction> {
    Ok(ModeratorAction {
        id: Some(get_uuid(row, 0)?),
        moderator_id: get_uuid(row, 1)?,
        action: ModerationAction::parse(&get_text(row, 2)?)?,
        target: get_content_ref(row, 3, 4)?,
        report_id: get_uuid_opt(row, 5)?,
        note: get_text(row, 6)?,
        created_at: get_datetime(row, 7)?,
    })
}
