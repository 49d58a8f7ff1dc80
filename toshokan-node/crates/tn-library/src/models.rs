use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Store rows. Conversion into the API entities below happens exactly once,
// through the From impls at the bottom of this file; nothing else maps
// nullable columns.

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct BookRow {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub isbn: String,
    pub published_date: Option<String>,
    pub genre: Option<String>,
    pub total_copies: i64,
    pub available_copies: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct RentalRow {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub rented_at: i64,
    pub due_date: i64,
    pub returned_at: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FavoriteRow {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub created_at: i64,
}

// API entities.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub isbn: String,
    pub published_date: Option<String>,
    pub genre: Option<String>,
    pub total_copies: i64,
    pub available_copies: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub rented_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub book: Book,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub created_at: DateTime<Utc>,
    pub book: Book,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEdge {
    pub node: Book,
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookConnection {
    pub edges: Vec<BookEdge>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

// Offline-sync inputs carry client-generated ids and timestamps.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalInput {
    pub id: String,
    pub book_id: String,
    pub rented_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteInput {
    pub id: String,
    pub book_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub rentals_merged: usize,
    pub favorites_merged: usize,
}

pub(crate) fn datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            photo_url: row.photo_url,
            created_at: datetime(row.created_at),
            updated_at: datetime(row.updated_at),
        }
    }
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            cover_image: row.cover_image,
            isbn: row.isbn,
            published_date: row.published_date,
            genre: row.genre,
            total_copies: row.total_copies,
            available_copies: row.available_copies,
            created_at: datetime(row.created_at),
            updated_at: datetime(row.updated_at),
        }
    }
}

impl Rental {
    pub(crate) fn from_parts(row: RentalRow, book: Book) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            rented_at: datetime(row.rented_at),
            due_date: datetime(row.due_date),
            returned_at: row.returned_at.map(datetime),
            book,
        }
    }
}

impl Favorite {
    pub(crate) fn from_parts(row: FavoriteRow, book: Book) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            created_at: datetime(row.created_at),
            book,
        }
    }
}
