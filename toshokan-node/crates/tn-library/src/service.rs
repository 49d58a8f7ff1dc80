use crate::context::{AuthUser, RequestContext};
use crate::error::{LibraryError, Result};
use crate::models::{
    Book, BookConnection, BookEdge, BookRow, Favorite, FavoriteRow, PageInfo, Rental, RentalRow,
    User, UserRow,
};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::sync::Arc;
use std::time::Duration;
use tn_core::cache::ResultCache;
use tracing::warn;

pub(crate) const DEFAULT_PAGE_SIZE: i64 = 10;

pub(crate) fn book_key(book_id: &str) -> String {
    format!("book:{book_id}")
}

pub(crate) fn books_page_key(first: i64, after: Option<&str>) -> String {
    format!("books:{first}:{}", after.unwrap_or("first"))
}

/// The reconciliation service: every operation runs as one request-scoped
/// transaction against the inventory store, with cache-aside reads and
/// write-triggered invalidation of point-read keys.
pub struct LibraryService {
    pool: Pool<Sqlite>,
    cache: Arc<dyn ResultCache>,
    cache_ttl: Duration,
}

impl LibraryService {
    pub fn new(pool: Pool<Sqlite>, cache: Arc<dyn ResultCache>, cache_ttl: Duration) -> Self {
        Self {
            pool,
            cache,
            cache_ttl,
        }
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub(crate) fn cache(&self) -> &dyn ResultCache {
        self.cache.as_ref()
    }

    /// Mirrors the externally-verified identity into the store so rentals and
    /// favorites can reference it.
    pub async fn register_identity(&self, user: &AuthUser) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        ensure_user(&mut *conn, user).await?;
        let row = fetch_user(&mut *conn, &user.id)
            .await?
            .ok_or(LibraryError::NotFound("user"))?;
        Ok(row.into())
    }

    pub async fn me(&self, ctx: &RequestContext) -> Result<User> {
        let user = ctx.user()?;
        self.register_identity(user).await
    }

    pub async fn books(
        &self,
        _ctx: &RequestContext,
        first: Option<i64>,
        after: Option<String>,
    ) -> Result<BookConnection> {
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let key = books_page_key(first, after.as_deref());

        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str::<BookConnection>(&raw) {
                Ok(page) => return Ok(page),
                Err(err) => warn!(key = %key, error = %err, "discarding undecodable cached page"),
            }
        }

        // The cursor is an opaque offset token; after=c resumes at offset c+1.
        let skip = after
            .as_deref()
            .and_then(|cursor| cursor.parse::<i64>().ok())
            .map(|offset| offset + 1)
            .unwrap_or(0);

        // Over-fetch one row beyond the page to learn whether a next page exists.
        let mut rows: Vec<BookRow> = sqlx::query_as(
            "SELECT * FROM books ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(first + 1)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let has_next_page = rows.len() as i64 > first;
        if has_next_page {
            rows.truncate(first as usize);
        }

        let total_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let edges: Vec<BookEdge> = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| BookEdge {
                cursor: (skip + index as i64).to_string(),
                node: row.into(),
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page: skip > 0,
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        };

        let connection = BookConnection {
            edges,
            page_info,
            total_count,
        };

        if let Ok(raw) = serde_json::to_string(&connection) {
            self.cache.put(&key, &raw, self.cache_ttl).await;
        }

        Ok(connection)
    }

    pub async fn book(&self, _ctx: &RequestContext, book_id: &str) -> Result<Book> {
        let key = book_key(book_id);

        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str::<Book>(&raw) {
                Ok(book) => return Ok(book),
                Err(err) => warn!(key = %key, error = %err, "discarding undecodable cached book"),
            }
        }

        let row: BookRow = sqlx::query_as("SELECT * FROM books WHERE id = ?1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LibraryError::NotFound("book"))?;

        let book: Book = row.into();
        if let Ok(raw) = serde_json::to_string(&book) {
            self.cache.put(&key, &raw, self.cache_ttl).await;
        }

        Ok(book)
    }

    pub async fn my_rentals(&self, ctx: &RequestContext) -> Result<Vec<Rental>> {
        let user = ctx.user()?;
        let rows: Vec<RentalRow> = sqlx::query_as(
            "SELECT * FROM rentals WHERE user_id = ?1 ORDER BY rented_at DESC, id DESC",
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;

        self.with_books(rows).await
    }

    pub async fn overdue_rentals(&self, ctx: &RequestContext) -> Result<Vec<Rental>> {
        let user = ctx.user()?;
        let now = Utc::now().timestamp();
        let rows: Vec<RentalRow> = sqlx::query_as(
            "SELECT * FROM rentals \
             WHERE user_id = ?1 AND returned_at IS NULL AND due_date < ?2 \
             ORDER BY due_date ASC, id ASC",
        )
        .bind(&user.id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        self.with_books(rows).await
    }

    pub async fn my_favorites(&self, ctx: &RequestContext) -> Result<Vec<Favorite>> {
        let user = ctx.user()?;
        let rows: Vec<FavoriteRow> = sqlx::query_as(
            "SELECT * FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;

        let mut favorites = Vec::with_capacity(rows.len());
        for row in rows {
            let book = self
                .book_row(&row.book_id)
                .await?
                .ok_or(LibraryError::NotFound("book"))?;
            favorites.push(Favorite::from_parts(row, book.into()));
        }
        Ok(favorites)
    }

    pub(crate) async fn book_row(&self, book_id: &str) -> Result<Option<BookRow>> {
        let row = sqlx::query_as("SELECT * FROM books WHERE id = ?1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn with_books(&self, rows: Vec<RentalRow>) -> Result<Vec<Rental>> {
        let mut rentals = Vec::with_capacity(rows.len());
        for row in rows {
            let book = self
                .book_row(&row.book_id)
                .await?
                .ok_or(LibraryError::NotFound("book"))?;
            rentals.push(Rental::from_parts(row, book.into()));
        }
        Ok(rentals)
    }
}

pub(crate) async fn ensure_user(conn: &mut SqliteConnection, user: &AuthUser) -> Result<()> {
    let now = Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO users (id, email, name, photo_url, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
         ON CONFLICT(id) DO UPDATE SET \
             email = excluded.email, \
             name = excluded.name, \
             photo_url = excluded.photo_url, \
             updated_at = excluded.updated_at",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.photo_url)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<UserRow>> {
    let row = sqlx::query_as("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}
