use crate::context::RequestContext;
use crate::error::{LibraryError, Result};
use crate::models::{BookRow, Favorite, FavoriteRow, Rental, RentalRow};
use crate::service::{book_key, ensure_user, LibraryService};
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

pub(crate) const RENTAL_PERIOD_DAYS: i64 = 14;

impl LibraryService {
    pub async fn rent_book(&self, ctx: &RequestContext, book_id: &str) -> Result<Rental> {
        let user = ctx.user()?;
        let mut tx = self.pool().begin().await?;
        ensure_user(&mut tx, user).await?;

        let mut book: BookRow = sqlx::query_as("SELECT * FROM books WHERE id = ?1")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LibraryError::NotFound("book"))?;

        if book.available_copies <= 0 {
            return Err(LibraryError::Unavailable);
        }

        let open: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM rentals WHERE user_id = ?1 AND book_id = ?2 AND returned_at IS NULL",
        )
        .bind(&user.id)
        .bind(book_id)
        .fetch_optional(&mut *tx)
        .await?;

        if open.is_some() {
            return Err(LibraryError::DuplicateActiveRental);
        }

        let now = Utc::now();
        let rented_at = now.timestamp();
        let due_date = (now + ChronoDuration::days(RENTAL_PERIOD_DAYS)).timestamp();
        let rental_id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO rentals (id, user_id, book_id, rented_at, due_date, returned_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
        )
        .bind(&rental_id)
        .bind(&user.id)
        .bind(book_id)
        .bind(rented_at)
        .bind(due_date)
        .execute(&mut *tx)
        .await?;

        // Guarded decrement: the condition serializes concurrent rents on the
        // last copy so the count can never go below zero.
        let updated = sqlx::query(
            "UPDATE books SET available_copies = available_copies - 1, updated_at = ?1 \
             WHERE id = ?2 AND available_copies > 0",
        )
        .bind(rented_at)
        .bind(book_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(LibraryError::Unavailable);
        }

        tx.commit().await?;
        self.cache().invalidate(&book_key(book_id)).await;

        book.available_copies -= 1;
        book.updated_at = rented_at;
        let row = RentalRow {
            id: rental_id,
            user_id: user.id.clone(),
            book_id: book_id.to_string(),
            rented_at,
            due_date,
            returned_at: None,
        };
        Ok(Rental::from_parts(row, book.into()))
    }

    pub async fn return_book(&self, ctx: &RequestContext, rental_id: &str) -> Result<Rental> {
        let user = ctx.user()?;
        let mut tx = self.pool().begin().await?;

        let mut rental: RentalRow = sqlx::query_as("SELECT * FROM rentals WHERE id = ?1")
            .bind(rental_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LibraryError::NotFound("rental"))?;

        if rental.user_id != user.id {
            return Err(LibraryError::Forbidden("rental belongs to another user"));
        }
        if rental.returned_at.is_some() {
            return Err(LibraryError::AlreadyReturned);
        }

        let now = Utc::now().timestamp();
        sqlx::query("UPDATE rentals SET returned_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(rental_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1, updated_at = ?1 \
             WHERE id = ?2",
        )
        .bind(now)
        .bind(&rental.book_id)
        .execute(&mut *tx)
        .await?;

        let book: BookRow = sqlx::query_as("SELECT * FROM books WHERE id = ?1")
            .bind(&rental.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LibraryError::NotFound("book"))?;

        tx.commit().await?;
        self.cache().invalidate(&book_key(&rental.book_id)).await;

        rental.returned_at = Some(now);
        Ok(Rental::from_parts(rental, book.into()))
    }

    pub async fn add_favorite(&self, ctx: &RequestContext, book_id: &str) -> Result<Favorite> {
        let user = ctx.user()?;
        let mut tx = self.pool().begin().await?;
        ensure_user(&mut tx, user).await?;

        let book: BookRow = sqlx::query_as("SELECT * FROM books WHERE id = ?1")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LibraryError::NotFound("book"))?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM favorites WHERE user_id = ?1 AND book_id = ?2")
                .bind(&user.id)
                .bind(book_id)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Err(LibraryError::AlreadyFavorited);
        }

        let favorite_id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();
        let inserted = sqlx::query(
            "INSERT INTO favorites (id, user_id, book_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&favorite_id)
        .bind(&user.id)
        .bind(book_id)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        // The unique (user_id, book_id) constraint backs up the pre-check
        // against a concurrent insert of the same pair.
        if let Err(sqlx::Error::Database(db_err)) = &inserted {
            if db_err.is_unique_violation() {
                return Err(LibraryError::AlreadyFavorited);
            }
        }
        inserted?;

        tx.commit().await?;

        let row = FavoriteRow {
            id: favorite_id,
            user_id: user.id.clone(),
            book_id: book_id.to_string(),
            created_at,
        };
        Ok(Favorite::from_parts(row, book.into()))
    }

    pub async fn remove_favorite(&self, ctx: &RequestContext, favorite_id: &str) -> Result<()> {
        let user = ctx.user()?;

        let favorite: FavoriteRow = sqlx::query_as("SELECT * FROM favorites WHERE id = ?1")
            .bind(favorite_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LibraryError::NotFound("favorite"))?;

        if favorite.user_id != user.id {
            return Err(LibraryError::Forbidden("favorite belongs to another user"));
        }

        sqlx::query("DELETE FROM favorites WHERE id = ?1")
            .bind(favorite_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
