use crate::context::RequestContext;
use crate::error::{LibraryError, Result};
use crate::models::{FavoriteInput, RentalInput, RentalRow, SyncSummary};
use crate::service::{book_key, ensure_user, LibraryService};
use std::collections::BTreeSet;
use tracing::info;

impl LibraryService {
    /// Merges client-recorded rentals and favorites into the store, keyed by
    /// the client-supplied record ids. The whole batch is one transaction:
    /// either every record lands or none does, so a replay after a failed
    /// attempt starts from the same store state. Availability side effects
    /// fire once per record lifecycle (first insert of an open rental, and
    /// the open-to-closed transition), never on replay.
    pub async fn sync_offline_data(
        &self,
        ctx: &RequestContext,
        rentals: Vec<RentalInput>,
        favorites: Vec<FavoriteInput>,
    ) -> Result<SyncSummary> {
        let user = ctx.user()?;
        let mut tx = self.pool().begin().await?;
        ensure_user(&mut tx, user).await?;

        let mut touched_books = BTreeSet::new();
        let mut summary = SyncSummary::default();

        for input in &rentals {
            let existing: Option<RentalRow> = sqlx::query_as("SELECT * FROM rentals WHERE id = ?1")
                .bind(&input.id)
                .fetch_optional(&mut *tx)
                .await?;

            match existing {
                None => {
                    let book: Option<(String,)> =
                        sqlx::query_as("SELECT id FROM books WHERE id = ?1")
                            .bind(&input.book_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    if book.is_none() {
                        return Err(LibraryError::NotFound("book"));
                    }

                    sqlx::query(
                        "INSERT INTO rentals (id, user_id, book_id, rented_at, due_date, returned_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .bind(&input.id)
                    .bind(&user.id)
                    .bind(&input.book_id)
                    .bind(input.rented_at.timestamp())
                    .bind(input.due_date.timestamp())
                    .bind(input.returned_at.map(|at| at.timestamp()))
                    .execute(&mut *tx)
                    .await?;

                    if input.returned_at.is_none() {
                        let updated = sqlx::query(
                            "UPDATE books SET available_copies = available_copies - 1, updated_at = ?1 \
                             WHERE id = ?2 AND available_copies > 0",
                        )
                        .bind(input.rented_at.timestamp())
                        .bind(&input.book_id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();

                        if updated == 0 {
                            return Err(LibraryError::Unavailable);
                        }
                        touched_books.insert(input.book_id.clone());
                    }
                }
                Some(row) => {
                    // Last write wins on the returned_at field for a known id.
                    sqlx::query("UPDATE rentals SET returned_at = ?1 WHERE id = ?2")
                        .bind(input.returned_at.map(|at| at.timestamp()))
                        .bind(&input.id)
                        .execute(&mut *tx)
                        .await?;

                    if row.returned_at.is_none() {
                        if let Some(returned_at) = input.returned_at {
                            sqlx::query(
                                "UPDATE books SET available_copies = available_copies + 1, updated_at = ?1 \
                                 WHERE id = ?2",
                            )
                            .bind(returned_at.timestamp())
                            .bind(&row.book_id)
                            .execute(&mut *tx)
                            .await?;
                            touched_books.insert(row.book_id.clone());
                        }
                    }
                }
            }
            summary.rentals_merged += 1;
        }

        for input in &favorites {
            // INSERT OR IGNORE covers both a replayed record id and a pair the
            // user already favorited through the online path.
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO favorites (id, user_id, book_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&input.id)
            .bind(&user.id)
            .bind(&input.book_id)
            .bind(input.created_at.timestamp())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            summary.favorites_merged += inserted as usize;
        }

        tx.commit().await?;

        for book_id in &touched_books {
            self.cache().invalidate(&book_key(book_id)).await;
        }

        info!(
            rentals = summary.rentals_merged,
            favorites = summary.favorites_merged,
            invalidated = touched_books.len(),
            "offline batch merged"
        );

        Ok(summary)
    }
}
