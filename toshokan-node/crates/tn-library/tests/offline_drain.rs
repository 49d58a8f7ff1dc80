//! Drains a client-side sync ledger into the reconciliation service, the way
//! the mobile shell replays offline work once connectivity returns.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tn_core::cache::MemoryResultCache;
use tn_library::models::{FavoriteInput, RentalInput};
use tn_library::{AuthUser, LibraryService, RequestContext};
use toshokan_client::modules::outbox::models::{
    AddFavoriteArgs, MutationKind, QueuedMutation, RemoveFavoriteArgs, RentBookArgs,
    ReturnBookArgs,
};
use toshokan_client::{ClientError, Database, DrainHalt, LedgerDrainer, MutationApplier, SyncLedger};

struct ServiceApplier {
    service: Arc<LibraryService>,
    ctx: RequestContext,
}

fn remote(err: tn_library::LibraryError) -> ClientError {
    ClientError::Remote(err.to_string())
}

#[async_trait]
impl MutationApplier for ServiceApplier {
    async fn apply(&self, mutation: &QueuedMutation) -> toshokan_client::Result<()> {
        match mutation.kind {
            MutationKind::RentBook => {
                let args: RentBookArgs = mutation.arguments_as()?;
                self.service
                    .sync_offline_data(
                        &self.ctx,
                        vec![RentalInput {
                            id: args.rental_id,
                            book_id: args.book_id,
                            rented_at: args.rented_at,
                            due_date: args.due_date,
                            returned_at: None,
                        }],
                        vec![],
                    )
                    .await
                    .map(|_| ())
                    .map_err(remote)
            }
            MutationKind::ReturnBook => {
                let args: ReturnBookArgs = mutation.arguments_as()?;
                self.service
                    .return_book(&self.ctx, &args.rental_id)
                    .await
                    .map(|_| ())
                    .map_err(remote)
            }
            MutationKind::AddFavorite => {
                let args: AddFavoriteArgs = mutation.arguments_as()?;
                self.service
                    .sync_offline_data(
                        &self.ctx,
                        vec![],
                        vec![FavoriteInput {
                            id: args.favorite_id,
                            book_id: args.book_id,
                            created_at: args.created_at,
                        }],
                    )
                    .await
                    .map(|_| ())
                    .map_err(remote)
            }
            MutationKind::RemoveFavorite => {
                let args: RemoveFavoriteArgs = mutation.arguments_as()?;
                self.service
                    .remove_favorite(&self.ctx, &args.favorite_id)
                    .await
                    .map_err(remote)
            }
        }
    }
}

async fn server_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    tn_core::db::run_migrations(&pool).await.unwrap();
    pool
}

async fn client_ledger() -> Arc<SyncLedger> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    Database::run_migrations(&pool).await.unwrap();
    Arc::new(SyncLedger::new(pool))
}

fn ctx(user_id: &str) -> RequestContext {
    RequestContext::authenticated(AuthUser {
        id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        name: None,
        photo_url: None,
    })
}

async fn insert_book(pool: &Pool<Sqlite>, id: &str, total: i64, available: i64) {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO books (id, title, author, isbn, total_copies, available_copies, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
    )
    .bind(id)
    .bind(format!("Book {id}"))
    .bind("Author")
    .bind(format!("isbn-{id}"))
    .bind(total)
    .bind(available)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}

async fn available_copies(pool: &Pool<Sqlite>, book_id: &str) -> i64 {
    sqlx::query_scalar("SELECT available_copies FROM books WHERE id = ?1")
        .bind(book_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn offline_rent_then_return_drains_to_net_zero() {
    let pool = server_pool().await;
    insert_book(&pool, "b1", 1, 1).await;

    let service = Arc::new(LibraryService::new(
        pool.clone(),
        Arc::new(MemoryResultCache::new()),
        Duration::from_secs(3600),
    ));

    // The queue recorded while offline: a rental and its return.
    let ledger = client_ledger().await;
    let rent = RentBookArgs::new("b1");
    let rental_id = rent.rental_id.clone();
    ledger.enqueue(MutationKind::RentBook, &rent).await.unwrap();
    ledger
        .enqueue(MutationKind::ReturnBook, &ReturnBookArgs::new(&rental_id))
        .await
        .unwrap();

    let drainer = LedgerDrainer::new(Arc::clone(&ledger));
    let applier = ServiceApplier {
        service: Arc::clone(&service),
        ctx: ctx("u1"),
    };

    let report = drainer.drain(&applier).await.unwrap().unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.halt, None);
    assert!(ledger.is_empty().await.unwrap());

    // Net zero, and exactly one rental row under the client-assigned id.
    assert_eq!(available_copies(&pool, "b1").await, 1);
    let (count, returned): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(returned_at) FROM rentals WHERE id = ?1",
    )
    .bind(&rental_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(returned, 1);
}

#[tokio::test]
async fn drain_halts_when_the_service_rejects_a_record() {
    let pool = server_pool().await;
    insert_book(&pool, "b1", 1, 1).await;

    let service = Arc::new(LibraryService::new(
        pool.clone(),
        Arc::new(MemoryResultCache::new()),
        Duration::from_secs(3600),
    ));

    let ledger = client_ledger().await;
    // The head record returns a rental the server has never seen.
    let bad_seq = ledger
        .enqueue(MutationKind::ReturnBook, &ReturnBookArgs::new("missing"))
        .await
        .unwrap();
    ledger
        .enqueue(MutationKind::RentBook, &RentBookArgs::new("b1"))
        .await
        .unwrap();

    let drainer = LedgerDrainer::new(Arc::clone(&ledger));
    let applier = ServiceApplier {
        service: Arc::clone(&service),
        ctx: ctx("u1"),
    };

    let report = drainer.drain(&applier).await.unwrap().unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.remaining, 2);
    assert!(matches!(
        report.halt,
        Some(DrainHalt::Failed { seq, .. }) if seq == bad_seq
    ));

    // Nothing applied; the queue keeps its order for the next trigger.
    assert_eq!(available_copies(&pool, "b1").await, 1);
    let pending = ledger.pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].seq, bad_seq);
}

#[tokio::test]
async fn replayed_offline_favorites_stay_unique() {
    let pool = server_pool().await;
    insert_book(&pool, "b1", 1, 1).await;

    let service = Arc::new(LibraryService::new(
        pool.clone(),
        Arc::new(MemoryResultCache::new()),
        Duration::from_secs(3600),
    ));

    let ledger = client_ledger().await;
    // The same book was favorited twice while offline.
    ledger
        .enqueue(MutationKind::AddFavorite, &AddFavoriteArgs::new("b1"))
        .await
        .unwrap();
    ledger
        .enqueue(MutationKind::AddFavorite, &AddFavoriteArgs::new("b1"))
        .await
        .unwrap();

    let drainer = LedgerDrainer::new(Arc::clone(&ledger));
    let applier = ServiceApplier {
        service: Arc::clone(&service),
        ctx: ctx("u1"),
    };

    let report = drainer.drain(&applier).await.unwrap().unwrap();
    assert_eq!(report.applied, 2);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
