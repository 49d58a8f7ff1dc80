use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::{Pool, Sqlite};
use tn_core::{config, db, logging};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tn", version, about = "Toshokan node CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate,
    /// Load the sample catalog (skips books whose ISBN already exists)
    Seed,
}

struct SeedBook {
    title: &'static str,
    author: &'static str,
    isbn: &'static str,
    published_date: &'static str,
    genre: &'static str,
    total_copies: i64,
}

const SEED_BOOKS: &[SeedBook] = &[
    SeedBook {
        title: "The Great Gatsby",
        author: "F. Scott Fitzgerald",
        isbn: "9780743273565",
        published_date: "1925-04-10",
        genre: "Classic",
        total_copies: 5,
    },
    SeedBook {
        title: "To Kill a Mockingbird",
        author: "Harper Lee",
        isbn: "9780061120084",
        published_date: "1960-07-11",
        genre: "Fiction",
        total_copies: 3,
    },
    SeedBook {
        title: "1984",
        author: "George Orwell",
        isbn: "9780451524935",
        published_date: "1949-06-08",
        genre: "Dystopian",
        total_copies: 4,
    },
    SeedBook {
        title: "Pride and Prejudice",
        author: "Jane Austen",
        isbn: "9781503290563",
        published_date: "1813-01-28",
        genre: "Romance",
        total_copies: 2,
    },
    SeedBook {
        title: "The Hobbit",
        author: "J.R.R. Tolkien",
        isbn: "9780547928227",
        published_date: "1937-09-21",
        genre: "Fantasy",
        total_copies: 6,
    },
    SeedBook {
        title: "The Catcher in the Rye",
        author: "J.D. Salinger",
        isbn: "9780316769488",
        published_date: "1951-07-16",
        genre: "Coming-of-age",
        total_copies: 3,
    },
    SeedBook {
        title: "Brave New World",
        author: "Aldous Huxley",
        isbn: "9780060850524",
        published_date: "1932-08-30",
        genre: "Dystopian",
        total_copies: 4,
    },
];

async fn seed(pool: &Pool<Sqlite>) -> Result<()> {
    let now = Utc::now().timestamp();
    let mut inserted = 0u64;

    for book in SEED_BOOKS {
        let rows = sqlx::query(
            "INSERT INTO books \
             (id, title, author, isbn, published_date, genre, total_copies, available_copies, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?8) \
             ON CONFLICT(isbn) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(book.title)
        .bind(book.author)
        .bind(book.isbn)
        .bind(book.published_date)
        .bind(book.genre)
        .bind(book.total_copies)
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
        inserted += rows;
    }

    info!(inserted, total = SEED_BOOKS.len(), "sample catalog seeded");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("tn-cli");
    let cli = Cli::parse();

    let database_url = config::required_env("DATABASE_URL")?;
    let pool = db::connect(&database_url).await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Commands::Seed => {
            db::run_migrations(&pool).await?;
            seed(&pool).await?;
        }
    }

    Ok(())
}
