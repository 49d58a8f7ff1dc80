use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not permitted: {0}")]
    Forbidden(&'static str),
    #[error("no copies available")]
    Unavailable,
    #[error("an open rental already exists for this book")]
    DuplicateActiveRental,
    #[error("rental has already been returned")]
    AlreadyReturned,
    #[error("book is already a favorite")]
    AlreadyFavorited,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
