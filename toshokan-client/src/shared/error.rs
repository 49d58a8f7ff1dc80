use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown mutation kind: {0}")]
    UnknownMutationKind(String),
    #[error("remote apply failed: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
