use crate::shared::error::{ClientError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// サーバ側の貸出期間デフォルトと揃えておく
const RENTAL_PERIOD_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    RentBook,
    ReturnBook,
    AddFavorite,
    RemoveFavorite,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::RentBook => "rent_book",
            MutationKind::ReturnBook => "return_book",
            MutationKind::AddFavorite => "add_favorite",
            MutationKind::RemoveFavorite => "remove_favorite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rent_book" => Some(MutationKind::RentBook),
            "return_book" => Some(MutationKind::ReturnBook),
            "add_favorite" => Some(MutationKind::AddFavorite),
            "remove_favorite" => Some(MutationKind::RemoveFavorite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub seq: i64,
    pub kind: String,
    pub arguments: String,
    pub enqueued_at: i64,
}

/// 台帳に積まれた未送信ミューテーション。適用成功まで書き換えられない。
#[derive(Debug, Clone)]
pub struct QueuedMutation {
    pub seq: i64,
    pub kind: MutationKind,
    pub arguments: serde_json::Value,
    pub enqueued_at: i64,
}

impl QueuedMutation {
    pub fn arguments_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::from_value(self.arguments.clone())?;
        Ok(value)
    }
}

impl TryFrom<LedgerRow> for QueuedMutation {
    type Error = ClientError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let kind = MutationKind::parse(&row.kind)
            .ok_or_else(|| ClientError::UnknownMutationKind(row.kind.clone()))?;
        let arguments = serde_json::from_str(&row.arguments)?;
        Ok(Self {
            seq: row.seq,
            kind,
            arguments,
            enqueued_at: row.enqueued_at,
        })
    }
}

// 各ミューテーションの引数。IDとタイムスタンプはクライアント側で生成する。

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentBookArgs {
    pub rental_id: String,
    pub book_id: String,
    pub rented_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

impl RentBookArgs {
    pub fn new(book_id: &str) -> Self {
        let rented_at = Utc::now();
        Self {
            rental_id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            rented_at,
            due_date: rented_at + Duration::days(RENTAL_PERIOD_DAYS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnBookArgs {
    pub rental_id: String,
    pub returned_at: DateTime<Utc>,
}

impl ReturnBookArgs {
    pub fn new(rental_id: &str) -> Self {
        Self {
            rental_id: rental_id.to_string(),
            returned_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFavoriteArgs {
    pub favorite_id: String,
    pub book_id: String,
    pub created_at: DateTime<Utc>,
}

impl AddFavoriteArgs {
    pub fn new(book_id: &str) -> Self {
        Self {
            favorite_id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFavoriteArgs {
    pub favorite_id: String,
}
