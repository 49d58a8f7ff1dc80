use super::models::{LedgerRow, MutationKind, QueuedMutation};
use crate::modules::database::DbPool;
use crate::shared::error::Result;
use chrono::Utc;
use serde::Serialize;

/// オフライン・失敗時のミューテーションを順序付きで永続化する台帳。
/// シーケンス番号はSQLiteのAUTOINCREMENTで単調増加する。
pub struct SyncLedger {
    pool: DbPool,
}

impl SyncLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // 戻り値が返った時点で永続化済み
    pub async fn enqueue<T: Serialize>(&self, kind: MutationKind, arguments: &T) -> Result<i64> {
        let payload = serde_json::to_string(arguments)?;
        let enqueued_at = Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO sync_ledger (kind, arguments, enqueued_at) VALUES (?1, ?2, ?3)",
        )
        .bind(kind.as_str())
        .bind(&payload)
        .bind(enqueued_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    // 積まれた順に返す
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>> {
        let rows: Vec<LedgerRow> =
            sqlx::query_as("SELECT * FROM sync_ledger ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(QueuedMutation::try_from).collect()
    }

    // 適用が成功したレコードだけを削除する
    pub async fn remove(&self, seq: i64) -> Result<()> {
        sqlx::query("DELETE FROM sync_ledger WHERE seq = ?1")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_ledger")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
