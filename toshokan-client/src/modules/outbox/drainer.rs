use super::ledger::SyncLedger;
use super::models::QueuedMutation;
use crate::shared::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 台帳のレコードをリモートへ適用するポート
#[async_trait]
pub trait MutationApplier: Send + Sync {
    async fn apply(&self, mutation: &QueuedMutation) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainHalt {
    Failed { seq: i64, message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub remaining: usize,
    pub halt: Option<DrainHalt>,
}

/// 接続回復時に台帳を順番どおりに流し込むドレイナー。
/// 同時実行は常に1つ。後続レコードが先行レコードの生成したIDを
/// 参照し得るため、並列適用は行わない。
pub struct LedgerDrainer {
    ledger: Arc<SyncLedger>,
    gate: Mutex<()>,
    shutdown: CancellationToken,
}

impl LedgerDrainer {
    pub fn new(ledger: Arc<SyncLedger>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            gate: Mutex::new(()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// アプリ終了時に呼ぶ。実行中のドレインは未適用分を残して停止する。
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// 実行中のドレインがある場合は何もせず None を返す（接続フラップ対策）。
    pub async fn drain(&self, applier: &dyn MutationApplier) -> Result<Option<DrainReport>> {
        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("ledger drain already in progress, skipping trigger");
                return Ok(None);
            }
        };

        let pending = self.ledger.pending().await?;
        let total = pending.len();
        let mut applied = 0usize;
        let mut halt = None;

        for mutation in &pending {
            if self.shutdown.is_cancelled() {
                halt = Some(DrainHalt::Cancelled);
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    halt = Some(DrainHalt::Cancelled);
                    break;
                }
                outcome = applier.apply(mutation) => outcome,
            };

            match outcome {
                Ok(()) => {
                    self.ledger.remove(mutation.seq).await?;
                    applied += 1;
                }
                Err(err) => {
                    // 失敗レコードで停止。残りは次の接続回復時に再試行する
                    warn!(
                        seq = mutation.seq,
                        kind = mutation.kind.as_str(),
                        error = %err,
                        "ledger apply failed, halting drain"
                    );
                    halt = Some(DrainHalt::Failed {
                        seq: mutation.seq,
                        message: err.to_string(),
                    });
                    break;
                }
            }
        }

        info!(
            applied,
            remaining = total - applied,
            halted = halt.is_some(),
            "ledger drain finished"
        );

        Ok(Some(DrainReport {
            applied,
            remaining: total - applied,
            halt,
        }))
    }

    /// 接続回復イベントでドレインを起動する常駐タスク。
    /// タイマーでは起動しない。
    pub fn spawn_on_connectivity(
        self: &Arc<Self>,
        applier: Arc<dyn MutationApplier>,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        let drainer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = drainer.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(ConnectionEvent::Online) => {
                            if let Err(err) = drainer.drain(applier.as_ref()).await {
                                error!(error = %err, "ledger drain failed");
                            }
                        }
                        Ok(ConnectionEvent::Offline) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "connectivity events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}
