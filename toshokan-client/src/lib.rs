// モジュール定義
pub mod modules;
pub mod shared;

pub use modules::database::Database;
pub use modules::outbox::{
    ConnectionEvent, DrainHalt, DrainReport, LedgerDrainer, MutationApplier, SyncLedger,
};
pub use shared::error::{ClientError, Result};
