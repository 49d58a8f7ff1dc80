pub mod drainer;
pub mod ledger;
pub mod models;


pub use drainer::{ConnectionEvent, DrainHalt, DrainReport, LedgerDrainer, MutationApplier};
pub use ledger::SyncLedger;
pub use models::{MutationKind, QueuedMutation};
