//! SQLite-backed session implementation
//!
//! This module contains the engine handle layer and everything built on it:
//! prepared statements, the session, result cursors, the transaction guard
//! and the async queue.

mod binding;
mod busy;
pub mod cursor;
pub(crate) mod engine;
pub mod queue;
pub mod session;
pub mod statement;
pub mod transaction;

pub use cursor::{CursorId, ResultCursor};
pub use engine::{ColumnType, InterruptHandle, StepResult};
pub use queue::{SessionQueue, DEFAULT_OPERATION_TIMEOUT};
pub use session::{Session, IN_MEMORY_PATH};
pub use statement::{PreparedStatement, StatementId, StatementInfo};
pub use transaction::TransactionGuard;
