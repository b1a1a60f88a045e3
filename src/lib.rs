//! # Rust Database Session
//!
//! A session layer over embedded SQLite: connection lifecycle, a prepared
//! statement cache keyed by SQL text, forward-only result cursors, busy/locked
//! retry with randomized backoff, transactions and savepoints, and a dynamic
//! [`Value`] type for marshalling application data into statement parameters.
//!
//! ## Features
//!
//! - **Dynamic values**: a tagged [`Value`] holding scalars, strings, blobs,
//!   timestamps, lists and maps with deep-copy and structural equality
//! - **Statement cache**: identical SQL text reuses a free compiled statement;
//!   concurrent cursors over the same text get their own instances
//! - **Single statement in flight**: a second concurrent caller fails fast
//!   with [`DatabaseError::StatementInFlight`]
//! - **Busy retry**: lock contention is retried up to a configurable ceiling
//! - **Async queue**: [`SessionQueue`] serializes tokio tasks over one session
//! - **Encryption**: `set_key`/`re_key` with the `sqlcipher` feature
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! rust_database_session = "0.1"
//! ```
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use rust_database_session::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let session = Session::new("app.db");
//!     session.open()?;
//!
//!     session.execute_update("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//!     session.execute_update("INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])?;
//!
//!     let mut cursor = session.execute_query("SELECT * FROM users", &[])?;
//!     while cursor.next() {
//!         println!("User: {:?}", cursor.string_for_column("name"));
//!     }
//!
//!     session.close()
//! }
//! ```
//!
//! ### Working with Transactions
//!
//! ```rust,no_run
//! use rust_database_session::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let session = Session::in_memory();
//!     session.open()?;
//!     session.execute_update("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance REAL)", &[])?;
//!
//!     let tx = TransactionGuard::begin(&session)?;
//!     tx.execute_update("INSERT INTO accounts (balance) VALUES (?)", &[Value::Double(100.0)])?;
//!     tx.commit()
//! }
//! ```
//!
//! ### Sharing a Session Between Tasks
//!
//! ```rust,no_run
//! use rust_database_session::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let queue = SessionQueue::open("app.db")?;
//!     let count = queue
//!         .in_database(|s| s.long_for_query("SELECT count(*) FROM users", &[]))
//!         .await?;
//!     println!("{count:?} users");
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/              # Engine-independent types
//! │   ├── config.rs      # Session configuration
//! │   ├── error.rs       # Error types
//! │   ├── timestamp.rs   # Timestamp type
//! │   └── value.rs       # Dynamic value type
//! ├── backends/          # SQLite-backed implementation
//! │   ├── engine.rs      # Raw connection/statement handles
//! │   ├── statement.rs   # Prepared statements
//! │   ├── session.rs     # Session and statement cache
//! │   ├── cursor.rs      # Result cursors
//! │   ├── transaction.rs # Transaction guard
//! │   └── queue.rs       # Async session queue
//! └── lib.rs
//! ```

/// Core session-layer types
pub mod core;

/// SQLite-backed session implementation
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_database_session::prelude::*;
///
/// fn main() -> Result<()> {
///     let session = Session::in_memory();
///     session.open()?;
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::backends::{ResultCursor, Session, SessionQueue, TransactionGuard};
    pub use crate::core::{
        DatabaseError, Result, SessionConfig, Timestamp, TimestampBinding, Value, ValueKind,
    };
}

// Re-export at root level for convenience
pub use backends::{
    CursorId, InterruptHandle, PreparedStatement, ResultCursor, Session, SessionQueue,
    StatementId, StatementInfo, TransactionGuard,
};
pub use core::{
    DatabaseError, Result, SessionConfig, Timestamp, TimestampBinding, Value, ValueIntMap,
    ValueKind, ValueList, ValueMap,
};
pub use rusqlite::OpenFlags;
