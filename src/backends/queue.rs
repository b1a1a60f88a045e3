//! Serialized async access to a session
//!
//! [`SessionQueue`] is the external synchronization a [`Session`] needs when
//! several tasks share it. Each closure runs on tokio's blocking pool while
//! holding the session lock, so work is serialized instead of tripping the
//! in-flight check. Operations that overrun the queue's timeout are
//! interrupted and reported as [`DatabaseError::QueryTimeout`].

use super::engine::InterruptHandle;
use super::session::Session;
use crate::core::{DatabaseError, Result, SessionConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for queued operations (30 seconds)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// A session shared by async tasks
#[derive(Clone)]
pub struct SessionQueue {
    session: Arc<Mutex<Session>>,
    interrupt: InterruptHandle,
    timeout: Duration,
}

impl SessionQueue {
    /// Open `path` and wrap it in a queue
    pub fn open(path: impl Into<String>) -> Result<Self> {
        Self::open_with_config(path, SessionConfig::default())
    }

    pub fn open_with_config(path: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let session = Session::with_config(path, config);
        session.open()?;
        Ok(Self::from_session(session))
    }

    /// Wrap an existing session
    pub fn from_session(session: Session) -> Self {
        let interrupt = session.interrupt_handle();
        Self {
            session: Arc::new(Mutex::new(session)),
            interrupt,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Set the per-operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Interrupt whatever statement is currently running
    pub fn interrupt(&self) -> bool {
        self.interrupt.interrupt()
    }

    /// Run `f` against the session on the blocking pool
    ///
    /// On timeout, a closure still waiting for the session is skipped and
    /// one already running has its statement interrupted. A closure that
    /// finished just as the timer fired reports its own result.
    pub async fn in_database<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let phase = Arc::new(Mutex::new(Phase::Queued));
        let task_phase = Arc::clone(&phase);
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        // Offload blocking database work to the blocking thread pool with timeout
        let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
            let session = session.lock();
            {
                let mut phase = task_phase.lock();
                if *phase == Phase::Cancelled {
                    return Err(DatabaseError::query_timeout(timeout_ms));
                }
                *phase = Phase::Running;
            }
            let result = f(&session);
            // Marked before the session lock is released so a late timeout
            // cannot interrupt the next caller's statement
            *task_phase.lock() = Phase::Finished;
            result
        });

        let seen = tokio::select! {
            result = &mut task => return join_result(result),
            _ = tokio::time::sleep(self.timeout) => self.expire(&phase),
        };

        match seen {
            Phase::Queued => {
                task.abort();
                tracing::warn!(timeout_ms, "queued operation timed out before it started");
                Err(DatabaseError::query_timeout(timeout_ms))
            }
            Phase::Running => {
                tracing::warn!(timeout_ms, "queued operation timed out");
                Err(DatabaseError::query_timeout(timeout_ms))
            }
            Phase::Finished | Phase::Cancelled => join_result(task.await),
        }
    }

    /// Settle a timed-out task's phase, interrupting it if it is running
    fn expire(&self, phase: &Mutex<Phase>) -> Phase {
        let mut phase = phase.lock();
        let seen = *phase;
        match seen {
            Phase::Queued => *phase = Phase::Cancelled,
            // The phase lock keeps the task from finishing, so the
            // interrupt lands on its own statement
            Phase::Running => {
                self.interrupt.interrupt();
            }
            Phase::Finished | Phase::Cancelled => {}
        }
        seen
    }

    /// Run `f` inside an exclusive transaction
    ///
    /// Commits when `f` succeeds and rolls back when it fails.
    pub async fn in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.in_database(move |session| {
            session.begin_transaction()?;
            finish_transaction(session, f(session))
        })
        .await
    }

    /// Run `f` inside a deferred transaction
    pub async fn in_deferred_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.in_database(move |session| {
            session.begin_deferred_transaction()?;
            finish_transaction(session, f(session))
        })
        .await
    }

    /// Run `f` inside the savepoint `name`
    pub async fn in_savepoint<F, T>(&self, name: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        self.in_database(move |session| session.in_savepoint(&name, f))
            .await
    }

    /// Close the underlying session
    pub async fn close(&self) -> Result<()> {
        self.in_database(|session| session.close()).await
    }
}

/// Where a queued closure is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    Running,
    Finished,
    Cancelled,
}

fn join_result<T>(result: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
}

fn finish_transaction<T>(session: &Session, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback() {
                tracing::error!(error = %rollback_err, "rollback after failed transaction failed");
            }
            Err(err)
        }
    }
}
