//! Transactional session layer over the shared SQLite engine.
//!
//! Every read or write runs inside a scoped [`Session`]: an explicitly begun
//! transaction that commits on normal exit and rolls back on any error raised
//! within the scope. The transaction boundary is never left to the driver's
//! auto-begin behavior, so nested and test-isolated work behaves
//! deterministically.

use crate::error::{Result, SurveyorError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Process-wide storage engine handle.
///
/// Holds the underlying connection behind a mutex; sessions are handed out
/// one at a time and never shared across threads. Cloning is cheap and all
/// clones reach the same connection.
#[derive(Clone)]
pub struct Engine {
    conn: Arc<Mutex<Connection>>,
}

/// A scoped unit of work bound to one open transaction.
///
/// Derefs to [`rusqlite::Connection`] so store operations can prepare and
/// execute statements directly against the transaction.
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl std::ops::Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

impl Engine {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SurveyorError::Connectivity {
                    message: format!("failed to create database directory: {}", e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SurveyorError::Connectivity {
            message: format!("failed to open database: {}", e),
        })?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests and ephemeral deployments.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SurveyorError::Connectivity {
            message: format!("failed to open in-memory database: {}", e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL keeps readers usable while a worker commits.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| SurveyorError::Connectivity {
                message: format!("failed to set pragmas: {}", e),
            })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside a scoped session.
    ///
    /// Issues an explicit `BEGIN IMMEDIATE`, commits when `f` returns `Ok`,
    /// and rolls back on every `Err` path. Exactly one transaction per
    /// session lifetime.
    pub fn with_session<T>(&self, f: impl FnOnce(&Session<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| SurveyorError::Connectivity {
            message: "database connection lock poisoned".to_string(),
        })?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| SurveyorError::Connectivity {
                message: format!("failed to begin transaction: {}", e),
            })?;

        let session = Session { tx };
        match f(&session) {
            Ok(value) => {
                let Session { tx } = session;
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                // Dropping the transaction rolls it back.
                drop(session);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_table(engine: &Engine) {
        engine
            .with_session(|s| {
                s.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", [])?;
                Ok(())
            })
            .unwrap();
    }

    fn count_rows(engine: &Engine) -> i64 {
        engine
            .with_session(|s| Ok(s.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_session_commits_on_ok() {
        let engine = Engine::in_memory().unwrap();
        create_table(&engine);

        engine
            .with_session(|s| {
                s.execute("INSERT INTO t (v) VALUES ('a')", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(count_rows(&engine), 1);
    }

    #[test]
    fn test_session_rolls_back_on_err() {
        let engine = Engine::in_memory().unwrap();
        create_table(&engine);

        let result: Result<()> = engine.with_session(|s| {
            s.execute("INSERT INTO t (v) VALUES ('a')", [])?;
            Err(SurveyorError::Other("abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&engine), 0);
    }

    #[test]
    fn test_session_rolls_back_on_sql_error() {
        let engine = Engine::in_memory().unwrap();
        create_table(&engine);

        let result: Result<()> = engine.with_session(|s| {
            s.execute("INSERT INTO t (v) VALUES ('a')", [])?;
            s.execute("INSERT INTO nonexistent (v) VALUES ('b')", [])?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(count_rows(&engine), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let engine = Engine::in_memory().unwrap();
        create_table(&engine);

        let clone = engine.clone();
        clone
            .with_session(|s| {
                s.execute("INSERT INTO t (v) VALUES ('a')", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(count_rows(&engine), 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("inventory.sqlite");
        let engine = Engine::open(&path).unwrap();
        create_table(&engine);
        assert!(path.exists());
    }
}
