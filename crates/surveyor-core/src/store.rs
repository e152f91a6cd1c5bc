//! Durable table of inventory indices and their status.
//!
//! Every operation executes against a caller-supplied [`Session`], so the
//! transaction boundary always belongs to the caller. The store enforces row
//! existence (`NotFound`) and id uniqueness (`DuplicateId`); guarding against
//! a second terminal transition is the lifecycle manager's responsibility.

use crate::db::Session;
use crate::error::{Result, SurveyorError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an inventory index.
///
/// Starts `Running` and transitions exactly once to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    Running,
    Success,
    PartialSuccess,
    Failure,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Running => "RUNNING",
            IndexStatus::Success => "SUCCESS",
            IndexStatus::PartialSuccess => "PARTIAL_SUCCESS",
            IndexStatus::Failure => "FAILURE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(IndexStatus::Running),
            "SUCCESS" => Some(IndexStatus::Success),
            "PARTIAL_SUCCESS" => Some(IndexStatus::PartialSuccess),
            "FAILURE" => Some(IndexStatus::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IndexStatus::Running)
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One durable snapshot record for a single crawl/import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryIndex {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub status: IndexStatus,
    /// Populated only at the terminal transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
    /// Destination model the crawl result should populate; `None` means
    /// crawl only, no import.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_target: Option<String>,
}

/// CRUD primitives over the `inventory_indices` table.
pub struct IndexStore;

impl IndexStore {
    /// Create the schema if it does not exist.
    ///
    /// AUTOINCREMENT keeps ids monotonic: a deleted index's id is never
    /// reissued to a later one.
    pub fn init_schema(session: &Session<'_>) -> Result<()> {
        session.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_indices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                final_message TEXT,
                import_target TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_inventory_created
                ON inventory_indices(created_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new `RUNNING` row and return the stored record.
    ///
    /// The id is assigned by the datastore at insert time.
    pub fn insert(session: &Session<'_>, import_target: Option<&str>) -> Result<InventoryIndex> {
        let created_at = Utc::now();
        session
            .execute(
                r#"
                INSERT INTO inventory_indices (created_at, status, import_target)
                VALUES (?1, ?2, ?3)
                "#,
                params![
                    created_at.to_rfc3339(),
                    IndexStatus::Running.as_str(),
                    import_target
                ],
            )
            .map_err(map_constraint)?;

        let id = session.last_insert_rowid();
        Ok(InventoryIndex {
            id,
            created_at,
            status: IndexStatus::Running,
            final_message: None,
            import_target: import_target.map(|s| s.to_string()),
        })
    }

    /// Update the status (and message) of an existing row.
    ///
    /// Fails with `NotFound` if no row with that id exists.
    pub fn update_status(
        session: &Session<'_>,
        id: i64,
        status: IndexStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let updated = session.execute(
            "UPDATE inventory_indices SET status = ?1, final_message = ?2 WHERE id = ?3",
            params![status.as_str(), message, id],
        )?;

        if updated == 0 {
            return Err(SurveyorError::NotFound { id });
        }
        Ok(())
    }

    /// All index records, ordered by creation time ascending.
    pub fn list(session: &Session<'_>) -> Result<Vec<InventoryIndex>> {
        let mut stmt = session.prepare(
            r#"
            SELECT id, created_at, status, final_message, import_target
            FROM inventory_indices
            ORDER BY created_at ASC, id ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], row_to_index)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fetch one index by id, or `NotFound`.
    pub fn get(session: &Session<'_>, id: i64) -> Result<InventoryIndex> {
        session
            .query_row(
                r#"
                SELECT id, created_at, status, final_message, import_target
                FROM inventory_indices
                WHERE id = ?1
                "#,
                params![id],
                row_to_index,
            )
            .optional()?
            .ok_or(SurveyorError::NotFound { id })
    }

    /// Remove one index by id and return the removed record, or `NotFound`.
    /// Not reversible.
    pub fn delete(session: &Session<'_>, id: i64) -> Result<InventoryIndex> {
        let index = Self::get(session, id)?;
        session.execute("DELETE FROM inventory_indices WHERE id = ?1", params![id])?;
        Ok(index)
    }
}

fn row_to_index(row: &Row<'_>) -> rusqlite::Result<InventoryIndex> {
    let created_at_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(InventoryIndex {
        id: row.get(0)?,
        created_at,
        status: IndexStatus::from_str(&status_str).unwrap_or(IndexStatus::Failure),
        final_message: row.get(3)?,
        import_target: row.get(4)?,
    })
}

fn map_constraint(err: rusqlite::Error) -> SurveyorError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // Should not occur given datastore-assigned ids.
            SurveyorError::DuplicateId { id: -1 }
        }
        _ => err.into(),
    }
}
