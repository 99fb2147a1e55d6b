//! Aggregation store
//!
//! In-memory SQLite table of counts keyed by (project, branch, query).
//! Writes are upserts: a second write for the same key replaces the quantity
//! rather than adding to it.

use rusqlite::{params, Connection, Statement};
use serde::Serialize;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS results (
    project_id      TEXT    NOT NULL,
    project_name    TEXT    NOT NULL,
    branch          TEXT    NOT NULL,
    scan_id         TEXT    NOT NULL,
    query_name      TEXT    NOT NULL,
    severity        TEXT    NOT NULL,
    quantity        INTEGER NOT NULL,
    PRIMARY KEY (project_id, branch, query_name)
);
CREATE INDEX IF NOT EXISTS idx_results_severity ON results(severity);
";

const UPSERT: &str = "
INSERT INTO results
    (project_id, project_name, branch, scan_id, query_name, severity, quantity)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT (project_id, branch, query_name) DO UPDATE SET
    quantity = excluded.quantity,
    project_name = excluded.project_name,
    scan_id = excluded.scan_id,
    severity = excluded.severity
";

/// One persisted count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationRow {
    pub project_id: String,
    pub project_name: String,
    pub branch: String,
    pub scan_id: String,
    pub query_name: String,
    /// Always lowercase
    pub severity: String,
    pub quantity: u64,
}

/// Owned staging table for one run
pub struct AggregationStore {
    conn: Connection,
}

impl AggregationStore {
    /// Open a fresh, empty in-memory store
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert a row, or replace the quantity of the row with the same
    /// (project_id, branch, query_name)
    pub fn upsert(&mut self, row: &AggregationRow) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(UPSERT)?;
        execute_upsert(&mut stmt, row)
    }

    /// Upsert several rows in one transaction
    pub fn upsert_all(&mut self, rows: &[AggregationRow]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT)?;
            for row in rows {
                execute_upsert(&mut stmt, row)?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Distinct query names recorded under `severity`, ascending
    pub fn query_names(&self, severity: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT query_name FROM results
             WHERE severity = ?1
             ORDER BY query_name ASC",
        )?;
        let names = stmt
            .query_map(params![severity.to_lowercase()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// All rows under `severity`, ordered by project id then query name
    pub fn rows_for_severity(&self, severity: &str) -> Result<Vec<AggregationRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, project_name, branch, scan_id, query_name, severity, quantity
             FROM results
             WHERE severity = ?1
             ORDER BY project_id ASC, query_name ASC",
        )?;
        let rows = stmt
            .query_map(params![severity.to_lowercase()], |row| {
                Ok(AggregationRow {
                    project_id: row.get(0)?,
                    project_name: row.get(1)?,
                    branch: row.get(2)?,
                    scan_id: row.get(3)?,
                    query_name: row.get(4)?,
                    severity: row.get(5)?,
                    quantity: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total number of rows
    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn execute_upsert(stmt: &mut Statement<'_>, row: &AggregationRow) -> Result<(), StoreError> {
    stmt.execute(params![
        row.project_id,
        row.project_name,
        row.branch,
        row.scan_id,
        row.query_name,
        row.severity.to_lowercase(),
        row.quantity,
    ])?;
    Ok(())
}

/// Errors from the staging database
#[derive(Debug, thiserror::Error)]
#[error("aggregation store error: {0}")]
pub struct StoreError(#[from] rusqlite::Error);

#[cfg(test)]
mod tests {
    use super::*;

    fn row(project: &str, branch: &str, query: &str, severity: &str, quantity: u64) -> AggregationRow {
        AggregationRow {
            project_id: project.to_string(),
            project_name: format!("{}-name", project),
            branch: branch.to_string(),
            scan_id: format!("{}-scan", project),
            query_name: query.to_string(),
            severity: severity.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = AggregationStore::in_memory().unwrap();
        let entry = row("P1", "master", "SQLi", "high", 5);

        store.upsert(&entry).unwrap();
        store.upsert(&entry).unwrap();

        let rows = store.rows_for_severity("high").unwrap();
        assert_eq!(rows, vec![entry]);
    }

    #[test]
    fn test_upsert_replaces_quantity() {
        let mut store = AggregationStore::in_memory().unwrap();
        store.upsert(&row("P1", "master", "SQLi", "high", 5)).unwrap();
        store.upsert(&row("P1", "master", "SQLi", "high", 2)).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.rows_for_severity("high").unwrap()[0].quantity, 2);
    }

    #[test]
    fn test_key_includes_branch() {
        let mut store = AggregationStore::in_memory().unwrap();
        store.upsert(&row("P1", "master", "SQLi", "high", 5)).unwrap();
        store.upsert(&row("P1", "develop", "SQLi", "high", 1)).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_severity_stored_lowercase() {
        let mut store = AggregationStore::in_memory().unwrap();
        store.upsert(&row("P1", "master", "SQLi", "HIGH", 5)).unwrap();

        let rows = store.rows_for_severity("High").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, "high");
    }

    #[test]
    fn test_queries_and_rows_are_ordered() {
        let mut store = AggregationStore::in_memory().unwrap();
        store
            .upsert_all(&[
                row("P2", "master", "XSS", "high", 1),
                row("P1", "master", "XSS", "high", 3),
                row("P1", "master", "SQLi", "high", 5),
                row("P1", "master", "Weak_Hash", "low", 7),
            ])
            .unwrap();

        assert_eq!(store.query_names("high").unwrap(), vec!["SQLi", "XSS"]);
        let rows = store.rows_for_severity("high").unwrap();
        let keys: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.project_id.as_str(), r.query_name.as_str()))
            .collect();
        assert_eq!(keys, vec![("P1", "SQLi"), ("P1", "XSS"), ("P2", "XSS")]);
        assert!(store.query_names("medium").unwrap().is_empty());
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let store = AggregationStore::in_memory().unwrap();
        assert!(store.is_empty().unwrap());
    }
}
