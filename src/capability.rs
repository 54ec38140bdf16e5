//! Host-side database access behind the capability boundary.
//!
//! Extension modules only ever see the single `run_query` operation (see
//! [`crate::context::Capability`]); the [`SqlClient`] trait is the host's
//! view of the same connection plus the catalog snapshot used by detection
//! entry points. The host never opens, pools, or closes connections itself;
//! callers own the connection and hand in a client per lifecycle call.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Database access supplied by the caller of the host.
pub trait SqlClient: Send + Sync {
    /// Execute a single SQL statement that returns no rows.
    ///
    /// This backs the guest-visible `run_query` capability. Failures are
    /// never caught on behalf of the guest; they propagate out of the
    /// entry-point invocation as execution errors.
    fn execute(&self, sql: &str) -> Result<()>;

    /// Snapshot of the database's script/object catalog.
    ///
    /// Host-only: the snapshot is marshaled into guest data for detection
    /// entry points, the operation itself is never exposed to guest code.
    fn script_catalog(&self) -> Result<CatalogSnapshot>;
}

/// One row of the script/object catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRow {
    /// Object name, original case preserved
    pub name: String,
    /// Object kind as reported by the catalog (e.g. `table`, `view`)
    pub kind: String,
    /// Creation text, empty when the catalog does not retain it
    pub text: String,
}

/// Point-in-time view of all catalog objects.
///
/// Rows keep catalog order (creation order for the bundled client).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub scripts: Vec<ScriptRow>,
}

/// [`SqlClient`] backed by a rusqlite connection.
///
/// The connection is wrapped in a mutex because invocations against one
/// module are already serialized by the host, but different modules may
/// share a client concurrently.
pub struct SqliteClient {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteClient {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open an in-memory database. Mostly useful for tests and examples.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| HostError::Execution(format!("failed to open database: {e}")))?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| HostError::Execution("database connection lock poisoned".into()))
    }
}

impl SqlClient for SqliteClient {
    fn execute(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| HostError::Execution(format!("query failed: {e}")))
    }

    fn script_catalog(&self) -> Result<CatalogSnapshot> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name, type, COALESCE(sql, '') FROM sqlite_master")
            .map_err(|e| HostError::Execution(format!("failed to read catalog: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ScriptRow {
                    name: row.get(0)?,
                    kind: row.get(1)?,
                    text: row.get(2)?,
                })
            })
            .map_err(|e| HostError::Execution(format!("failed to read catalog: {e}")))?;
        let mut scripts = Vec::new();
        for row in rows {
            scripts.push(row.map_err(|e| HostError::Execution(format!("failed to read catalog: {e}")))?);
        }
        Ok(CatalogSnapshot { scripts })
    }
}
