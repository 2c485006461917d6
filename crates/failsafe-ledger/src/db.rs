//! Connection setup and transaction helpers shared by every store.

use rusqlite::Connection;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{LedgerError, LedgerResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a file-backed database, creating parent directories.
pub fn open(path: &Path) -> LedgerResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
    }
    let conn = Connection::open(path)?;
    init_connection(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> LedgerResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_connection(&conn)?;
    Ok(conn)
}

fn init_connection(conn: &Connection) -> LedgerResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // WAL is unavailable for in-memory databases; the pragma reports "memory".
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    Ok(())
}

/// Run `f` inside `BEGIN IMMEDIATE`, committing on `Ok` and rolling back on `Err`.
pub fn immediate<T, E>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = f(conn);
    match &result {
        Ok(_) => {
            if let Err(e) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e.into());
            }
        }
        Err(_) => {
            let _ = conn.execute_batch("ROLLBACK");
        }
    }
    result
}

pub(crate) fn columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}
