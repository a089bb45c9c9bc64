use std::path::Path;

use rusqlite::{Connection, OpenFlags};

/// Read-only integrity probe for a pulled sqlite database. Transfer over
/// the bridge is not atomic, so a file that arrived whole is worth
/// confirming before anyone relies on it.
pub fn quick_check(path: &Path) -> Result<(), String> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|err| err.to_string())?;

    let verdict: String = connection
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|err| err.to_string())?;

    if verdict == "ok" {
        Ok(())
    } else {
        Err(verdict)
    }
}
