//! Content Inspector
//!
//! Reads the snapshot directly, bypassing the binary under test, to list its
//! tables and count rows in the watched entity tables. Any failure collapses
//! the whole inspection into [`Analysis::Failed`]; partial counts are never
//! reported.

use rusqlite::{Connection, OpenFlags};
use snapprobe_report::Analysis;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info};

/// Open `path` read-only. The file is never created if missing.
pub fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Number of tables in the schema; doubles as an "is this openable" check.
pub fn table_count(path: &Path) -> rusqlite::Result<u64> {
    let conn = open_read_only(path)?;
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Inspect the file at `path`.
///
/// `watch` holds `(entity, table)` pairs; an entity is counted only when its
/// table exists.
pub fn inspect(path: &Path, watch: &[(String, String)]) -> Analysis {
    info!("Analyzing database content...");
    match try_inspect(path, watch) {
        Ok((tables, counts)) => Analysis::Inspected { tables, counts },
        Err(e) => {
            error!("Database analysis failed: {}", e);
            Analysis::Failed {
                error: e.to_string(),
            }
        }
    }
}

fn try_inspect(
    path: &Path,
    watch: &[(String, String)],
) -> rusqlite::Result<(Vec<String>, BTreeMap<String, u64>)> {
    let conn = open_read_only(path)?;

    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut counts = BTreeMap::new();
    for (entity, table) in watch {
        if !tables.iter().any(|t| t == table) {
            continue;
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        let count = count.max(0) as u64;
        debug!("{} ({}): {} records", entity, table, count);
        counts.insert(entity.clone(), count);
    }

    Ok((tables, counts))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
