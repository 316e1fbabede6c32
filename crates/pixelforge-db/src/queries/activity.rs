//! Activity log query operations.
//!
//! The activity log is a write sink for the conversion engine plus a small
//! read API for operators. Writers go through the `ActivitySink` trait in the
//! root crate, which swallows errors; these functions just do the SQL.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use pixelforge_common::{Error, Result};

use crate::models::ActivityEntry;

/// Insert one activity row.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    source_ref: Option<&str>,
    action: &str,
    status: &str,
    message: Option<&str>,
    elapsed_ms: Option<i64>,
    memory_bytes: Option<i64>,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO activity_log (source_ref, action, status, message, elapsed_ms, memory_bytes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![source_ref, action, status, message, elapsed_ms, memory_bytes, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(conn.last_insert_rowid())
}

/// List the most recent activity entries, newest first.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<ActivityEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_ref, action, status, message, elapsed_ms, memory_bytes, created_at
             FROM activity_log
             ORDER BY id DESC
             LIMIT ?1",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let entries = stmt
        .query_map(params![limit as i64], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                source_ref: row.get(1)?,
                action: row.get(2)?,
                status: row.get(3)?,
                message: row.get(4)?,
                elapsed_ms: row.get(5)?,
                memory_bytes: row.get(6)?,
                created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(entries)
}

/// Delete entries older than the retention window.
pub fn prune(conn: &Connection, older_than_days: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM activity_log WHERE created_at < datetime('now', ?1 || ' days')",
        params![format!("-{older_than_days}")],
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn test_insert_and_recent() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        insert(&conn, Some("a.jpg"), "convert", "success", None, Some(812), None).unwrap();
        insert(
            &conn,
            Some("b.jpg"),
            "convert",
            "error",
            Some("cwebp exited with status 1"),
            None,
            None,
        )
        .unwrap();

        let entries = recent(&conn, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_ref.as_deref(), Some("b.jpg"));
        assert_eq!(entries[0].status, "error");
        assert_eq!(entries[1].elapsed_ms, Some(812));
    }

    #[test]
    fn test_prune() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        insert(&conn, None, "batch", "info", Some("run started"), None, None).unwrap();
        conn.execute(
            "UPDATE activity_log SET created_at = '2020-01-01T00:00:00+00:00'",
            [],
        )
        .unwrap();

        assert_eq!(prune(&conn, 90).unwrap(), 1);
        assert!(recent(&conn, 10).unwrap().is_empty());
    }
}
