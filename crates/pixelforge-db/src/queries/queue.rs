//! Conversion queue query operations.
//!
//! The queue is the single source of truth for conversion work. Two rules
//! shape every statement here:
//!
//! - At most one Pending/Processing row may exist per `source_ref`; the
//!   enqueue statement enforces this atomically, so repeated uploads of the
//!   same asset never create duplicate work.
//! - Claiming is a single conditional UPDATE that flips Pending rows to
//!   Processing and returns them. Two workers draining the same queue file
//!   can never claim the same item.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use pixelforge_common::{Error, Result};

use crate::models::{JobStatus, QueueItem, StatusCounts};

/// Outcome of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// A new queue item was inserted.
    Created(i64),
    /// A live (pending or processing) item for the same source already
    /// exists; its id is returned and nothing was inserted.
    Duplicate(i64),
}

impl Enqueue {
    /// The id of the new or existing queue item.
    pub fn id(&self) -> i64 {
        match self {
            Self::Created(id) | Self::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    Ok(QueueItem {
        id: row.get(0)?,
        source_ref: row.get(1)?,
        options: row.get(2)?,
        status: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(JobStatus::Pending),
        priority: row.get(4)?,
        attempts: row.get(5)?,
        error_message: row.get(6)?,
        created_at: parse_timestamp(&row.get::<_, String>(7)?),
        updated_at: parse_timestamp(&row.get::<_, String>(8)?),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const ITEM_COLUMNS: &str =
    "id, source_ref, options, status, priority, attempts, error_message, created_at, updated_at";

/// Enqueue a conversion job, deduplicating against live rows.
///
/// The insert and the dedup lookup are one statement, so concurrent
/// enqueuers of the same `source_ref` cannot both insert.
pub fn enqueue(
    conn: &Connection,
    source_ref: &str,
    options: Option<&str>,
    priority: i64,
) -> Result<Enqueue> {
    let now = Utc::now().to_rfc3339();

    let inserted = conn
        .query_row(
            "INSERT INTO queue_items (source_ref, options, status, priority, attempts, created_at, updated_at)
             SELECT ?1, ?2, 'pending', ?3, 0, ?4, ?4
             WHERE NOT EXISTS (
                 SELECT 1 FROM queue_items
                 WHERE source_ref = ?1 AND status IN ('pending', 'processing')
             )
             RETURNING id",
            params![source_ref, options, priority, now],
            |row| row.get::<_, i64>(0),
        );

    match inserted {
        Ok(id) => Ok(Enqueue::Created(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            let existing = conn
                .query_row(
                    "SELECT id FROM queue_items
                     WHERE source_ref = ?1 AND status IN ('pending', 'processing')
                     LIMIT 1",
                    params![source_ref],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(|e| Error::database(e.to_string()))?;
            Ok(Enqueue::Duplicate(existing))
        }
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Atomically claim up to `n` pending items, flipping them to Processing.
///
/// Order is `priority DESC, created_at ASC, id ASC`: oldest highest-priority
/// first, insertion order breaking timestamp ties. The flip and the pick are
/// one statement, which is the queue's lease: a row leaves Pending exactly
/// once no matter how many workers are draining.
pub fn claim_batch(conn: &Connection, n: usize) -> Result<Vec<QueueItem>> {
    let now = Utc::now().to_rfc3339();

    let mut stmt = conn
        .prepare(&format!(
            "UPDATE queue_items SET status = 'processing', updated_at = ?1
             WHERE id IN (
                 SELECT id FROM queue_items WHERE status = 'pending'
                 ORDER BY priority DESC, created_at ASC, id ASC
                 LIMIT ?2
             )
             RETURNING {ITEM_COLUMNS}"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let mut items = stmt
        .query_map(params![now, n as i64], item_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    // RETURNING order is unspecified; restore claim order for callers.
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    Ok(items)
}

/// Mark a processing item as completed.
pub fn mark_completed(conn: &Connection, id: i64) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let affected = conn
        .execute(
            "UPDATE queue_items SET status = 'completed', error_message = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'processing'",
            params![now, id],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found(format!("queue item {id}")));
    }

    Ok(())
}

/// Record a failed attempt on a processing item.
///
/// Increments `attempts` and reverts the item to Pending, unless the new
/// attempt count reaches `retry_cap`, in which case the item becomes Failed
/// terminally. Returns the resulting status.
pub fn mark_failed(
    conn: &Connection,
    id: i64,
    error_message: &str,
    retry_cap: i64,
) -> Result<JobStatus> {
    let now = Utc::now().to_rfc3339();
    let status: String = conn
        .query_row(
            "UPDATE queue_items SET
                 attempts = attempts + 1,
                 status = CASE WHEN attempts + 1 >= ?1 THEN 'failed' ELSE 'pending' END,
                 error_message = ?2,
                 updated_at = ?3
             WHERE id = ?4 AND status = 'processing'
             RETURNING status",
            params![retry_cap, error_message, now, id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("queue item {id}")),
            _ => Error::database(e.to_string()),
        })?;

    status
        .parse()
        .map_err(|e: String| Error::database(e))
}

/// Fail a processing item terminally, regardless of its attempt count.
///
/// Used for errors that will never succeed on retry (security rejections,
/// missing sources).
pub fn mark_failed_permanent(conn: &Connection, id: i64, error_message: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let affected = conn
        .execute(
            "UPDATE queue_items SET status = 'failed', attempts = attempts + 1,
                 error_message = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'processing'",
            params![error_message, now, id],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found(format!("queue item {id}")));
    }

    Ok(())
}

/// Return a claimed-but-unprocessed item to Pending without counting an
/// attempt. Used when a batch runs out of wall-clock budget.
pub fn release(conn: &Connection, id: i64) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let affected = conn
        .execute(
            "UPDATE queue_items SET status = 'pending', updated_at = ?1
             WHERE id = ?2 AND status = 'processing'",
            params![now, id],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found(format!("queue item {id}")));
    }

    Ok(())
}

/// Return any Processing rows to Pending.
///
/// Run at startup: a worker that crashed mid-batch leaves its claims behind,
/// and nothing else will ever touch them.
pub fn reset_orphaned(conn: &Connection) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE queue_items SET status = 'pending', updated_at = ?1
         WHERE status = 'processing'",
        params![now],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a queue item by id.
pub fn get_item(conn: &Connection, id: i64) -> Result<QueueItem> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?1"),
        params![id],
        item_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("queue item {id}")),
        _ => Error::database(e.to_string()),
    })
}

/// List queue items, optionally filtered by status, newest first.
pub fn list_items(
    conn: &Connection,
    status: Option<JobStatus>,
    limit: usize,
) -> Result<Vec<QueueItem>> {
    let (sql, filter) = match status {
        Some(s) => (
            format!(
                "SELECT {ITEM_COLUMNS} FROM queue_items WHERE status = ?1
                 ORDER BY updated_at DESC, id DESC LIMIT ?2"
            ),
            Some(s.to_string()),
        ),
        None => (
            format!(
                "SELECT {ITEM_COLUMNS} FROM queue_items
                 ORDER BY updated_at DESC, id DESC LIMIT ?1"
            ),
            None,
        ),
    };

    let mut stmt = conn.prepare(&sql).map_err(|e| Error::database(e.to_string()))?;

    let rows = match filter {
        Some(s) => stmt.query_map(params![s, limit as i64], item_from_row),
        None => stmt.query_map(params![limit as i64], item_from_row),
    }
    .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Aggregate counts per status.
pub fn status_counts(conn: &Connection) -> Result<StatusCounts> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM queue_items GROUP BY status")
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|e| Error::database(e.to_string()))?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, count) = row.map_err(|e| Error::database(e.to_string()))?;
        match status.as_str() {
            "pending" => counts.pending = count,
            "processing" => counts.processing = count,
            "completed" => counts.completed = count,
            "failed" => counts.failed = count,
            _ => {}
        }
        counts.total += count;
    }

    Ok(counts)
}

/// Delete Completed rows older than the retention window.
///
/// Failed rows are retained for operator inspection; use [`clear_failed`]
/// to drop them explicitly.
pub fn cleanup_completed(conn: &Connection, older_than_days: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM queue_items
         WHERE status = 'completed'
         AND updated_at < datetime('now', ?1 || ' days')",
        params![format!("-{older_than_days}")],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete all Failed rows.
pub fn clear_failed(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM queue_items WHERE status = 'failed'", [])
        .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{init_memory_pool, PooledConnection};

    fn setup() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        pool.get().unwrap()
    }

    #[test]
    fn test_enqueue_and_get() {
        let conn = setup();

        let outcome = enqueue(&conn, "2026/08/photo.jpg", None, 5).unwrap();
        assert!(matches!(outcome, Enqueue::Created(_)));

        let item = get_item(&conn, outcome.id()).unwrap();
        assert_eq!(item.source_ref, "2026/08/photo.jpg");
        assert_eq!(item.status, JobStatus::Pending);
        assert_eq!(item.priority, 5);
        assert_eq!(item.attempts, 0);
        assert!(item.updated_at >= item.created_at);
    }

    #[test]
    fn test_enqueue_dedup_on_live_rows() {
        let conn = setup();

        let first = enqueue(&conn, "a.jpg", None, 0).unwrap();
        let second = enqueue(&conn, "a.jpg", None, 0).unwrap();
        assert!(second.is_duplicate());
        assert_eq!(first.id(), second.id());

        // Still one row for that ref.
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM queue_items WHERE source_ref = 'a.jpg'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Dedup holds while the item is Processing too.
        let claimed = claim_batch(&conn, 1).unwrap();
        assert_eq!(claimed[0].id, first.id());
        let third = enqueue(&conn, "a.jpg", None, 0).unwrap();
        assert_eq!(third, Enqueue::Duplicate(first.id()));

        // Once terminal, a fresh enqueue creates a new row.
        mark_completed(&conn, first.id()).unwrap();
        let fourth = enqueue(&conn, "a.jpg", None, 0).unwrap();
        assert!(matches!(fourth, Enqueue::Created(_)));
        assert_ne!(fourth.id(), first.id());
    }

    #[test]
    fn test_claim_order_priority_then_fifo() {
        let conn = setup();

        let i1 = enqueue(&conn, "one.jpg", None, 5).unwrap().id();
        let i2 = enqueue(&conn, "two.jpg", None, 1).unwrap().id();
        let i3 = enqueue(&conn, "three.jpg", None, 5).unwrap().id();

        let claimed = claim_batch(&conn, 3).unwrap();
        let ids: Vec<i64> = claimed.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![i1, i3, i2]);
        assert!(claimed.iter().all(|i| i.status == JobStatus::Processing));
    }

    #[test]
    fn test_claim_batch_limits_and_drains() {
        let conn = setup();

        for n in 0..3 {
            enqueue(&conn, &format!("{n}.jpg"), None, 0).unwrap();
        }

        assert_eq!(claim_batch(&conn, 2).unwrap().len(), 2);
        assert_eq!(claim_batch(&conn, 2).unwrap().len(), 1);
        assert!(claim_batch(&conn, 2).unwrap().is_empty());
    }

    #[test]
    fn test_retry_cap() {
        let conn = setup();
        let cap = 3;

        let id = enqueue(&conn, "flaky.jpg", None, 0).unwrap().id();

        // cap - 1 failures leave the item Pending.
        for attempt in 1..cap {
            claim_batch(&conn, 1).unwrap();
            let status = mark_failed(&conn, id, "encoder crashed", cap).unwrap();
            assert_eq!(status, JobStatus::Pending);
            assert_eq!(get_item(&conn, id).unwrap().attempts, attempt);
        }

        // The cap-th failure is terminal.
        claim_batch(&conn, 1).unwrap();
        let status = mark_failed(&conn, id, "encoder crashed", cap).unwrap();
        assert_eq!(status, JobStatus::Failed);

        let item = get_item(&conn, id).unwrap();
        assert_eq!(item.attempts, cap);
        assert_eq!(item.error_message.as_deref(), Some("encoder crashed"));

        // A failed item never re-enters the queue.
        assert!(claim_batch(&conn, 1).unwrap().is_empty());
    }

    #[test]
    fn test_failure_then_success() {
        let conn = setup();
        let cap = 3;

        let id = enqueue(&conn, "recovers.jpg", None, 0).unwrap().id();

        for _ in 0..cap - 1 {
            claim_batch(&conn, 1).unwrap();
            mark_failed(&conn, id, "transient", cap).unwrap();
        }

        claim_batch(&conn, 1).unwrap();
        mark_completed(&conn, id).unwrap();

        let item = get_item(&conn, id).unwrap();
        assert_eq!(item.status, JobStatus::Completed);
        assert_eq!(item.attempts, cap - 1);
        assert!(item.error_message.is_none());
    }

    #[test]
    fn test_mark_failed_permanent() {
        let conn = setup();

        let id = enqueue(&conn, "corrupt.jpg", None, 0).unwrap().id();
        claim_batch(&conn, 1).unwrap();
        mark_failed_permanent(&conn, id, "MIME mismatch").unwrap();

        let item = get_item(&conn, id).unwrap();
        assert_eq!(item.status, JobStatus::Failed);
        assert_eq!(item.attempts, 1);
    }

    #[test]
    fn test_release_does_not_count_attempt() {
        let conn = setup();

        let id = enqueue(&conn, "deferred.jpg", None, 0).unwrap().id();
        claim_batch(&conn, 1).unwrap();
        release(&conn, id).unwrap();

        let item = get_item(&conn, id).unwrap();
        assert_eq!(item.status, JobStatus::Pending);
        assert_eq!(item.attempts, 0);
    }

    #[test]
    fn test_reset_orphaned() {
        let conn = setup();

        enqueue(&conn, "a.jpg", None, 0).unwrap();
        enqueue(&conn, "b.jpg", None, 0).unwrap();
        claim_batch(&conn, 2).unwrap();

        assert_eq!(reset_orphaned(&conn).unwrap(), 2);
        assert_eq!(status_counts(&conn).unwrap().pending, 2);
    }

    #[test]
    fn test_status_counts() {
        let conn = setup();

        let a = enqueue(&conn, "a.jpg", None, 0).unwrap().id();
        let b = enqueue(&conn, "b.jpg", None, 0).unwrap().id();
        enqueue(&conn, "c.jpg", None, 0).unwrap();

        claim_batch(&conn, 2).unwrap();
        mark_completed(&conn, a).unwrap();
        mark_failed_permanent(&conn, b, "gone").unwrap();

        let counts = status_counts(&conn).unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn test_cleanup_retains_failed() {
        let conn = setup();

        let a = enqueue(&conn, "old-done.jpg", None, 0).unwrap().id();
        let b = enqueue(&conn, "old-failed.jpg", None, 0).unwrap().id();
        claim_batch(&conn, 2).unwrap();
        mark_completed(&conn, a).unwrap();
        mark_failed_permanent(&conn, b, "broken").unwrap();

        // Backdate both terminal rows past the retention window.
        conn.execute(
            "UPDATE queue_items SET updated_at = '2020-01-01T00:00:00+00:00'",
            [],
        )
        .unwrap();

        let deleted = cleanup_completed(&conn, 30).unwrap();
        assert_eq!(deleted, 1);

        // The failed row survives until explicitly cleared.
        assert!(get_item(&conn, b).is_ok());
        assert_eq!(clear_failed(&conn).unwrap(), 1);
        assert!(get_item(&conn, b).is_err());
    }

    #[test]
    fn test_list_items_filter() {
        let conn = setup();

        let a = enqueue(&conn, "a.jpg", None, 0).unwrap().id();
        enqueue(&conn, "b.jpg", None, 0).unwrap();
        claim_batch(&conn, 1).unwrap();
        mark_completed(&conn, a).unwrap();

        assert_eq!(list_items(&conn, None, 50).unwrap().len(), 2);
        let done = list_items(&conn, Some(JobStatus::Completed), 50).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a);
    }
}
