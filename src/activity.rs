//! Activity log sink.
//!
//! A fire-and-forget write seam: the batch runner and the API record what
//! happened through [`ActivitySink`], and no sink implementation is allowed
//! to surface an error back into the core. The default sink writes to the
//! activity_log table, falling back to a tracing event when the write fails.

use pixelforge_db::pool::DbPool;
use pixelforge_db::queries::activity;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Severity of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One record headed for the activity log.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub source_ref: Option<String>,
    pub action: String,
    pub status: LogStatus,
    pub message: Option<String>,
    pub elapsed_ms: Option<i64>,
    pub memory_bytes: Option<i64>,
}

impl ActivityRecord {
    pub fn new(action: &str, status: LogStatus) -> Self {
        Self {
            source_ref: None,
            action: action.to_string(),
            status,
            message: None,
            elapsed_ms: None,
            memory_bytes: None,
        }
    }

    pub fn source_ref(mut self, source_ref: &str) -> Self {
        self.source_ref = Some(source_ref.to_string());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn elapsed_ms(mut self, elapsed_ms: i64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn memory_bytes(mut self, memory_bytes: Option<i64>) -> Self {
        self.memory_bytes = memory_bytes;
        self
    }
}

/// Write sink for activity records. Must never fail back into the caller.
pub trait ActivitySink: Send + Sync {
    fn log(&self, record: ActivityRecord);
}

/// Sink writing to the activity_log table.
pub struct DbActivitySink {
    pool: DbPool,
}

impl DbActivitySink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ActivitySink for DbActivitySink {
    fn log(&self, record: ActivityRecord) {
        let result = self.pool.get().map_err(|e| e.to_string()).and_then(|conn| {
            activity::insert(
                &conn,
                record.source_ref.as_deref(),
                &record.action,
                &record.status.to_string(),
                record.message.as_deref(),
                record.elapsed_ms,
                record.memory_bytes,
            )
            .map_err(|e| e.to_string())
        });

        if let Err(e) = result {
            // The sink is fire-and-forget; the record still lands somewhere.
            debug!("activity log write failed ({}): {:?}", e, record);
        }
    }
}

/// Sink emitting tracing events only. Used when activity logging is
/// disabled in configuration.
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn log(&self, record: ActivityRecord) {
        let source_ref = record.source_ref.as_deref().unwrap_or("-");
        let message = record.message.as_deref().unwrap_or("");
        match record.status {
            LogStatus::Success | LogStatus::Info => {
                info!("{} {}: {}", record.action, source_ref, message)
            }
            LogStatus::Warning => warn!("{} {}: {}", record.action, source_ref, message),
            LogStatus::Error => error!("{} {}: {}", record.action, source_ref, message),
        }
    }
}
