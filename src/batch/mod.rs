//! Batch runner: drains the queue within a time budget.
//!
//! One `run_batch` call is one worker invocation — an external scheduler
//! (cron, systemd timer, or the run endpoint) decides when it happens.
//! Parallelism comes from running several workers against the same queue
//! file; the atomic claim in the queue layer keeps them off each other's
//! items.

mod policy;
mod progress;

pub use policy::{BatchPolicy, FixedPolicy, MemoryAwarePolicy};
pub use progress::{ProcessingSnapshot, ProcessingStatus, ProgressTracker};

use pixelforge_db::models::QueueItem;
use pixelforge_db::pool::{get_conn, DbPool};
use pixelforge_db::queries::queue;
use pixelforge_common::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::activity::{ActivityRecord, ActivitySink, LogStatus};
use crate::config::{ConversionConfig, QueueConfig};
use crate::convert::{ConversionOptions, Converter, OptionOverrides};
use crate::resolver::SourceResolver;

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub errors: usize,
    /// Claimed items returned to Pending because the time budget ran out.
    pub deferred: usize,
    pub elapsed_seconds: f64,
}

/// Drains the queue, one synchronous item at a time.
pub struct BatchRunner {
    pool: DbPool,
    converter: Arc<Converter>,
    resolver: Arc<dyn SourceResolver>,
    sink: Arc<dyn ActivitySink>,
    progress: Arc<ProgressTracker>,
    policy: Arc<dyn BatchPolicy>,
    conversion: ConversionConfig,
    queue_cfg: QueueConfig,
    stop: Arc<AtomicBool>,
}

impl BatchRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        converter: Arc<Converter>,
        resolver: Arc<dyn SourceResolver>,
        sink: Arc<dyn ActivitySink>,
        progress: Arc<ProgressTracker>,
        policy: Arc<dyn BatchPolicy>,
        conversion: ConversionConfig,
        queue_cfg: QueueConfig,
    ) -> Self {
        Self {
            pool,
            converter,
            resolver,
            sink,
            progress,
            policy,
            conversion,
            queue_cfg,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared stop flag for external control.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Prevent future batch runs and clear the progress snapshot. Items
    /// already claimed by an in-flight run still finish; there is no
    /// mid-item cancellation.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.progress.clear();
    }

    /// Allow batch runs again after a stop.
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    /// Claim up to `batch_size` items (gated by the sizing policy) and
    /// process them until done or out of budget.
    pub fn run_batch(&self, batch_size: usize) -> Result<BatchReport> {
        let started = Instant::now();

        if self.stop.load(Ordering::Relaxed) {
            info!("batch run skipped: stop requested");
            return Ok(BatchReport::default());
        }

        let claim = self.policy.gate(batch_size);
        let items = {
            let conn = get_conn(&self.pool)?;
            queue::claim_batch(&conn, claim)?
        };

        let total = items.len();
        if total == 0 {
            return Ok(BatchReport {
                elapsed_seconds: started.elapsed().as_secs_f64(),
                ..BatchReport::default()
            });
        }

        info!("batch run claimed {} of up to {} items", total, claim);
        self.progress.update(ProcessingStatus::Running, 0, total);

        let budget = Duration::from_secs(self.queue_cfg.time_budget_secs);
        let delay = Duration::from_millis(self.queue_cfg.item_delay_ms);

        let mut report = BatchReport::default();

        for (idx, item) in items.iter().enumerate() {
            // The budget is only checked between items; a single oversized
            // image can overrun it.
            if started.elapsed() >= budget {
                report.deferred = self.defer(&items[idx..])?;
                break;
            }

            if self.process_item(item)? {
                report.processed += 1;
            } else {
                report.errors += 1;
            }
            self.progress
                .update(ProcessingStatus::Running, idx + 1, total);

            if idx + 1 < total && !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }

        self.progress.update(
            ProcessingStatus::Completed,
            report.processed + report.errors,
            total,
        );

        report.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            "batch run finished: {} processed, {} errors, {} deferred in {:.2}s",
            report.processed, report.errors, report.deferred, report.elapsed_seconds
        );
        Ok(report)
    }

    /// Convert one claimed item and record the outcome. Returns whether the
    /// item completed; queue/database trouble is the only hard error.
    fn process_item(&self, item: &QueueItem) -> Result<bool> {
        let item_started = Instant::now();

        let result = self.resolver.resolve(&item.source_ref).and_then(|path| {
            let overrides = OptionOverrides::from_json(item.options.as_deref());
            let options = ConversionOptions::merged(&self.conversion, &overrides);
            self.converter.convert(&path, &options)
        });

        let elapsed_ms = item_started.elapsed().as_millis() as i64;

        // Mark first and release the connection before logging; the sink may
        // need a connection of its own from the same pool.
        match result {
            Ok(result) => {
                {
                    let conn = get_conn(&self.pool)?;
                    queue::mark_completed(&conn, item.id)?;
                }
                self.sink.log(
                    ActivityRecord::new("convert", LogStatus::Success)
                        .source_ref(&item.source_ref)
                        .message(format!(
                            "{} variant(s), {} bytes saved",
                            result.variants.len(),
                            result.total_bytes_saved
                        ))
                        .elapsed_ms(elapsed_ms)
                        .memory_bytes(result.memory_delta_bytes),
                );
                Ok(true)
            }
            Err(e) => {
                let status = {
                    let conn = get_conn(&self.pool)?;
                    if e.is_retryable() {
                        queue::mark_failed(&conn, item.id, &e.to_string(), self.queue_cfg.retry_cap)?
                    } else {
                        queue::mark_failed_permanent(&conn, item.id, &e.to_string())?;
                        pixelforge_db::models::JobStatus::Failed
                    }
                };
                warn!(
                    "item {} ({}) failed -> {}: {}",
                    item.id, item.source_ref, status, e
                );
                self.sink.log(
                    ActivityRecord::new("convert", LogStatus::Error)
                        .source_ref(&item.source_ref)
                        .message(e.to_string())
                        .elapsed_ms(elapsed_ms),
                );
                Ok(false)
            }
        }
    }

    /// Return unprocessed claims to Pending when the budget runs out.
    fn defer(&self, remaining: &[QueueItem]) -> Result<usize> {
        {
            let conn = get_conn(&self.pool)?;
            for item in remaining {
                queue::release(&conn, item.id)?;
            }
        }
        warn!(
            "batch time budget exceeded; deferred {} item(s)",
            remaining.len()
        );
        self.sink.log(
            ActivityRecord::new("batch", LogStatus::Warning).message(format!(
                "Time budget exceeded, {} item(s) deferred",
                remaining.len()
            )),
        );
        Ok(remaining.len())
    }
}
