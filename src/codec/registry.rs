//! Backend capability registry.
//!
//! Probes both backends, caches the outcome with a bounded TTL, and selects
//! the best encoder for the pipeline. Detection never errors: a backend
//! whose probes all fail is recorded as unavailable and selection simply
//! skips it.

use parking_lot::RwLock;
use pixelforge_common::TargetFormat;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{BackendKind, CapabilityTable, Encoder, NativeBackend, ToolBackend};

/// Pluggable selection override: return `Some(kind)` to force a backend,
/// `None` to defer to configuration and ranking.
pub type SelectionOverride = Arc<dyn Fn(&CapabilityTable) -> Option<BackendKind> + Send + Sync>;

/// The backend chosen for a conversion call.
#[derive(Clone)]
pub struct Selection {
    pub kind: BackendKind,
    pub formats: BTreeSet<TargetFormat>,
    pub encoder: Arc<dyn Encoder>,
}

struct Detected {
    table: CapabilityTable,
    encoders: Vec<(BackendKind, Arc<dyn Encoder>)>,
    at: Instant,
}

/// Probes, caches, and ranks codec backends.
pub struct CapabilityRegistry {
    ttl: Duration,
    forced: Option<BackendKind>,
    override_fn: Option<SelectionOverride>,
    cache: RwLock<Option<Detected>>,
}

impl CapabilityRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            forced: None,
            override_fn: None,
            cache: RwLock::new(None),
        }
    }

    /// Force a specific backend (from configuration).
    pub fn with_forced(mut self, forced: Option<BackendKind>) -> Self {
        self.forced = forced;
        self
    }

    /// Install a selection override hook.
    pub fn with_override(mut self, f: SelectionOverride) -> Self {
        self.override_fn = Some(f);
        self
    }

    /// Current capability table, re-probing if the cache is cold or expired.
    pub fn detect(&self) -> CapabilityTable {
        self.snapshot().0
    }

    /// Drop the cached detection; the next query re-probes.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
        debug!("capability cache invalidated");
    }

    /// Select the best available backend.
    ///
    /// Preference: the override hook, then the configured forced backend,
    /// then the ranked table (richer format set first, tools over native on
    /// ties). Returns `None` when nothing usable exists — the caller maps
    /// that to `Error::BackendUnavailable`.
    pub fn select_best(&self) -> Option<Selection> {
        let (table, encoders) = self.snapshot();

        let chosen = self
            .override_fn
            .as_ref()
            .and_then(|f| f(&table))
            .or(self.forced)
            .or_else(|| table.ranked().first().map(|e| e.kind));

        let kind = chosen?;
        let entry = table
            .entries
            .iter()
            .find(|e| e.kind == kind && e.available && !e.supported_formats.is_empty())?;
        let encoder = encoders
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, enc)| Arc::clone(enc))?;

        Some(Selection {
            kind,
            formats: entry.supported_formats.clone(),
            encoder,
        })
    }

    fn snapshot(&self) -> (CapabilityTable, Vec<(BackendKind, Arc<dyn Encoder>)>) {
        {
            let cache = self.cache.read();
            if let Some(detected) = cache.as_ref() {
                if detected.at.elapsed() < self.ttl {
                    return (detected.table.clone(), detected.encoders.clone());
                }
            }
        }

        let detected = detect_now();
        let result = (detected.table.clone(), detected.encoders.clone());
        *self.cache.write() = Some(detected);
        result
    }
}

fn detect_now() -> Detected {
    let mut entries = Vec::new();
    let mut encoders: Vec<(BackendKind, Arc<dyn Encoder>)> = Vec::new();

    let (tool_entry, tool_backend) = ToolBackend::detect();
    if let Some(backend) = tool_backend {
        encoders.push((BackendKind::Tools, Arc::new(backend)));
    }
    entries.push(tool_entry);

    let (native_entry, native_backend) = NativeBackend::detect();
    encoders.push((BackendKind::Native, Arc::new(native_backend)));
    entries.push(native_entry);

    for entry in &entries {
        info!(
            "backend {}: available={} formats={:?} method={:?}",
            entry.name, entry.available, entry.supported_formats, entry.detection_method
        );
    }

    Detected {
        table: CapabilityTable { entries },
        encoders,
        at: Instant::now(),
    }
}
