//! Codec backends and capability discovery.
//!
//! Two backends are modeled: external command-line encoders (`cwebp`,
//! `avifenc`, with ImageMagick as a generic fallback) and the in-process
//! `image` crate. The registry probes both, caches what it finds, and picks
//! the richest one for the conversion pipeline.

mod native;
mod registry;
mod tools;

pub use native::NativeBackend;
pub use registry::{CapabilityRegistry, Selection, SelectionOverride};
pub use tools::ToolBackend;

use image::DynamicImage;
use pixelforge_common::{Result, TargetFormat};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which backend an encoder belongs to. Fixed preference order: tools
/// outrank native on ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// External command-line encoders.
    Tools,
    /// In-process `image` crate encoder.
    Native,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tools => write!(f, "tools"),
            Self::Native => write!(f, "native"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = pixelforge_common::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tools" => Ok(Self::Tools),
            "native" => Ok(Self::Native),
            other => Err(pixelforge_common::Error::invalid_input(format!(
                "Unknown backend: {other}"
            ))),
        }
    }
}

/// How a backend's capability was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// The backend reported its own capabilities.
    Direct,
    /// Capability inferred from a trial 1x1 encode.
    Probe,
    /// Capability inferred from the generic host image tool.
    HostFallback,
}

/// One discovered backend and what it can do.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityEntry {
    pub kind: BackendKind,
    pub name: String,
    pub version: Option<String>,
    pub supported_formats: BTreeSet<TargetFormat>,
    pub detection_method: DetectionMethod,
    pub available: bool,
}

/// Snapshot of everything detection found. Immutable once returned;
/// callers re-query the registry for fresh state.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityTable {
    pub entries: Vec<CapabilityEntry>,
}

impl CapabilityTable {
    /// Available entries only, richest format set first, ties broken by the
    /// fixed backend order. Unavailable entries never appear here.
    pub fn ranked(&self) -> Vec<&CapabilityEntry> {
        let mut ranked: Vec<&CapabilityEntry> = self
            .entries
            .iter()
            .filter(|e| e.available && !e.supported_formats.is_empty())
            .collect();
        ranked.sort_by(|a, b| {
            b.supported_formats
                .len()
                .cmp(&a.supported_formats.len())
                .then_with(|| a.kind.cmp(&b.kind))
        });
        ranked
    }
}

/// Encode parameters for a single variant.
#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub format: TargetFormat,
    /// 1-100.
    pub quality: u8,
    /// 0 (fast) to 9 (smallest output).
    pub compression_level: u8,
    pub strip_metadata: bool,
}

/// A codec backend able to write encoded variants to disk.
pub trait Encoder: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Encode `image` to `dest` in the requested format.
    ///
    /// `dest` must not be left behind on failure; implementations clean up
    /// partial output.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams, dest: &Path) -> Result<()>;
}
