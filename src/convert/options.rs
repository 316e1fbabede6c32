//! Conversion options: config defaults merged with caller overrides.

use pixelforge_common::TargetFormat;
use serde::{Deserialize, Serialize};

use crate::config::ConversionConfig;

/// Immutable options for one conversion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub formats: Vec<TargetFormat>,
    pub avif_quality: u8,
    pub webp_quality: u8,
    pub compression_level: u8,
    pub resize_enabled: bool,
    pub max_width: u32,
    pub max_height: u32,
    pub strip_metadata: bool,
    pub progressive: bool,
}

impl ConversionOptions {
    /// Options taken straight from configuration defaults.
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            formats: config.formats.clone(),
            avif_quality: config.quality.avif,
            webp_quality: config.quality.webp,
            compression_level: config.compression_level,
            resize_enabled: config.resize.enabled,
            max_width: config.resize.max_width,
            max_height: config.resize.max_height,
            strip_metadata: config.strip_metadata,
            progressive: config.progressive,
        }
    }

    /// Config defaults with caller overrides applied on top.
    pub fn merged(config: &ConversionConfig, overrides: &OptionOverrides) -> Self {
        let mut options = Self::from_config(config);
        if let Some(formats) = &overrides.formats {
            options.formats = formats.clone();
        }
        if let Some(q) = overrides.avif_quality {
            options.avif_quality = q;
        }
        if let Some(q) = overrides.webp_quality {
            options.webp_quality = q;
        }
        if let Some(level) = overrides.compression_level {
            options.compression_level = level;
        }
        if let Some(enabled) = overrides.resize {
            options.resize_enabled = enabled;
        }
        if let Some(w) = overrides.max_width {
            options.max_width = w;
        }
        if let Some(h) = overrides.max_height {
            options.max_height = h;
        }
        if let Some(strip) = overrides.strip_metadata {
            options.strip_metadata = strip;
        }
        options
    }

    /// Restrict to a single target format, for lazy delivery conversion.
    pub fn for_single_format(&self, format: TargetFormat) -> Self {
        let mut options = self.clone();
        options.formats = vec![format];
        options
    }

    pub fn quality_for(&self, format: TargetFormat) -> u8 {
        match format {
            TargetFormat::Avif => self.avif_quality,
            TargetFormat::Webp => self.webp_quality,
        }
    }
}

/// Per-call (or per-queue-item) option overrides. Serialized as JSON in the
/// queue's `options` column; absent fields fall back to config defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionOverrides {
    pub formats: Option<Vec<TargetFormat>>,
    pub avif_quality: Option<u8>,
    pub webp_quality: Option<u8>,
    pub compression_level: Option<u8>,
    pub resize: Option<bool>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub strip_metadata: Option<bool>,
}

impl OptionOverrides {
    /// Parse overrides from the queue's JSON column. `None` or unparsable
    /// JSON fall back to empty overrides; a bad row must not poison the
    /// batch.
    pub fn from_json(json: Option<&str>) -> Self {
        match json {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unparsable item options: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }
}
