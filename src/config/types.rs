use pixelforge_common::TargetFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8086
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Managed storage root. Every source ref resolves under this directory
    /// and every path served or converted must stay confined to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Queue database path. Defaults to `pixelforge.db` inside the root.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from("./media")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            db_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Target formats to derive.
    #[serde(default = "default_formats")]
    pub formats: Vec<TargetFormat>,

    #[serde(default)]
    pub quality: QualityConfig,

    /// Encoder effort, 0 (fast) to 9 (smallest output).
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,

    #[serde(default)]
    pub resize: ResizeConfig,

    /// Drop EXIF/XMP metadata from variants.
    #[serde(default = "default_true")]
    pub strip_metadata: bool,

    /// Request progressive/interlaced encoding where the backend supports it.
    #[serde(default = "default_true")]
    pub progressive: bool,

    /// Force a specific backend ("tools" or "native") instead of ranked
    /// selection.
    #[serde(default)]
    pub backend: Option<String>,
}

fn default_formats() -> Vec<TargetFormat> {
    vec![TargetFormat::Avif, TargetFormat::Webp]
}
fn default_compression_level() -> u8 {
    6
}
fn default_true() -> bool {
    true
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            quality: QualityConfig::default(),
            compression_level: default_compression_level(),
            resize: ResizeConfig::default(),
            strip_metadata: true,
            progressive: true,
            backend: None,
        }
    }
}

/// Per-format encode quality, 1-100.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    #[serde(default = "default_avif_quality")]
    pub avif: u8,

    #[serde(default = "default_webp_quality")]
    pub webp: u8,
}

fn default_avif_quality() -> u8 {
    55
}
fn default_webp_quality() -> u8 {
    80
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            avif: default_avif_quality(),
            webp: default_webp_quality(),
        }
    }
}

impl QualityConfig {
    pub fn for_format(&self, format: TargetFormat) -> u8 {
        match format {
            TargetFormat::Avif => self.avif,
            TargetFormat::Webp => self.webp,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResizeConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_dimension")]
    pub max_width: u32,

    #[serde(default = "default_max_dimension")]
    pub max_height: u32,
}

fn default_max_dimension() -> u32 {
    2560
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Failed attempts before an item becomes terminally Failed.
    #[serde(default = "default_retry_cap")]
    pub retry_cap: i64,

    /// Items claimed per batch run (upper bound; the sizing policy may
    /// lower it).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Wall-clock budget for one batch run, checked between items.
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: u64,

    /// Pause between items to throttle burst load.
    #[serde(default = "default_item_delay")]
    pub item_delay_ms: u64,

    /// Completed rows older than this are eligible for cleanup.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: i64,

    /// Per-image working-memory estimate used by the adaptive sizing policy.
    #[serde(default = "default_memory_per_image")]
    pub memory_per_image_mb: u64,
}

fn default_retry_cap() -> i64 {
    3
}
fn default_batch_size() -> usize {
    10
}
fn default_time_budget() -> u64 {
    50
}
fn default_item_delay() -> u64 {
    100
}
fn default_cleanup_days() -> i64 {
    30
}
fn default_memory_per_image() -> u64 {
    128
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_cap: default_retry_cap(),
            batch_size: default_batch_size(),
            time_budget_secs: default_time_budget(),
            item_delay_ms: default_item_delay(),
            cleanup_days: default_cleanup_days(),
            memory_per_image_mb: default_memory_per_image(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Convert on demand when a requested variant is missing.
    #[serde(default = "default_true")]
    pub fallback_convert: bool,

    /// Cache-Control max-age for served responses.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    604_800
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            fallback_convert: true,
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// How long a backend capability table stays cached.
    #[serde(default = "default_detection_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_detection_ttl() -> u64 {
    3600
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_detection_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Upper bound on decoded dimensions; anything larger is rejected
    /// before decode (decompression-bomb guard).
    #[serde(default = "default_max_source_dimension")]
    pub max_width: u32,

    #[serde(default = "default_max_source_dimension")]
    pub max_height: u32,
}

fn default_max_source_dimension() -> u32 {
    12_000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_source_dimension(),
            max_height: default_max_source_dimension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Write conversion activity to the activity log table.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Activity rows older than this are pruned.
    #[serde(default = "default_log_retention")]
    pub retention_days: i64,
}

fn default_log_retention() -> i64 {
    90
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_log_retention(),
        }
    }
}
