mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config.
///
/// Environment overrides (`PIXELFORGE_*`) are applied last, so they win over
/// both the file and any CLI-set values already merged by the caller.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./pixelforge.toml",
        "~/.config/pixelforge/config.toml",
        "/etc/pixelforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Apply `PIXELFORGE_*` environment overrides onto a loaded config.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(host) = std::env::var("PIXELFORGE_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("PIXELFORGE_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!("Ignoring invalid PIXELFORGE_PORT: {}", port),
        }
    }
    if let Ok(root) = std::env::var("PIXELFORGE_STORAGE_ROOT") {
        config.storage.root = root.into();
    }
    if let Ok(db) = std::env::var("PIXELFORGE_DB_PATH") {
        config.storage.db_path = Some(db.into());
    }
    if let Ok(cap) = std::env::var("PIXELFORGE_RETRY_CAP") {
        match cap.parse() {
            Ok(cap) => config.queue.retry_cap = cap,
            Err(_) => tracing::warn!("Ignoring invalid PIXELFORGE_RETRY_CAP: {}", cap),
        }
    }
    if let Ok(size) = std::env::var("PIXELFORGE_BATCH_SIZE") {
        match size.parse() {
            Ok(size) => config.queue.batch_size = size,
            Err(_) => tracing::warn!("Ignoring invalid PIXELFORGE_BATCH_SIZE: {}", size),
        }
    }
    if let Ok(backend) = std::env::var("PIXELFORGE_BACKEND") {
        config.conversion.backend = Some(backend);
    }
}

/// Validate configuration.
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    for (name, q) in [
        ("avif", config.conversion.quality.avif),
        ("webp", config.conversion.quality.webp),
    ] {
        if !(1..=100).contains(&q) {
            anyhow::bail!("Quality for {} must be 1-100, got {}", name, q);
        }
    }

    if config.conversion.compression_level > 9 {
        anyhow::bail!(
            "Compression level must be 0-9, got {}",
            config.conversion.compression_level
        );
    }

    if config.conversion.formats.is_empty() {
        anyhow::bail!("At least one target format must be enabled");
    }

    if config.queue.retry_cap < 1 {
        anyhow::bail!("Retry cap must be at least 1");
    }

    if config.conversion.resize.enabled
        && (config.conversion.resize.max_width == 0 || config.conversion.resize.max_height == 0)
    {
        anyhow::bail!("Resize bounds must be non-zero when resize is enabled");
    }

    Ok(())
}
