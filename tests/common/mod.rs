//! Shared test harness for integration tests.
//!
//! Builds a full [`AppContext`] over an in-memory queue database and a
//! tempdir storage root, with the backend forced to `native` so tests do
//! not depend on external encoder binaries. [`TestHarness::with_server`]
//! additionally starts Axum on a random port for HTTP-level testing.

use std::net::SocketAddr;
use std::path::PathBuf;

use pixelforge::config::Config;
use pixelforge::server::{create_router, AppContext};
use pixelforge_db::pool::{init_memory_pool, DbPool};
use tempfile::TempDir;

pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    // Keeps the storage root alive for the duration of the test.
    pub root: TempDir,
}

impl TestHarness {
    /// Harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness with a configuration tweak applied before wiring.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let root = TempDir::new().expect("failed to create storage root");

        let mut config = Config::default();
        config.storage.root = root.path().to_path_buf();
        // Deterministic regardless of what encoders the host has installed.
        config.conversion.backend = Some("native".to_string());
        config.queue.item_delay_ms = 0;
        adjust(&mut config);

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::build(config, db.clone()).expect("failed to build context");

        Self { ctx, db, root }
    }

    /// Start an Axum server on a random port and return the harness
    /// together with the bound socket address.
    pub async fn with_server(adjust: impl FnOnce(&mut Config)) -> (Self, SocketAddr) {
        let harness = Self::with_config(adjust);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("no local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (harness, addr)
    }

    /// Write a solid-color PNG under the storage root, returning its path.
    pub fn write_png(&self, rel: &str, width: u32, height: u32) -> PathBuf {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
        img.save_with_format(&path, image::ImageFormat::Png)
            .expect("failed to write test png");
        path
    }
}
