//! HTTP server: delivery endpoint plus the queue/batch admin API.

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use pixelforge_db::pool::DbPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod routes_api;
pub mod routes_media;

use crate::activity::{ActivitySink, DbActivitySink, TracingActivitySink};
use crate::batch::{BatchRunner, FixedPolicy, MemoryAwarePolicy, ProgressTracker};
use crate::codec::{BackendKind, CapabilityRegistry};
use crate::config::Config;
use crate::convert::Converter;
use crate::resolver::{RootResolver, SourceResolver};
use crate::security::FileValidator;

/// Shared application context.
#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub registry: Arc<CapabilityRegistry>,
    pub converter: Arc<Converter>,
    pub resolver: Arc<dyn SourceResolver>,
    pub sink: Arc<dyn ActivitySink>,
    pub runner: Arc<BatchRunner>,
    pub progress: Arc<ProgressTracker>,
}

impl AppContext {
    /// Wire every component from a config and an initialized pool.
    ///
    /// The storage root is created if missing so a fresh deployment works
    /// without a manual mkdir.
    pub fn build(config: Config, db: DbPool) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.root).with_context(|| {
            format!("Failed to create storage root {:?}", config.storage.root)
        })?;

        let forced = match &config.conversion.backend {
            Some(name) => Some(
                name.parse::<BackendKind>()
                    .context("Invalid [conversion].backend")?,
            ),
            None => None,
        };

        let registry = Arc::new(
            CapabilityRegistry::new(Duration::from_secs(config.detection.cache_ttl_secs))
                .with_forced(forced),
        );
        let validator = FileValidator::new(&config.storage.root, &config.security)
            .context("Failed to set up the file validator")?;
        let converter = Arc::new(Converter::new(Arc::clone(&registry), validator));
        let resolver: Arc<dyn SourceResolver> =
            Arc::new(RootResolver::new(config.storage.root.clone()));
        let sink: Arc<dyn ActivitySink> = if config.logging.enabled {
            Arc::new(DbActivitySink::new(db.clone()))
        } else {
            Arc::new(TracingActivitySink)
        };
        let progress = Arc::new(ProgressTracker::default());
        let policy: Arc<dyn crate::batch::BatchPolicy> = if cfg!(target_os = "linux") {
            Arc::new(MemoryAwarePolicy::new(config.queue.memory_per_image_mb))
        } else {
            Arc::new(FixedPolicy)
        };

        let runner = Arc::new(BatchRunner::new(
            db.clone(),
            Arc::clone(&converter),
            Arc::clone(&resolver),
            Arc::clone(&sink),
            Arc::clone(&progress),
            policy,
            config.conversion.clone(),
            config.queue.clone(),
        ));

        Ok(Self {
            db,
            config: Arc::new(config),
            registry,
            converter,
            resolver,
            sink,
            runner,
            progress,
        })
    }
}

/// Create the Axum router with all routes.
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes_api::api_routes())
        .merge(routes_media::media_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind and serve until ctrl-c.
pub async fn serve(ctx: AppContext, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;

    let app = create_router(ctx);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
