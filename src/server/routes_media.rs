//! Content-negotiated media delivery.
//!
//! `GET /media/{path}` serves the best variant the client accepts: a fresh
//! precomputed variant when one exists, a lazily converted one when fallback
//! conversion is enabled, and ultimately the original. Conversion failures
//! are invisible to the client; they only ever see image bytes.

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use pixelforge_common::paths::{is_image_file, variant_path};
use pixelforge_common::{Error, TargetFormat};
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

use super::AppContext;
use crate::convert::ConversionOptions;
use crate::negotiate;

/// Create the delivery routes.
pub fn media_routes() -> Router<AppContext> {
    Router::new().route("/media/*path", get(serve_media))
}

struct Served {
    bytes: Vec<u8>,
    content_type: &'static str,
    last_modified: SystemTime,
}

/// Serve an asset with Accept-based variant negotiation.
async fn serve_media(
    State(ctx): State<AppContext>,
    AxumPath(path): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let ttl = ctx.config.delivery.cache_ttl_secs;
    let result = tokio::task::spawn_blocking(move || negotiate_and_load(&ctx, &path, &accept)).await;

    match result {
        Ok(Ok(served)) => {
            let expires = Utc::now() + chrono::Duration::seconds(ttl as i64);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, served.content_type.to_string()),
                    (
                        header::CACHE_CONTROL,
                        format!("public, max-age={ttl}"),
                    ),
                    (header::EXPIRES, httpdate(expires)),
                    (
                        header::LAST_MODIFIED,
                        httpdate(DateTime::<Utc>::from(served.last_modified)),
                    ),
                    (header::VARY, "Accept".to_string()),
                ],
                served.bytes,
            )
                .into_response()
        }
        Ok(Err((status, message))) => {
            (status, Json(serde_json::json!({"error": message}))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("Delivery task panicked: {e}")})),
        )
            .into_response(),
    }
}

/// Pick, possibly synthesize, and read the response body.
fn negotiate_and_load(
    ctx: &AppContext,
    source_ref: &str,
    accept: &str,
) -> Result<Served, (StatusCode, String)> {
    let path = ctx
        .resolver
        .resolve(source_ref)
        .map_err(|e| (StatusCode::FORBIDDEN, e.to_string()))?;

    if !is_image_file(&path) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{source_ref} is not an image path"),
        ));
    }

    let validated = ctx.converter.validator().validate(&path).map_err(|e| match e {
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        Error::SecurityRejected(msg) => (StatusCode::BAD_REQUEST, msg),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;

    for format in negotiate::rank(accept, &ctx.config.conversion.formats) {
        let candidate = variant_path(&validated.path, format);

        if let Some(served) = load_fresh_variant(&candidate, format, &validated.modified) {
            return Ok(served);
        }

        if ctx.config.delivery.fallback_convert {
            let options = ConversionOptions::from_config(&ctx.config.conversion)
                .for_single_format(format);
            match ctx.converter.convert(&validated.path, &options) {
                Ok(result) if result.variants.contains_key(&format) => {
                    if let Some(served) =
                        load_fresh_variant(&candidate, format, &validated.modified)
                    {
                        return Ok(served);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Fall through to the next format, then the original.
                    debug!("lazy {} conversion failed for {}: {}", format, source_ref, e);
                }
            }
        }
    }

    let bytes = std::fs::read(&validated.path)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Served {
        bytes,
        content_type: validated.format.mime_type(),
        last_modified: validated.modified,
    })
}

/// Read a variant if it exists and is at least as new as the source.
fn load_fresh_variant(
    candidate: &Path,
    format: TargetFormat,
    source_modified: &SystemTime,
) -> Option<Served> {
    let meta = std::fs::metadata(candidate).ok()?;
    let modified = meta.modified().ok()?;
    if modified < *source_modified {
        return None;
    }
    let bytes = std::fs::read(candidate).ok()?;
    Some(Served {
        bytes,
        content_type: format.mime_type(),
        last_modified: modified,
    })
}

fn httpdate(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
