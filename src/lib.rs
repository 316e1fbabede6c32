//! Pixelforge: a media-asset optimization engine.
//!
//! Derives modern compressed variants (AVIF, WebP) of raster images and
//! serves the best variant per request, amortizing conversion cost over a
//! durable, retryable job queue.
//!
//! # Architecture
//!
//! - [`codec`] - backend capability discovery and the encoder seam
//! - [`convert`] - the conversion pipeline (skip rule, resize, per-format
//!   error capture)
//! - [`batch`] - queue-draining worker with a time budget and progress
//!   snapshot
//! - [`server`] - content-negotiated delivery plus the admin API
//! - [`security`] - path confinement and content validation
//! - [`srvconf`] - static nginx/Apache negotiation snippets
//!
//! The durable queue itself lives in the `pixelforge-db` crate; shared
//! error and format types in `pixelforge-common`.

pub mod activity;
pub mod batch;
pub mod codec;
pub mod config;
pub mod convert;
pub mod negotiate;
pub mod resolver;
pub mod security;
pub mod server;
pub mod srvconf;
