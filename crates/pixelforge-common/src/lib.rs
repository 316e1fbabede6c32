//! Pixelforge-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across pixelforge:
//!
//! - **Error Handling**: The unified error type and result alias
//! - **Formats**: Target codec and source format enums, MIME mapping,
//!   magic-byte sniffing
//! - **Path Utilities**: Image extension checks and variant path derivation
//!
//! # Examples
//!
//! ```
//! use pixelforge_common::{Error, Result, TargetFormat};
//! use pixelforge_common::paths::is_image_file;
//! use std::path::Path;
//!
//! assert!(is_image_file(Path::new("photo.jpg")));
//! assert_eq!(TargetFormat::Avif.mime_type(), "image/avif");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("asset"))
//! }
//! ```

pub mod error;
pub mod format;
pub mod paths;

pub use error::{Error, Result};
pub use format::{SourceFormat, TargetFormat};
