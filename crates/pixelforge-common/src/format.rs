//! Target codec and source format definitions.
//!
//! Defines the two modern target formats the engine converts into, the legacy
//! source formats it accepts, MIME mapping, and magic-byte sniffing used by
//! the security validator to verify that file content matches its extension.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A modern compressed target format.
///
/// Variants are ordered by delivery preference: AVIF compresses better than
/// WebP, so it ranks first wherever the two compete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// AV1 Image File Format.
    Avif,
    /// WebP.
    Webp,
}

impl TargetFormat {
    /// All target formats, in delivery preference order.
    pub fn all() -> &'static [TargetFormat] {
        &[TargetFormat::Avif, TargetFormat::Webp]
    }

    /// The MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Avif => "image/avif",
            Self::Webp => "image/webp",
        }
    }

    /// The file extension for this format, without a leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Avif => "avif",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avif" => Ok(Self::Avif),
            "webp" => Ok(Self::Webp),
            other => Err(crate::Error::invalid_input(format!(
                "Unknown target format: {other}"
            ))),
        }
    }
}

/// A raster source format accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl SourceFormat {
    /// The MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Map a file extension (without dot, any case) to a source format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Gif => write!(f, "gif"),
            Self::Webp => write!(f, "webp"),
        }
    }
}

/// Sniff the image format from the leading bytes of a file.
///
/// Recognizes the allow-listed source formats only. Returns `None` for
/// anything else, including AVIF (AVIF is produced by the engine, never
/// accepted as a source).
pub fn sniff_format(bytes: &[u8]) -> Option<SourceFormat> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SourceFormat::Jpeg);
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(SourceFormat::Png);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(SourceFormat::Gif);
    }
    if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some(SourceFormat::Webp);
    }
    None
}
