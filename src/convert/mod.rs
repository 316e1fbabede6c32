//! The conversion pipeline.
//!
//! One call derives the requested variants for one source image. The
//! pipeline is stateless per call: it validates the source, picks a backend
//! through the registry, decodes at most once, resizes at most once, and
//! encodes each requested format independently. A format that fails is
//! recorded and does not abort its siblings.

mod mem;
mod options;

pub use options::{ConversionOptions, OptionOverrides};

use image::imageops::FilterType;
use image::DynamicImage;
use pixelforge_common::paths::variant_path;
use pixelforge_common::{Error, Result, SourceFormat, TargetFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::codec::{CapabilityRegistry, EncodeParams, Selection};
use crate::resolver::SourceResolver;
use crate::security::FileValidator;

/// One encoded (or reused) variant.
#[derive(Debug, Clone, Serialize)]
pub struct VariantInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    /// True when the skip rule found an up-to-date variant and no encode ran.
    pub reused: bool,
}

/// Outcome of one conversion call.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub source_path: PathBuf,
    pub source_size_bytes: u64,
    pub source_format: SourceFormat,
    pub variants: BTreeMap<TargetFormat, VariantInfo>,
    pub total_bytes_saved: u64,
    pub errors: BTreeMap<TargetFormat, String>,
    pub elapsed_seconds: f64,
    pub memory_delta_bytes: Option<i64>,
}

/// Dimensions after applying resize bounds, or `None` when the source
/// already fits. Aspect ratio is preserved and the image is never upscaled:
/// `floor(dim * min(max_w/w, max_h/h))`.
pub fn fit_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width <= max_width && height <= max_height {
        return None;
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let w = (f64::from(width) * scale).floor() as u32;
    let h = (f64::from(height) * scale).floor() as u32;
    Some((w.max(1), h.max(1)))
}

/// The conversion pipeline.
pub struct Converter {
    registry: Arc<CapabilityRegistry>,
    validator: FileValidator,
}

impl Converter {
    pub fn new(registry: Arc<CapabilityRegistry>, validator: FileValidator) -> Self {
        Self {
            registry,
            validator,
        }
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    /// Derive the requested variants for `source`.
    ///
    /// Fails outright only when the source is invalid/missing, no format was
    /// requested, or every requested format failed; otherwise partial
    /// results are returned with per-format errors.
    pub fn convert(&self, source: &Path, options: &ConversionOptions) -> Result<ConversionResult> {
        let started = Instant::now();
        let mem_before = mem::resident_memory_bytes();

        let validated = self.validator.validate(source)?;

        if options.formats.is_empty() {
            return Err(Error::invalid_input("No target formats requested"));
        }

        let resize_to = if options.resize_enabled {
            fit_dimensions(
                validated.width,
                validated.height,
                options.max_width,
                options.max_height,
            )
        } else {
            None
        };
        let (out_width, out_height) = resize_to.unwrap_or((validated.width, validated.height));

        let mut variants = BTreeMap::new();
        let mut errors = BTreeMap::new();
        // Backend selection and decode both happen lazily: a call where the
        // skip rule reuses every variant touches neither.
        let mut selection: Option<Selection> = None;
        let mut prepared: Option<DynamicImage> = None;

        for &format in &options.formats {
            let dest = variant_path(&validated.path, format);

            if let Some(existing) = self.reusable_variant(&dest, &validated.modified)? {
                debug!("reusing up-to-date variant {}", dest.display());
                variants.insert(
                    format,
                    VariantInfo {
                        path: dest,
                        size_bytes: existing,
                        width: out_width,
                        height: out_height,
                        reused: true,
                    },
                );
                continue;
            }

            let sel = match &mut selection {
                Some(sel) => &*sel,
                slot => match self.registry.select_best() {
                    Some(sel) => &*slot.insert(sel),
                    None => {
                        errors.insert(format, Error::BackendUnavailable.to_string());
                        continue;
                    }
                },
            };

            if !sel.formats.contains(&format) {
                errors.insert(
                    format,
                    format!("{} is not supported by the {} backend", format, sel.kind),
                );
                continue;
            }

            let img = match &mut prepared {
                Some(img) => &*img,
                slot => {
                    let decoded = image::open(&validated.path).map_err(|e| {
                        Error::invalid_input(format!(
                            "Failed to decode {}: {e}",
                            validated.path.display()
                        ))
                    })?;
                    let img = match resize_to {
                        Some((w, h)) => decoded.resize_exact(w, h, FilterType::Lanczos3),
                        None => decoded,
                    };
                    &*slot.insert(img)
                }
            };

            let params = EncodeParams {
                format,
                quality: options.quality_for(format),
                compression_level: options.compression_level,
                strip_metadata: options.strip_metadata,
            };

            match sel.encoder.encode(img, &params, &dest) {
                Ok(()) => {
                    let size_bytes = std::fs::metadata(&dest)?.len();
                    variants.insert(
                        format,
                        VariantInfo {
                            path: dest,
                            size_bytes,
                            width: out_width,
                            height: out_height,
                            reused: false,
                        },
                    );
                }
                Err(e) => {
                    warn!("{}: {} variant failed: {}", source.display(), format, e);
                    errors.insert(format, e.to_string());
                }
            }
        }

        if variants.is_empty() {
            let detail = errors
                .iter()
                .map(|(format, msg)| format!("{format}: {msg}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::encode(format!(
                "All variants failed for {}: {detail}",
                source.display()
            )));
        }

        let total_bytes_saved = variants
            .values()
            .map(|v| validated.size_bytes.saturating_sub(v.size_bytes))
            .sum();

        let memory_delta_bytes = match (mem_before, mem::resident_memory_bytes()) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };

        Ok(ConversionResult {
            source_path: validated.path,
            source_size_bytes: validated.size_bytes,
            source_format: validated.format,
            variants,
            total_bytes_saved,
            errors,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            memory_delta_bytes,
        })
    }

    /// Resize-only mode: shrink the source in place, keeping its format.
    ///
    /// Returns the resulting dimensions; a source already within bounds is
    /// left untouched.
    pub fn resize_in_place(
        &self,
        source: &Path,
        max_width: u32,
        max_height: u32,
    ) -> Result<(u32, u32)> {
        let validated = self.validator.validate(source)?;

        let Some((w, h)) = fit_dimensions(validated.width, validated.height, max_width, max_height)
        else {
            return Ok((validated.width, validated.height));
        };

        let decoded = image::open(&validated.path).map_err(|e| {
            Error::invalid_input(format!("Failed to decode {}: {e}", validated.path.display()))
        })?;
        let resized = decoded.resize_exact(w, h, FilterType::Lanczos3);

        let format = match validated.format {
            SourceFormat::Jpeg => image::ImageFormat::Jpeg,
            SourceFormat::Png => image::ImageFormat::Png,
            SourceFormat::Gif => image::ImageFormat::Gif,
            SourceFormat::Webp => image::ImageFormat::WebP,
        };
        resized
            .save_with_format(&validated.path, format)
            .map_err(|e| Error::encode(format!("Failed to rewrite {}: {e}", source.display())))?;

        Ok((w, h))
    }

    fn reusable_variant(
        &self,
        dest: &Path,
        source_modified: &std::time::SystemTime,
    ) -> Result<Option<u64>> {
        match std::fs::metadata(dest) {
            Ok(meta) => {
                let fresh = meta
                    .modified()
                    .map(|m| m >= *source_modified)
                    .unwrap_or(false);
                Ok(fresh.then(|| meta.len()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Immediate, non-queued conversion of a source ref.
pub fn process_single(
    converter: &Converter,
    resolver: &dyn SourceResolver,
    source_ref: &str,
    options: &ConversionOptions,
) -> Result<ConversionResult> {
    let path = resolver.resolve(source_ref)?;
    converter.convert(&path, options)
}
