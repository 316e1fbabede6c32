//! File validation preconditions for the conversion pipeline and delivery.
//!
//! Every path the engine touches passes through here first: confinement to
//! the managed storage root, the image extension allow-list, a magic-byte
//! check that the content matches the extension, and a dimension ceiling
//! read from the image header without a full decode.

use pixelforge_common::{format, Error, Result, SourceFormat};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::SecurityConfig;

/// A source file that passed all preconditions.
#[derive(Debug, Clone)]
pub struct ValidatedSource {
    /// Canonicalized path, guaranteed inside the storage root.
    pub path: PathBuf,
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// Validates files against the storage root and content rules.
#[derive(Debug, Clone)]
pub struct FileValidator {
    root: PathBuf,
    max_width: u32,
    max_height: u32,
}

impl FileValidator {
    /// Create a validator for the given storage root.
    ///
    /// The root must exist; it is canonicalized once so that later
    /// confinement checks compare canonical forms.
    pub fn new(root: &Path, security: &SecurityConfig) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            Error::invalid_input(format!("Storage root {:?} is not usable: {e}", root))
        })?;
        Ok(Self {
            root,
            max_width: security.max_width,
            max_height: security.max_height,
        })
    }

    /// The canonical storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run all preconditions against `path`.
    pub fn validate(&self, path: &Path) -> Result<ValidatedSource> {
        let metadata = std::fs::metadata(path)
            .map_err(|_| Error::not_found(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(Error::not_found(path.display().to_string()));
        }

        let canonical = path
            .canonicalize()
            .map_err(|_| Error::not_found(path.display().to_string()))?;
        if !canonical.starts_with(&self.root) {
            return Err(Error::security(format!(
                "{} escapes the storage root",
                path.display()
            )));
        }

        let ext_format = canonical
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(SourceFormat::from_extension)
            .ok_or_else(|| {
                Error::security(format!("{} is not an allowed image type", path.display()))
            })?;

        let sniffed = sniff_file(&canonical)?;
        match sniffed {
            Some(actual) if actual == ext_format => {}
            Some(actual) => {
                return Err(Error::security(format!(
                    "{} claims {} but contains {}",
                    path.display(),
                    ext_format,
                    actual
                )));
            }
            None => {
                return Err(Error::security(format!(
                    "{} does not contain a recognized image",
                    path.display()
                )));
            }
        }

        // Header-only dimension probe, so an oversized image is rejected
        // before any pixels are decoded.
        let (width, height) = image::image_dimensions(&canonical).map_err(|e| {
            Error::security(format!("{} has an unreadable header: {e}", path.display()))
        })?;
        if width > self.max_width || height > self.max_height {
            return Err(Error::security(format!(
                "{} is {}x{}, exceeding the {}x{} ceiling",
                path.display(),
                width,
                height,
                self.max_width,
                self.max_height
            )));
        }

        let modified = metadata.modified()?;

        Ok(ValidatedSource {
            path: canonical,
            format: ext_format,
            width,
            height,
            size_bytes: metadata.len(),
            modified,
        })
    }
}

fn sniff_file(path: &Path) -> Result<Option<SourceFormat>> {
    let mut head = [0u8; 32];
    let mut file = File::open(path)?;
    let n = file.read(&mut head)?;
    Ok(format::sniff_format(&head[..n]))
}
