//! Path utilities for image files and variant paths.
//!
//! Variant paths are derived deterministically from the source path: the
//! variant sits next to the source, keeping the full source file name and
//! appending the target extension (`photo.jpg` -> `photo.jpg.avif`). Keeping
//! the source extension in the name avoids collisions between `photo.jpg`
//! and `photo.png` in the same directory.

use std::path::{Path, PathBuf};

use crate::TargetFormat;

/// List of accepted image file extensions.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Check if a path has an accepted image file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use pixelforge_common::paths::is_image_file;
///
/// assert!(is_image_file(Path::new("photo.jpg")));
/// assert!(is_image_file(Path::new("/uploads/2026/banner.PNG")));
/// assert!(!is_image_file(Path::new("document.pdf")));
/// ```
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Compute the deterministic output path for a variant of `source`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use pixelforge_common::paths::variant_path;
/// use pixelforge_common::TargetFormat;
///
/// let p = variant_path(Path::new("/uploads/photo.jpg"), TargetFormat::Webp);
/// assert_eq!(p, Path::new("/uploads/photo.jpg.webp"));
/// ```
pub fn variant_path(source: &Path, format: TargetFormat) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    name.push_str(format.extension());
    source.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.jpg")));
        assert!(is_image_file(Path::new("a.JPEG")));
        assert!(is_image_file(Path::new("a.webp")));
        assert!(!is_image_file(Path::new("a.avif")));
        assert!(!is_image_file(Path::new("a")));
        assert!(!is_image_file(Path::new("a.txt")));
    }

    #[test]
    fn test_variant_path_keeps_source_extension() {
        let p = variant_path(Path::new("/uploads/photo.jpg"), TargetFormat::Avif);
        assert_eq!(p, Path::new("/uploads/photo.jpg.avif"));

        // photo.jpg and photo.png must not collide
        let a = variant_path(Path::new("/u/photo.jpg"), TargetFormat::Webp);
        let b = variant_path(Path::new("/u/photo.png"), TargetFormat::Webp);
        assert_ne!(a, b);
    }

    #[test]
    fn test_variant_path_relative() {
        let p = variant_path(Path::new("photo.png"), TargetFormat::Webp);
        assert_eq!(p, Path::new("photo.png.webp"));
    }
}
