//! In-process backend built on the `image` crate.
//!
//! The limited fallback: always present, no external binaries, but it only
//! writes lossless WebP. Quality and compression level are accepted and
//! ignored; metadata is dropped inherently because the pixels are re-encoded
//! from scratch.

use image::codecs::webp::WebPEncoder;
use image::DynamicImage;
use pixelforge_common::{Error, Result, TargetFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{BackendKind, CapabilityEntry, DetectionMethod, EncodeParams, Encoder};

/// Backend encoding through the `image` crate.
pub struct NativeBackend;

impl NativeBackend {
    /// Probe the native backend by round-tripping a 1x1 encode per format.
    ///
    /// The probe is empirical rather than a hardcoded list so that enabling
    /// an `image` feature later is picked up without touching detection.
    pub fn detect() -> (CapabilityEntry, NativeBackend) {
        let backend = NativeBackend;
        let pixel = DynamicImage::ImageRgba8(image::RgbaImage::new(1, 1));

        let supported = TargetFormat::all()
            .iter()
            .copied()
            .filter(|&format| backend.encode_to_vec(&pixel, format).is_ok())
            .collect::<std::collections::BTreeSet<_>>();

        let entry = CapabilityEntry {
            kind: BackendKind::Native,
            name: "native".to_string(),
            version: None,
            supported_formats: supported.clone(),
            detection_method: DetectionMethod::Probe,
            available: !supported.is_empty(),
        };

        (entry, backend)
    }

    fn encode_to_vec(&self, image: &DynamicImage, format: TargetFormat) -> Result<Vec<u8>> {
        match format {
            TargetFormat::Webp => {
                let mut buf = Vec::new();
                image
                    .write_with_encoder(WebPEncoder::new_lossless(&mut buf))
                    .map_err(|e| Error::encode(format!("WebP encode failed: {e}")))?;
                Ok(buf)
            }
            TargetFormat::Avif => Err(Error::encode(
                "AVIF is not supported by the native backend",
            )),
        }
    }
}

impl Encoder for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams, dest: &Path) -> Result<()> {
        match params.format {
            TargetFormat::Webp => {
                let file = File::create(dest)?;
                let writer = BufWriter::new(file);
                if let Err(e) = image.write_with_encoder(WebPEncoder::new_lossless(writer)) {
                    let _ = std::fs::remove_file(dest);
                    return Err(Error::encode(format!("WebP encode failed: {e}")));
                }
                Ok(())
            }
            TargetFormat::Avif => Err(Error::encode(
                "AVIF is not supported by the native backend",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_supports_webp_only() {
        let (entry, _) = NativeBackend::detect();
        assert!(entry.available);
        assert!(entry.supported_formats.contains(&TargetFormat::Webp));
        assert!(!entry.supported_formats.contains(&TargetFormat::Avif));
        assert_eq!(entry.detection_method, DetectionMethod::Probe);
    }

    #[test]
    fn test_encode_webp_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.webp");
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            4,
            3,
            image::Rgba([200, 100, 50, 255]),
        ));

        let params = EncodeParams {
            format: TargetFormat::Webp,
            quality: 80,
            compression_level: 6,
            strip_metadata: true,
        };
        NativeBackend.encode(&img, &params, &dest).unwrap();

        let (w, h) = image::image_dimensions(&dest).unwrap();
        assert_eq!((w, h), (4, 3));
    }

    #[test]
    fn test_encode_avif_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.avif");
        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(1, 1));

        let params = EncodeParams {
            format: TargetFormat::Avif,
            quality: 55,
            compression_level: 6,
            strip_metadata: true,
        };
        let err = NativeBackend.encode(&img, &params, &dest).unwrap_err();
        assert!(matches!(err, Error::EncodeFailed(_)));
        assert!(!dest.exists());
    }
}
