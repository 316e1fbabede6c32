//! External tool backend.
//!
//! Routes each target format to a dedicated command-line encoder (`cwebp`
//! for WebP, `avifenc` for AVIF). When a dedicated tool is missing the probe
//! falls back to a generic ImageMagick binary. Detection is layered: locate
//! the binary, run its version flag, and if that fails try an empirical 1x1
//! encode before giving up on the format.

use image::DynamicImage;
use pixelforge_common::{Error, Result, TargetFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{BackendKind, CapabilityEntry, DetectionMethod, EncodeParams, Encoder};

/// How a format's encode is routed.
#[derive(Debug, Clone)]
enum ToolRoute {
    Cwebp(PathBuf),
    Avifenc(PathBuf),
    Magick(PathBuf),
}

/// Backend shelling out to external encoders.
pub struct ToolBackend {
    routes: BTreeMap<TargetFormat, ToolRoute>,
}

struct FormatProbe {
    route: ToolRoute,
    method: DetectionMethod,
    version: Option<String>,
}

impl ToolBackend {
    /// Probe the environment for tool encoders.
    ///
    /// Never fails: a format whose probes all fail is simply left out of the
    /// capability entry, and an entry with no formats is marked unavailable.
    pub fn detect() -> (CapabilityEntry, Option<ToolBackend>) {
        let mut routes = BTreeMap::new();
        let mut method = DetectionMethod::Direct;
        let mut version = None;

        for &format in TargetFormat::all() {
            if let Some(probe) = probe_format(format) {
                debug!(
                    "tool backend: {} via {:?} ({:?})",
                    format, probe.route, probe.method
                );
                // Record the deepest fallback layer any format needed.
                method = deeper(method, probe.method);
                if version.is_none() {
                    version = probe.version;
                }
                routes.insert(format, probe.route);
            }
        }

        let entry = CapabilityEntry {
            kind: BackendKind::Tools,
            name: "tools".to_string(),
            version,
            supported_formats: routes.keys().copied().collect(),
            detection_method: method,
            available: !routes.is_empty(),
        };

        let backend = if routes.is_empty() {
            None
        } else {
            Some(ToolBackend { routes })
        };

        (entry, backend)
    }
}

fn deeper(a: DetectionMethod, b: DetectionMethod) -> DetectionMethod {
    fn depth(m: DetectionMethod) -> u8 {
        match m {
            DetectionMethod::Direct => 0,
            DetectionMethod::Probe => 1,
            DetectionMethod::HostFallback => 2,
        }
    }
    if depth(b) > depth(a) {
        b
    } else {
        a
    }
}

/// Probe one format through the fallback layers.
fn probe_format(format: TargetFormat) -> Option<FormatProbe> {
    let (tool, version_arg) = match format {
        TargetFormat::Webp => ("cwebp", "-version"),
        TargetFormat::Avif => ("avifenc", "--version"),
    };

    if let Ok(path) = which::which(tool) {
        let route = match format {
            TargetFormat::Webp => ToolRoute::Cwebp(path.clone()),
            TargetFormat::Avif => ToolRoute::Avifenc(path.clone()),
        };

        // Introspection: a binary that reports its version is trusted to
        // encode its own format.
        match Command::new(&path).arg(version_arg).output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                return Some(FormatProbe {
                    route,
                    method: DetectionMethod::Direct,
                    version,
                });
            }
            _ => {
                // Introspection failed; fall back to a trial encode.
                if trial_encode(&route, format) {
                    return Some(FormatProbe {
                        route,
                        method: DetectionMethod::Probe,
                        version: None,
                    });
                }
            }
        }
    }

    // No dedicated tool: ask the generic host image tool.
    let magick = which::which("magick").or_else(|_| which::which("convert")).ok()?;
    let route = ToolRoute::Magick(magick);
    if trial_encode(&route, format) {
        return Some(FormatProbe {
            route,
            method: DetectionMethod::HostFallback,
            version: None,
        });
    }

    None
}

/// Attempt a 1x1 encode through `route`; success means the format works.
fn trial_encode(route: &ToolRoute, format: TargetFormat) -> bool {
    let Ok(dir) = tempfile::tempdir() else {
        return false;
    };
    let dest = dir.path().join(format!("probe.{}", format.extension()));
    let pixel = DynamicImage::ImageRgba8(image::RgbaImage::new(1, 1));
    let params = EncodeParams {
        format,
        quality: 50,
        compression_level: 0,
        strip_metadata: true,
    };

    encode_with_route(route, &pixel, &params, &dest).is_ok() && dest.exists()
}

fn encode_with_route(
    route: &ToolRoute,
    image: &DynamicImage,
    params: &EncodeParams,
    dest: &Path,
) -> Result<()> {
    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());
    let staging = match dir {
        Some(dir) => tempfile::Builder::new()
            .prefix(".pixelforge-")
            .suffix(".png")
            .tempfile_in(dir),
        None => tempfile::Builder::new()
            .prefix(".pixelforge-")
            .suffix(".png")
            .tempfile(),
    }?;

    image
        .save_with_format(staging.path(), image::ImageFormat::Png)
        .map_err(|e| Error::encode(format!("Failed to stage image: {e}")))?;

    let output = build_command(route, params, staging.path(), dest)
        .output()
        .map_err(|e| Error::encode(format!("Failed to launch encoder: {e}")))?;

    if !output.status.success() {
        // Don't leave partial output behind.
        let _ = std::fs::remove_file(dest);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().next().unwrap_or("unknown error");
        return Err(Error::encode(format!(
            "{:?} exited with {}: {}",
            route, output.status, reason
        )));
    }

    Ok(())
}

fn build_command(route: &ToolRoute, params: &EncodeParams, src: &Path, dest: &Path) -> Command {
    match route {
        ToolRoute::Cwebp(bin) => {
            let mut cmd = Command::new(bin);
            cmd.arg("-quiet")
                .args(["-q", &params.quality.to_string()])
                .args(["-m", &cwebp_method(params.compression_level).to_string()])
                .args(["-metadata", if params.strip_metadata { "none" } else { "all" }])
                .arg(src)
                .arg("-o")
                .arg(dest);
            cmd
        }
        ToolRoute::Avifenc(bin) => {
            let mut cmd = Command::new(bin);
            cmd.args(["-q", &params.quality.to_string()])
                .args(["-s", &avifenc_speed(params.compression_level).to_string()]);
            if params.strip_metadata {
                cmd.args(["--ignore-exif", "--ignore-xmp"]);
            }
            cmd.arg(src).arg(dest);
            cmd
        }
        ToolRoute::Magick(bin) => {
            let mut cmd = Command::new(bin);
            cmd.arg(src)
                .args(["-quality", &params.quality.to_string()]);
            if params.strip_metadata {
                cmd.arg("-strip");
            }
            cmd.arg(dest);
            cmd
        }
    }
}

/// Map the 0-9 compression level onto cwebp's 0-6 method scale.
fn cwebp_method(level: u8) -> u8 {
    (u32::from(level.min(9)) * 6 / 9) as u8
}

/// Map the 0-9 compression level onto avifenc's 10-0 speed scale
/// (higher level = slower encode = smaller output).
fn avifenc_speed(level: u8) -> u8 {
    10 - level.min(9)
}

impl Encoder for ToolBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tools
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams, dest: &Path) -> Result<()> {
        let route = self.routes.get(&params.format).ok_or_else(|| {
            Error::encode(format!("No tool route for {}", params.format))
        })?;
        encode_with_route(route, image, params, dest)
    }
}
