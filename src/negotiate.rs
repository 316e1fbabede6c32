//! Accept-header content negotiation.
//!
//! The client's `Accept` header decides which modern formats are candidates;
//! our fixed preference order (AVIF before WebP) decides which candidate
//! wins. Only explicit `image/avif` / `image/webp` tokens count as support —
//! a bare `*/*` says nothing about whether the client can actually decode
//! them, so it falls through to the original.

use pixelforge_common::TargetFormat;

/// Modern formats the client explicitly declares support for.
pub fn accepted_formats(accept: &str) -> Vec<TargetFormat> {
    let mut accepted = Vec::new();
    for part in accept.split(',') {
        // Strip any parameters (;q=0.8 etc); declared presence is enough.
        let token = part.split(';').next().unwrap_or("").trim().to_lowercase();
        let format = match token.as_str() {
            "image/avif" => Some(TargetFormat::Avif),
            "image/webp" => Some(TargetFormat::Webp),
            _ => None,
        };
        if let Some(format) = format {
            if !accepted.contains(&format) {
                accepted.push(format);
            }
        }
    }
    accepted
}

/// Candidate formats in serving order: our preference order, filtered to
/// what the client accepts and what configuration enables.
pub fn rank(accept: &str, enabled: &[TargetFormat]) -> Vec<TargetFormat> {
    let accepted = accepted_formats(accept);
    TargetFormat::all()
        .iter()
        .copied()
        .filter(|f| accepted.contains(f) && enabled.contains(f))
        .collect()
}
