//! Integration tests for the conversion pipeline.

mod common;

use common::TestHarness;
use pixelforge::convert::{ConversionOptions, OptionOverrides};
use pixelforge_common::{Error, TargetFormat};

fn webp_only_options(h: &TestHarness) -> ConversionOptions {
    ConversionOptions::merged(
        &h.ctx.config.conversion,
        &OptionOverrides {
            formats: Some(vec![TargetFormat::Webp]),
            ..Default::default()
        },
    )
}

#[test]
fn convert_produces_webp_variant() {
    let h = TestHarness::new();
    let source = h.write_png("photo.png", 32, 24);

    let options = webp_only_options(&h);
    let result = h.ctx.converter.convert(&source, &options).unwrap();

    assert_eq!(result.source_format, pixelforge_common::SourceFormat::Png);
    let variant = &result.variants[&TargetFormat::Webp];
    assert!(!variant.reused);
    assert_eq!((variant.width, variant.height), (32, 24));
    assert!(variant.path.ends_with("photo.png.webp"));
    assert!(variant.path.exists());
    assert!(result.errors.is_empty());
    assert_eq!(
        image::image_dimensions(&variant.path).unwrap(),
        (32, 24)
    );
}

#[test]
fn convert_is_idempotent_on_unchanged_source() {
    let h = TestHarness::new();
    let source = h.write_png("stable.png", 16, 16);
    let options = webp_only_options(&h);

    let first = h.ctx.converter.convert(&source, &options).unwrap();
    let variant_path = first.variants[&TargetFormat::Webp].path.clone();
    let mtime_after_first = std::fs::metadata(&variant_path).unwrap().modified().unwrap();

    let second = h.ctx.converter.convert(&source, &options).unwrap();
    let variant = &second.variants[&TargetFormat::Webp];

    assert!(variant.reused);
    assert_eq!(variant.path, variant_path);
    // No re-encode: the file was not touched.
    let mtime_after_second = std::fs::metadata(&variant_path).unwrap().modified().unwrap();
    assert_eq!(mtime_after_first, mtime_after_second);
}

#[test]
fn resize_preserves_aspect_ratio() {
    let h = TestHarness::new();
    let source = h.write_png("wide.png", 1000, 500);

    let options = ConversionOptions::merged(
        &h.ctx.config.conversion,
        &OptionOverrides {
            formats: Some(vec![TargetFormat::Webp]),
            resize: Some(true),
            max_width: Some(600),
            max_height: Some(600),
            ..Default::default()
        },
    );
    let result = h.ctx.converter.convert(&source, &options).unwrap();

    let variant = &result.variants[&TargetFormat::Webp];
    assert_eq!((variant.width, variant.height), (600, 300));
    assert_eq!(image::image_dimensions(&variant.path).unwrap(), (600, 300));
}

#[test]
fn partial_success_captures_per_format_errors() {
    // The native backend cannot write AVIF; the WebP sibling must still
    // succeed and the AVIF failure must be recorded, not raised.
    let h = TestHarness::new();
    let source = h.write_png("both.png", 10, 10);

    let options = ConversionOptions::from_config(&h.ctx.config.conversion);
    assert_eq!(
        options.formats,
        vec![TargetFormat::Avif, TargetFormat::Webp]
    );

    let result = h.ctx.converter.convert(&source, &options).unwrap();
    assert!(result.variants.contains_key(&TargetFormat::Webp));
    assert!(!result.variants.contains_key(&TargetFormat::Avif));
    assert!(result.errors.contains_key(&TargetFormat::Avif));
}

#[test]
fn all_formats_failing_is_an_error() {
    let h = TestHarness::new();
    let source = h.write_png("avif-only.png", 10, 10);

    let options = ConversionOptions::merged(
        &h.ctx.config.conversion,
        &OptionOverrides {
            formats: Some(vec![TargetFormat::Avif]),
            ..Default::default()
        },
    );
    let err = h.ctx.converter.convert(&source, &options).unwrap_err();
    assert!(matches!(err, Error::EncodeFailed(_)));
}

#[test]
fn security_rejection_creates_no_output() {
    // PNG magic bytes behind a .jpg extension.
    let h = TestHarness::new();
    let disguised = h.write_png("sneaky.png", 8, 8);
    let target = h.root.path().join("sneaky.jpg");
    std::fs::rename(&disguised, &target).unwrap();

    let options = webp_only_options(&h);
    let err = h.ctx.converter.convert(&target, &options).unwrap_err();
    assert!(matches!(err, Error::SecurityRejected(_)));

    // No backend ran, so no variant file appeared.
    assert!(!h.root.path().join("sneaky.jpg.webp").exists());
}

#[test]
fn missing_source_is_not_found() {
    let h = TestHarness::new();
    let options = webp_only_options(&h);
    let err = h
        .ctx
        .converter
        .convert(&h.root.path().join("absent.png"), &options)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn resize_in_place_overwrites_source() {
    let h = TestHarness::new();
    let source = h.write_png("shrink.png", 1000, 500);

    let (w, h_px) = h.ctx.converter.resize_in_place(&source, 600, 600).unwrap();
    assert_eq!((w, h_px), (600, 300));
    assert_eq!(image::image_dimensions(&source).unwrap(), (600, 300));

    // Already within bounds: untouched.
    let (w, h_px) = h.ctx.converter.resize_in_place(&source, 600, 600).unwrap();
    assert_eq!((w, h_px), (600, 300));
}

#[test]
fn stale_variant_is_reencoded() {
    let h = TestHarness::new();
    let source = h.write_png("fresh.png", 12, 12);
    let options = webp_only_options(&h);

    h.ctx.converter.convert(&source, &options).unwrap();

    // Rewrite the source newer than the variant; backdate the variant far
    // enough that filesystem mtime granularity cannot mask the change.
    let variant_path = h.root.path().join("fresh.png.webp");
    let old = filetime::FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_mtime(&variant_path, old).unwrap();

    let result = h.ctx.converter.convert(&source, &options).unwrap();
    assert!(!result.variants[&TargetFormat::Webp].reused);
}
