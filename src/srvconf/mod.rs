//! Static server configuration generation.
//!
//! Emits nginx and Apache snippets that perform the same Accept-based
//! negotiation as the delivery endpoint, declaratively: prefer AVIF, then
//! WebP, then the original, always with `Vary: Accept`. Serving precomputed
//! variants straight from the webserver keeps the dynamic endpoint as a
//! fallback for cold assets only.

use pixelforge_common::TargetFormat;
use std::fmt::Write;

use crate::config::Config;

/// Supported output flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFlavor {
    Nginx,
    Apache,
}

/// Render the snippet for the requested flavor.
pub fn generate(config: &Config, flavor: ConfigFlavor) -> String {
    match flavor {
        ConfigFlavor::Nginx => nginx_config(config),
        ConfigFlavor::Apache => apache_config(config),
    }
}

const SOURCE_PATTERN: &str = r"\.(jpe?g|png|gif|webp)$";

/// nginx: one `map` per enabled format turns the Accept header into a
/// variant suffix, and `try_files` walks the preference chain.
pub fn nginx_config(config: &Config) -> String {
    let enabled = &config.conversion.formats;
    let ttl = config.delivery.cache_ttl_secs;
    let mut out = String::new();

    let _ = writeln!(out, "# Generated by pixelforge. Place the map blocks in the http");
    let _ = writeln!(out, "# context and the location block in your server context.");
    let _ = writeln!(out);

    for format in ordered(enabled) {
        let ext = format.extension();
        let _ = writeln!(out, "map $http_accept $pixelforge_{ext} {{");
        let _ = writeln!(out, "    default \"\";");
        let _ = writeln!(out, "    \"~image/{ext}\" \".{ext}\";");
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "location ~* {SOURCE_PATTERN} {{");
    let _ = writeln!(out, "    add_header Vary Accept;");
    let _ = writeln!(out, "    add_header Cache-Control \"public, max-age={ttl}\";");

    let mut chain = String::new();
    for format in ordered(enabled) {
        let _ = write!(chain, "$uri$pixelforge_{} ", format.extension());
    }
    let _ = writeln!(out, "    try_files {chain}$uri =404;");
    let _ = writeln!(out, "}}");

    out
}

/// Apache: mod_rewrite conditions per enabled format, most-preferred first,
/// each guarded by an on-disk variant check.
pub fn apache_config(config: &Config) -> String {
    let enabled = &config.conversion.formats;
    let ttl = config.delivery.cache_ttl_secs;
    let mut out = String::new();

    let _ = writeln!(out, "# Generated by pixelforge.");
    let _ = writeln!(out, "<IfModule mod_rewrite.c>");
    let _ = writeln!(out, "    RewriteEngine On");

    for format in ordered(enabled) {
        let ext = format.extension();
        let _ = writeln!(out);
        let _ = writeln!(out, "    RewriteCond %{{HTTP_ACCEPT}} image/{ext}");
        let _ = writeln!(out, "    RewriteCond %{{REQUEST_FILENAME}}.{ext} -f");
        let _ = writeln!(
            out,
            "    RewriteRule {SOURCE_PATTERN} %{{REQUEST_URI}}.{ext} [T=image/{ext},L]"
        );
    }

    let _ = writeln!(out, "</IfModule>");
    let _ = writeln!(out);
    let _ = writeln!(out, "<IfModule mod_headers.c>");
    let _ = writeln!(out, "    Header append Vary Accept");
    let _ = writeln!(out, "</IfModule>");
    let _ = writeln!(out);
    let _ = writeln!(out, "<IfModule mod_expires.c>");
    let _ = writeln!(out, "    ExpiresActive On");
    for format in ordered(enabled) {
        let _ = writeln!(
            out,
            "    ExpiresByType image/{} \"access plus {ttl} seconds\"",
            format.extension()
        );
    }
    let _ = writeln!(out, "</IfModule>");

    out
}

/// Enabled formats in delivery preference order.
fn ordered(enabled: &[TargetFormat]) -> impl Iterator<Item = TargetFormat> + '_ {
    TargetFormat::all()
        .iter()
        .copied()
        .filter(move |f| enabled.contains(f))
}
