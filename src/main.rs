mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use pixelforge::resolver::{RootResolver, SourceResolver};
use pixelforge::{config, convert, server, srvconf};
use pixelforge_common::paths::is_image_file;
use pixelforge_db::pool::{init_pool, DbPool};
use pixelforge_db::queries::{activity, queue};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = config::load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Enqueue { path, priority } => enqueue(config, &path, priority),
        Commands::RunBatch { size } => run_batch(config, size),
        Commands::Status => status(config),
        Commands::Detect { json } => detect(config, json),
        Commands::Convert {
            source_ref,
            formats,
        } => convert_one(config, &source_ref, &formats),
        Commands::Cleanup { days } => cleanup(config, days),
        Commands::ClearFailed => clear_failed(config),
        Commands::GenConfig { flavor } => gen_config(config, &flavor),
    }
}

fn open_pool(config: &config::Config) -> Result<DbPool> {
    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!("Failed to create storage root {:?}", config.storage.root)
    })?;
    let db_path = config
        .storage
        .db_path
        .clone()
        .unwrap_or_else(|| config.storage.root.join("pixelforge.db"));
    let pool = init_pool(&db_path.to_string_lossy())?;
    Ok(pool)
}

async fn serve(mut config: config::Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let pool = open_pool(&config)?;

    // A worker that died mid-batch leaves Processing rows behind; give them
    // back to the queue before accepting new work.
    {
        let conn = pool.get()?;
        match queue::reset_orphaned(&conn) {
            Ok(count) if count > 0 => {
                tracing::info!("Reset {} orphaned queue item(s) from a previous run", count);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to reset orphaned queue items: {}", e),
        }
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let ctx = server::AppContext::build(config, pool)?;
    server::serve(ctx, &host, port).await
}

fn enqueue(config: config::Config, path: &str, priority: i64) -> Result<()> {
    let pool = open_pool(&config)?;
    let conn = pool.get()?;

    let scan_dir = {
        let candidate = Path::new(path);
        if candidate.is_dir() {
            Some(candidate.to_path_buf())
        } else {
            let under_root = config.storage.root.join(path);
            under_root.is_dir().then_some(under_root)
        }
    };

    match scan_dir {
        Some(dir) => {
            let resolver = RootResolver::new(
                config
                    .storage
                    .root
                    .canonicalize()
                    .unwrap_or_else(|_| config.storage.root.clone()),
            );
            let mut queued = 0usize;
            let mut skipped = 0usize;
            for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() || !is_image_file(entry.path()) {
                    continue;
                }
                let canonical = match entry.path().canonicalize() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let source_ref = match resolver.to_ref(&canonical) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                        continue;
                    }
                };
                match queue::enqueue(&conn, &source_ref, None, priority)? {
                    outcome if outcome.is_duplicate() => skipped += 1,
                    _ => queued += 1,
                }
            }
            println!("Queued {queued} item(s), {skipped} duplicate(s) skipped");
        }
        None => {
            let outcome = queue::enqueue(&conn, path, None, priority)?;
            if outcome.is_duplicate() {
                println!("Already queued as item {}", outcome.id());
            } else {
                println!("Queued as item {}", outcome.id());
            }
        }
    }

    Ok(())
}

fn run_batch(config: config::Config, size: Option<usize>) -> Result<()> {
    let size = size.unwrap_or(config.queue.batch_size);
    let pool = open_pool(&config)?;
    let ctx = server::AppContext::build(config, pool)?;

    let report = ctx.runner.run_batch(size)?;
    println!(
        "Processed {} item(s), {} error(s), {} deferred in {:.2}s",
        report.processed, report.errors, report.deferred, report.elapsed_seconds
    );
    Ok(())
}

fn status(config: config::Config) -> Result<()> {
    let pool = open_pool(&config)?;
    let conn = pool.get()?;
    let counts = queue::status_counts(&conn)?;
    println!("pending:    {}", counts.pending);
    println!("processing: {}", counts.processing);
    println!("completed:  {}", counts.completed);
    println!("failed:     {}", counts.failed);
    println!("total:      {}", counts.total);
    Ok(())
}

fn detect(config: config::Config, json: bool) -> Result<()> {
    let pool = open_pool(&config)?;
    let ctx = server::AppContext::build(config, pool)?;
    let table = ctx.registry.detect();

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    for entry in &table.entries {
        let formats = entry
            .supported_formats
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<8} available={:<5} formats=[{}] method={:?} version={}",
            entry.name,
            entry.available,
            formats,
            entry.detection_method,
            entry.version.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn convert_one(config: config::Config, source_ref: &str, formats: &[String]) -> Result<()> {
    let overrides = if formats.is_empty() {
        convert::OptionOverrides::default()
    } else {
        let parsed = formats
            .iter()
            .map(|f| f.parse())
            .collect::<pixelforge_common::Result<Vec<_>>>()?;
        convert::OptionOverrides {
            formats: Some(parsed),
            ..Default::default()
        }
    };

    let options = convert::ConversionOptions::merged(&config.conversion, &overrides);
    let pool = open_pool(&config)?;
    let ctx = server::AppContext::build(config, pool)?;

    let result = convert::process_single(&ctx.converter, ctx.resolver.as_ref(), source_ref, &options)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cleanup(config: config::Config, days: Option<i64>) -> Result<()> {
    let pool = open_pool(&config)?;
    let conn = pool.get()?;

    let queue_days = days.unwrap_or(config.queue.cleanup_days);
    let deleted = queue::cleanup_completed(&conn, queue_days)?;
    println!("Deleted {deleted} completed queue row(s) older than {queue_days} day(s)");

    let log_days = days.unwrap_or(config.logging.retention_days);
    let pruned = activity::prune(&conn, log_days)?;
    println!("Pruned {pruned} activity entr(ies) older than {log_days} day(s)");
    Ok(())
}

fn clear_failed(config: config::Config) -> Result<()> {
    let pool = open_pool(&config)?;
    let conn = pool.get()?;
    let deleted = queue::clear_failed(&conn)?;
    println!("Deleted {deleted} failed queue row(s)");
    Ok(())
}

fn gen_config(config: config::Config, flavor: &str) -> Result<()> {
    let flavor = match flavor.to_lowercase().as_str() {
        "nginx" => srvconf::ConfigFlavor::Nginx,
        "apache" => srvconf::ConfigFlavor::Apache,
        other => anyhow::bail!("Unknown flavor '{other}'; expected nginx or apache"),
    };
    print!("{}", srvconf::generate(&config, flavor));
    Ok(())
}
