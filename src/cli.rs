use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixelforge")]
#[command(author, version, about = "Image optimization engine with a durable conversion queue")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the delivery and admin API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Enqueue a source ref, or every image under a directory
    Enqueue {
        /// Source ref (relative to the storage root) or directory to scan
        #[arg(required = true)]
        path: String,

        /// Queue priority (higher runs first)
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },

    /// Claim and process one batch of queued conversions
    RunBatch {
        /// Batch size (overrides config)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Show aggregate queue counts
    Status,

    /// Probe codec backends and show the capability table
    Detect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a single source ref immediately, bypassing the queue
    Convert {
        /// Source ref relative to the storage root
        #[arg(required = true)]
        source_ref: String,

        /// Target format(s); defaults to the configured set
        #[arg(long = "format")]
        formats: Vec<String>,
    },

    /// Delete old completed queue rows and stale activity entries
    Cleanup {
        /// Retention window in days (overrides config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Delete all failed queue rows
    ClearFailed,

    /// Print a static webserver snippet implementing the same negotiation
    GenConfig {
        /// Output flavor: nginx or apache
        #[arg(required = true)]
        flavor: String,
    },
}
