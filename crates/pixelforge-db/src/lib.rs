//! Pixelforge-DB: Job queue schema, migrations, and query operations.
//!
//! This crate provides the durable conversion queue for pixelforge using
//! SQLite with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Queue and activity-log query operations
//!
//! # Example
//!
//! ```
//! use pixelforge_db::pool::{init_memory_pool, get_conn};
//! use pixelforge_db::queries::queue;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let outcome = queue::enqueue(&conn, "2026/08/photo.jpg", None, 0).unwrap();
//! println!("queued as item {}", outcome.id());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
