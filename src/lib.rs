//! MongoDB Client Library
//!
//! This library provides a shell-style client layer over a MongoDB wire driver:
//! lazily-connected database handles, chainable cursors, collection helpers
//! and bulk write batching.
//!
//! # Modules
//!
//! - `config`: Configuration management
//! - `error`: Error types and handling
//! - `driver`: Wire driver boundary and the `mongodb`-backed implementation
//! - `connection`: Memoized, exactly-once connection management
//! - `cursor`: Lazy command cursors
//! - `collection`: Collection façade
//! - `bulk`: Bulk write batching
//! - `database`: Database handles and named collection accessors
//! - `utils`: Utility functions and helpers
//!
//! # Example
//!
//! ```no_run
//! use bson::doc;
//! use mongosh_client::{Config, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     mongosh_client::utils::logging::init(&config.logging);
//!
//!     let db = Database::from_config(&config);
//!     let users = db.collection("users");
//!
//!     users.insert_one(doc! { "name": "alice" }).await?;
//!     let adults = users
//!         .find(doc! { "age": { "$gte": 18 } }, None, None)
//!         .sort(doc! { "name": 1 })
//!         .limit(10)
//!         .to_array()
//!         .await?;
//!     println!("{} adults", adults.len());
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```

pub mod bulk;
pub mod collection;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod driver;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use bulk::{Bulk, BulkWriteResult};
pub use collection::Collection;
pub use config::Config;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use cursor::Cursor;
pub use database::Database;
pub use driver::MongoDriver;
pub use error::{MongoshError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
