//! Error handling for mongosh-client operations.
//!
//! This module provides:
//! - A single top-level error type covering transport, server, cursor,
//!   caller-contract and bulk failures
//! - Normalization of server error documents into [`CommandError`]
//! - Consistent JSON error summaries for logging
//!
//! # Example
//!
//! ```rust
//! use bson::doc;
//! use mongosh_client::error::CommandError;
//!
//! let reply = doc! { "ok": 0, "errmsg": "ns not found", "code": 26 };
//! let err = CommandError::from_reply(&reply);
//! assert_eq!(err.message, "ns not found");
//! assert_eq!(err.code_name.as_deref(), Some("NamespaceNotFound"));
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    AuthError, BulkWriteError, CommandError, ConfigError, ConnectionError, CursorError,
    ExecutionError, MongoshError, Result,
};
pub use mongo::{ErrorInfo, extract_error_info};
