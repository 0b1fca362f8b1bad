use std::sync::Arc;
use std::{fmt, io};

use bson::Document;

use crate::bulk::BulkWriteResult;
use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`MongoshError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, MongoshError>;

/// Top-level error type for mongosh-client operations.
///
/// The type is `Clone` so that a single failed connection attempt can be
/// handed to every caller that was waiting on it.
#[derive(Debug, Clone)]
pub enum MongoshError {
    /// Transport errors: refused connections, network failures.
    Connection(ConnectionError),

    /// Authentication errors.
    Auth(AuthError),

    /// Error documents returned by the server.
    Command(CommandError),

    /// Operating on a cursor in a state that does not allow it.
    Cursor(CursorError),

    /// Caller-contract and unsupported-operation errors.
    Execution(ExecutionError),

    /// A bulk execution failed; carries the counts aggregated so far.
    Bulk(BulkWriteError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(Arc<io::Error>),

    /// MongoDB driver errors that are neither command nor auth failures.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// The topology has no usable members.
    InvalidTopology(String),

    /// Connection lost.
    Disconnected,
}

/// Authentication-specific errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Authentication failed.
    AuthenticationFailed(String),
}

/// A normalized server error document.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandError {
    /// Server error code, when the server supplied one.
    pub code: Option<i32>,

    /// Symbolic code name (`NamespaceNotFound`, `DuplicateKey`, ...).
    pub code_name: Option<String>,

    /// Error message as reported by the server.
    pub message: String,

    /// Every other field of the reply.
    pub details: Document,
}

/// Cursor-state errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The cursor was destroyed.
    Closed,

    /// Cursor-level failure reported while fetching.
    FetchFailed(String),
}

/// Execution-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Operation not supported for this target.
    UnsupportedOperation(String),

    /// Invalid operation parameters.
    InvalidParameters(String),

    /// Unexpected reply shape from the server.
    UnexpectedReply(String),

    /// `execute()` was called on a spent bulk operation.
    BulkAlreadyExecuted,
}

/// Bulk execution failure with the partial result attached.
#[derive(Debug, Clone)]
pub struct BulkWriteError {
    /// Counts aggregated before (and including) the failing batch.
    pub result: BulkWriteResult,

    /// What made the execution fail.
    pub cause: Box<MongoshError>,
}

/// Configuration-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl MongoshError {
    /// Whether this error came from the transport rather than the server.
    pub fn is_transport(&self) -> bool {
        use mongodb::error::ErrorKind;

        match self {
            MongoshError::Connection(_) | MongoshError::Io(_) => true,
            MongoshError::MongoDb(e) => matches!(
                e.kind.as_ref(),
                ErrorKind::Io(_)
                    | ErrorKind::ServerSelection { .. }
                    | ErrorKind::ConnectionPoolCleared { .. }
            ),
            _ => false,
        }
    }

    /// Whether the server reported that the namespace does not exist.
    pub fn is_namespace_not_found(&self) -> bool {
        match self {
            MongoshError::Command(e) => e.code == Some(26) || e.message == "ns not found",
            _ => false,
        }
    }

    /// Shorthand for a caller-contract violation.
    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        MongoshError::Execution(ExecutionError::InvalidParameters(msg.into()))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for MongoshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MongoshError::Connection(e) => write!(f, "Connection error: {e}"),
            MongoshError::Auth(e) => write!(f, "Authentication error: {e}"),
            MongoshError::Command(e) => write!(f, "{e}"),
            MongoshError::Cursor(e) => write!(f, "Cursor error: {e}"),
            MongoshError::Execution(e) => write!(f, "Execution error: {e}"),
            MongoshError::Bulk(e) => write!(f, "{e}"),
            MongoshError::Config(e) => write!(f, "Configuration error: {e}"),
            MongoshError::Io(e) => write!(f, "I/O error: {e}"),
            MongoshError::MongoDb(e) => format_mongodb_error(f, e),
            MongoshError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidTopology(msg) => write!(f, "Invalid topology: {msg}"),
            ConnectionError::Disconnected => write!(f, "Connection lost"),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {msg}")
            }
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.code_name) {
            (Some(code), Some(name)) => {
                write!(f, "Command failed: {} ({name}, code {code})", self.message)
            }
            (Some(code), None) => write!(f, "Command failed: {} (code {code})", self.message),
            _ => write!(f, "Command failed: {}", self.message),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Closed => write!(f, "cursor closed"),
            CursorError::FetchFailed(msg) => write!(f, "fetch failed: {msg}"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::UnsupportedOperation(op) => {
                write!(f, "Unsupported operation: {op}")
            }
            ExecutionError::InvalidParameters(msg) => write!(f, "Invalid parameters: {msg}"),
            ExecutionError::UnexpectedReply(msg) => write!(f, "Unexpected reply: {msg}"),
            ExecutionError::BulkAlreadyExecuted => {
                write!(f, "Bulk operation has already been executed")
            }
        }
    }
}

impl fmt::Display for BulkWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bulk write failed after {} inserted, {} updated, {} removed: {}",
            self.result.n_inserted, self.result.n_updated, self.result.n_removed, self.cause
        )
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for MongoshError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for AuthError {}
impl std::error::Error for CommandError {}
impl std::error::Error for CursorError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for BulkWriteError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to MongoshError ========================= */

impl From<io::Error> for MongoshError {
    fn from(err: io::Error) -> Self {
        MongoshError::Io(Arc::new(err))
    }
}

impl From<ConnectionError> for MongoshError {
    fn from(err: ConnectionError) -> Self {
        MongoshError::Connection(err)
    }
}

impl From<AuthError> for MongoshError {
    fn from(err: AuthError) -> Self {
        MongoshError::Auth(err)
    }
}

impl From<CommandError> for MongoshError {
    fn from(err: CommandError) -> Self {
        MongoshError::Command(err)
    }
}

impl From<CursorError> for MongoshError {
    fn from(err: CursorError) -> Self {
        MongoshError::Cursor(err)
    }
}

impl From<ExecutionError> for MongoshError {
    fn from(err: ExecutionError) -> Self {
        MongoshError::Execution(err)
    }
}

impl From<BulkWriteError> for MongoshError {
    fn from(err: BulkWriteError) -> Self {
        MongoshError::Bulk(err)
    }
}

impl From<ConfigError> for MongoshError {
    fn from(err: ConfigError) -> Self {
        MongoshError::Config(err)
    }
}

impl From<String> for MongoshError {
    fn from(msg: String) -> Self {
        MongoshError::Generic(msg)
    }
}

impl From<&str> for MongoshError {
    fn from(msg: &str) -> Self {
        MongoshError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn server_error(code: Option<i32>, message: &str) -> MongoshError {
        MongoshError::Command(CommandError {
            code,
            code_name: None,
            message: message.to_string(),
            details: doc! {},
        })
    }

    #[test]
    fn test_namespace_not_found_by_code_or_message() {
        assert!(server_error(Some(26), "whatever").is_namespace_not_found());
        assert!(server_error(None, "ns not found").is_namespace_not_found());
        assert!(!server_error(Some(11000), "E11000 duplicate key").is_namespace_not_found());
        assert!(!MongoshError::Generic("ns not found".into()).is_namespace_not_found());
    }

    #[test]
    fn test_transport_classification() {
        let err = MongoshError::from(ConnectionError::ConnectionFailed("refused".into()));
        assert!(err.is_transport());
        assert!(!server_error(Some(26), "ns not found").is_transport());
        assert!(!MongoshError::from(CursorError::Closed).is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = MongoshError::Command(CommandError {
            code: Some(11000),
            code_name: Some("DuplicateKey".into()),
            message: "dup".into(),
            details: doc! {},
        });
        assert_eq!(err.to_string(), "Command failed: dup (DuplicateKey, code 11000)");
        assert_eq!(
            MongoshError::from(CursorError::Closed).to_string(),
            "Cursor error: cursor closed"
        );
    }
}
