use std::fmt;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use super::kinds::{AuthError, CommandError, MongoshError};

/// Structured error information extracted from MongoDB errors.
///
/// This is intended to be serialized to JSON and consumed by logging.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to pretty-printed JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&CommandError> for ErrorInfo {
    fn from(err: &CommandError) -> Self {
        Self {
            error_type: Some("mongo.command_error".to_string()),
            code: err.code,
            name: err.code_name.clone(),
            message: Some(err.message.clone()),
        }
    }
}

/// Format MongoDB driver errors as compact JSON wrapped in an `error` field.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "{json_output}")
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.name = get_error_name(write_error.code);
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                    info.name = get_error_name(wc_error.code);
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code);
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Get a human-readable error name from a MongoDB error code.
pub(crate) fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        27 => "IndexNotFound",
        43 => "CursorNotFound",
        48 => "NamespaceExists",
        50 => "MaxTimeMSExpired",
        59 => "CommandNotFound",
        121 => "DocumentValidationFailure",
        _ => return None,
    };

    Some(name.to_string())
}

impl CommandError {
    /// Normalize a server reply (or a single write error entry) into a
    /// [`CommandError`].
    ///
    /// The message is taken from `errmsg`, then `err`, then `errMessage`.
    /// All remaining fields are kept in `details`.
    pub fn from_reply(reply: &Document) -> Self {
        let message = ["errmsg", "err", "errMessage"]
            .iter()
            .find_map(|key| reply.get_str(key).ok())
            .unwrap_or("unknown server error")
            .to_string();

        let code = match reply.get("code") {
            Some(Bson::Int32(c)) => Some(*c),
            Some(Bson::Int64(c)) => i32::try_from(*c).ok(),
            Some(Bson::Double(c)) => Some(*c as i32),
            _ => None,
        };

        let code_name = reply
            .get_str("codeName")
            .ok()
            .map(str::to_string)
            .or_else(|| code.and_then(get_error_name));

        let mut details = reply.clone();
        for key in ["errmsg", "err", "errMessage", "code", "codeName"] {
            details.remove(key);
        }

        Self {
            code,
            code_name,
            message,
            details,
        }
    }
}

impl From<mongodb::error::Error> for MongoshError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Command(command_error) => MongoshError::Command(CommandError {
                code: Some(command_error.code),
                code_name: if command_error.code_name.is_empty() {
                    get_error_name(command_error.code)
                } else {
                    Some(command_error.code_name.clone())
                },
                message: command_error.message.clone(),
                details: Document::new(),
            }),
            ErrorKind::Authentication { message, .. } => {
                MongoshError::Auth(AuthError::AuthenticationFailed(message.clone()))
            }
            _ => MongoshError::MongoDb(err),
        }
    }
}
