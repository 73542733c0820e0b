//! Request and reply document envelopes.
//!
//! A request document is a JSON object carrying its name under `"request"`
//! with parameters merged at top level:
//!
//! ```json
//! {"request": "login", "user": "ada", "password": "..."}
//! ```
//!
//! A reply carrying an `"error"` string is a server error; anything else is
//! a success body:
//!
//! ```json
//! {"error": "rate_limit", "message": "try again in 30s"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field naming the request type.
pub const REQUEST_FIELD: &str = "request";

/// Field carrying non-object parameters.
pub const PARAMS_FIELD: &str = "params";

/// Field carrying a server error kind.
pub const ERROR_FIELD: &str = "error";

/// Field carrying a server error message.
pub const MESSAGE_FIELD: &str = "message";

/// Closed set of error kinds a server may answer with.
///
/// Each request declares which of these it expects; anything else is
/// treated as an illegal protocol reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request document was rejected as malformed.
    SyntaxError,
    /// Too many requests.
    RateLimit,
    /// Login failed.
    InvalidCredentials,
    /// The referenced object does not exist.
    NotFound,
    /// The caller may not touch the referenced object.
    AccessDenied,
    /// The object to create already exists.
    AlreadyExists,
    /// A parameter was out of range or of the wrong shape.
    InvalidArgument,
    /// Internal server failure.
    ServerError,
}

impl ErrorKind {
    /// All kinds, in wire order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::SyntaxError,
        ErrorKind::RateLimit,
        ErrorKind::InvalidCredentials,
        ErrorKind::NotFound,
        ErrorKind::AccessDenied,
        ErrorKind::AlreadyExists,
        ErrorKind::InvalidArgument,
        ErrorKind::ServerError,
    ];

    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::ServerError => "server_error",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded reply document.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Success body (the whole document).
    Ok(Value),
    /// Server error; `kind` is the raw wire name, known or not.
    Error {
        /// Raw error kind name.
        kind: String,
        /// Optional message.
        message: Option<String>,
    },
}

impl Reply {
    /// Classify a reply document.
    pub fn from_document(doc: Value) -> Self {
        let kind = doc
            .get(ERROR_FIELD)
            .and_then(Value::as_str)
            .map(str::to_owned);

        match kind {
            Some(kind) => Reply::Error {
                kind,
                message: doc
                    .get(MESSAGE_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            None => Reply::Ok(doc),
        }
    }

    /// Build an error reply document (used by test peers and demos).
    pub fn error_document(kind: &str, message: Option<&str>) -> Value {
        let mut map = Map::new();
        map.insert(ERROR_FIELD.to_string(), Value::String(kind.to_string()));
        if let Some(m) = message {
            map.insert(MESSAGE_FIELD.to_string(), Value::String(m.to_string()));
        }
        Value::Object(map)
    }
}

/// Build a request document from a name and parameters.
///
/// Object parameters are merged at top level; any other value is carried
/// under `"params"`. The `"request"` field always wins over a parameter of
/// the same name.
///
/// # Example
///
/// ```
/// use linkwire_client::protocol::build_request_document;
/// use serde_json::json;
///
/// let doc = build_request_document("login", json!({"user": "ada"}));
/// assert_eq!(doc, json!({"request": "login", "user": "ada"}));
/// ```
pub fn build_request_document(name: &str, params: Value) -> Value {
    let mut map = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert(PARAMS_FIELD.to_string(), other);
            map
        }
    };
    map.insert(REQUEST_FIELD.to_string(), Value::String(name.to_string()));
    Value::Object(map)
}

/// Read the request name out of a request document.
pub fn request_name(doc: &Value) -> Option<&str> {
    doc.get(REQUEST_FIELD).and_then(Value::as_str)
}
