//! Request contract.
//!
//! A [`Request`] knows how to put itself on a [`Connection`] and how to read
//! and decode its reply. Concrete request types usually only provide a name,
//! parameters, the error kinds they declare and a `parse` step; the default
//! `send` / `receive_response` handle the envelope.
//!
//! # Example
//!
//! ```
//! use linkwire_client::protocol::ErrorKind;
//! use linkwire_client::request::Request;
//! use linkwire_client::Result;
//! use serde_json::{json, Value};
//!
//! struct Login {
//!     user: String,
//!     password: String,
//! }
//!
//! impl Request for Login {
//!     type Output = u64;
//!
//!     fn name(&self) -> &str {
//!         "login"
//!     }
//!
//!     fn params(&self) -> Value {
//!         json!({"user": self.user, "password": self.password})
//!     }
//!
//!     fn declared_errors(&self) -> &[ErrorKind] {
//!         &[ErrorKind::InvalidCredentials, ErrorKind::RateLimit]
//!     }
//!
//!     fn parse(&self, body: Value) -> Result<u64> {
//!         Ok(serde_json::from_value(body["session"].clone())?)
//!     }
//! }
//! ```

mod json;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::{LinkError, Result, ServerError};
use crate::protocol::{build_request_document, BlockWidth, ErrorKind, Reply};

pub use json::JsonRequest;

/// One request/response exchange.
#[async_trait]
pub trait Request: Send + Sync {
    /// Decoded success value.
    type Output: Send + 'static;

    /// Request name, sent in the `"request"` field.
    fn name(&self) -> &str;

    /// JSON parameters merged into the request document.
    fn params(&self) -> Value {
        Value::Null
    }

    /// Optional binary payload sent as a wide block after the document.
    fn payload(&self) -> Option<Bytes> {
        None
    }

    /// Server error kinds this request expects. Anything else is an
    /// illegal protocol reply.
    fn declared_errors(&self) -> &[ErrorKind] {
        &[]
    }

    /// Decode a success body.
    fn parse(&self, body: Value) -> Result<Self::Output>;

    /// Put the request on the wire.
    async fn send(&self, conn: &Connection) -> Result<()> {
        let doc = build_request_document(self.name(), self.params());
        conn.send_json(&doc).await?;

        if let Some(payload) = self.payload() {
            conn.write_block(payload, BlockWidth::Wide).await?;
        }
        Ok(())
    }

    /// Read and decode the reply.
    async fn receive_response(&self, conn: &Connection) -> Result<Self::Output> {
        let doc: Value = conn.read_json().await?;
        let body = check_reply(self.name(), self.declared_errors(), doc)?;
        self.parse(body)
    }
}

/// Split a reply document into a success body or a typed error.
///
/// Error kinds outside `declared` (or unknown to this client) become
/// [`LinkError::IllegalProtocol`].
pub fn check_reply(request: &str, declared: &[ErrorKind], doc: Value) -> Result<Value> {
    match Reply::from_document(doc) {
        Reply::Ok(body) => Ok(body),
        Reply::Error { kind, message } => match ErrorKind::from_wire(&kind) {
            Some(known) if declared.contains(&known) => Err(LinkError::Protocol(ServerError {
                kind: known,
                message,
            })),
            _ => Err(LinkError::illegal(
                request,
                format!("undeclared error kind '{}'", kind),
            )),
        },
    }
}

/// Wrap any protocol error whose kind the request did not declare.
pub(crate) fn confine_errors<T>(request: &str, declared: &[ErrorKind], result: Result<T>) -> Result<T> {
    match result {
        Err(LinkError::Protocol(e)) if !declared.contains(&e.kind) => Err(LinkError::illegal(
            request,
            format!("undeclared error kind '{}'", e.kind),
        )),
        other => other,
    }
}
