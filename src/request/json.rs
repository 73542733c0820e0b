//! Generic request: a name, JSON parameters and a `serde` output type.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Request;
use crate::error::Result;
use crate::protocol::ErrorKind;

/// Request whose reply body deserializes straight into `T`.
///
/// # Example
///
/// ```
/// use linkwire_client::protocol::ErrorKind;
/// use linkwire_client::request::{JsonRequest, Request};
/// use serde_json::{json, Value};
///
/// let request = JsonRequest::<Value>::new("find_user", json!({"id": 9}))
///     .declare(&[ErrorKind::NotFound]);
///
/// assert_eq!(request.name(), "find_user");
/// assert_eq!(request.declared_errors(), &[ErrorKind::NotFound]);
/// ```
pub struct JsonRequest<T> {
    name: String,
    params: Value,
    payload: Option<Bytes>,
    declared: Vec<ErrorKind>,
    _output: PhantomData<fn() -> T>,
}

impl<T> JsonRequest<T> {
    /// Create a request with the given name and parameters.
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
            payload: None,
            declared: Vec::new(),
            _output: PhantomData,
        }
    }

    /// Attach a binary payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Add error kinds this request expects.
    pub fn declare(mut self, kinds: &[ErrorKind]) -> Self {
        for kind in kinds {
            if !self.declared.contains(kind) {
                self.declared.push(*kind);
            }
        }
        self
    }
}

impl<T> fmt::Debug for JsonRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRequest")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("payload_len", &self.payload.as_ref().map(Bytes::len))
            .field("declared", &self.declared)
            .finish()
    }
}

impl<T> Request for JsonRequest<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Value {
        self.params.clone()
    }

    fn payload(&self) -> Option<Bytes> {
        self.payload.clone()
    }

    fn declared_errors(&self) -> &[ErrorKind] {
        &self.declared
    }

    fn parse(&self, body: Value) -> Result<T> {
        Ok(serde_json::from_value(body)?)
    }
}
