//! JSON codec using `serde_json`.
//!
//! Documents are encoded compactly (no pretty printing) so the block length
//! is the document length. Decoding failures are syntax faults, never
//! framing faults: the block itself was read completely, so the stream is
//! still aligned.
//!
//! # Example
//!
//! ```
//! use linkwire_client::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Message = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TransportError;

/// JSON codec for structured documents.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns a syntax fault if the value cannot be serialized
    /// (e.g. a map with non-string keys).
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns a syntax fault if the bytes are not a valid document of type T.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
