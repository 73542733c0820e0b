//! Text codec - UTF-8 strings as block payloads.
//!
//! Strings always travel as UTF-8. Encoding borrows where it can.
//!
//! # Example
//!
//! ```
//! use linkwire_client::codec::TextCodec;
//!
//! let bytes = TextCodec::encode("grüße");
//! assert_eq!(TextCodec::decode(&bytes).unwrap(), "grüße");
//! ```

use bytes::Bytes;

use crate::error::TransportError;

/// UTF-8 text codec.
pub struct TextCodec;

impl TextCodec {
    /// Encode a string (copies into `Bytes`).
    #[inline]
    pub fn encode(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    /// Decode a payload as UTF-8 without copying.
    ///
    /// # Errors
    ///
    /// Returns a syntax fault if the payload is not valid UTF-8.
    #[inline]
    pub fn decode(data: &[u8]) -> Result<&str, TransportError> {
        std::str::from_utf8(data)
            .map_err(|e| TransportError::Syntax(format!("Invalid UTF-8 in string block: {}", e)))
    }

    /// Decode an owned payload into a `String`.
    pub fn decode_owned(data: Bytes) -> Result<String, TransportError> {
        Self::decode(&data).map(str::to_owned)
    }
}
