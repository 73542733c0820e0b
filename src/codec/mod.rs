//! Codec module - encoding/decoding of block payloads.
//!
//! - [`JsonCodec`] - structured documents via `serde_json`
//! - [`TextCodec`] - UTF-8 strings
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the transport picks one at compile time per operation.
//!
//! # Example
//!
//! ```
//! use linkwire_client::codec::{JsonCodec, TextCodec};
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! let decoded: String = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let text = TextCodec::encode("plain");
//! assert_eq!(TextCodec::decode(&text).unwrap(), "plain");
//! ```

mod json;
mod text;

pub use json::JsonCodec;
pub use text::TextCodec;
