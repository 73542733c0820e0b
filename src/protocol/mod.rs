//! Protocol module - block framing and document envelopes.
//!
//! This module describes what goes on the wire:
//! - Narrow (2-byte) and wide (4-byte) big-endian block length prefixes
//! - Request documents tagged with their name
//! - Reply documents and the closed set of server error kinds

mod envelope;
mod wire_format;

pub use envelope::{
    build_request_document, request_name, ErrorKind, Reply, ERROR_FIELD, MESSAGE_FIELD,
    PARAMS_FIELD, REQUEST_FIELD,
};
pub use wire_format::{
    BlockWidth, Prefix, DEFAULT_MAX_DOCUMENT_SIZE, NARROW_MAX_LEN, NARROW_PREFIX_SIZE,
    WIDE_MAX_LEN, WIDE_PREFIX_SIZE,
};
