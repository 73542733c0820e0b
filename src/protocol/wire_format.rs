//! Block length prefixes.
//!
//! Every block on the wire is a big-endian length prefix followed by exactly
//! that many payload bytes. Two prefix widths exist:
//!
//! ```text
//! Narrow (control data, strings)      Wide (documents, bulk payloads)
//! ┌──────────┬─────────────┐          ┌──────────┬─────────────┐
//! │ Length   │ Payload     │          │ Length   │ Payload     │
//! │ 2 bytes  │ 0..=65535   │          │ 4 bytes  │ 0..=2^31-1  │
//! │ uint16 BE│             │          │ uint32 BE│             │
//! └──────────┴─────────────┘          └──────────┴─────────────┘
//! ```

use crate::error::TransportError;

/// Prefix size of a narrow block.
pub const NARROW_PREFIX_SIZE: usize = 2;

/// Prefix size of a wide block.
pub const WIDE_PREFIX_SIZE: usize = 4;

/// Largest payload a narrow block can carry.
pub const NARROW_MAX_LEN: u32 = u16::MAX as u32;

/// Largest payload a wide block can carry (~2 GB, max i32).
pub const WIDE_MAX_LEN: u32 = 2_147_483_647;

/// Default guard for incoming JSON documents (16 MB).
pub const DEFAULT_MAX_DOCUMENT_SIZE: u32 = 16 * 1024 * 1024;

/// Width class of a block length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWidth {
    /// 2-byte prefix.
    Narrow,
    /// 4-byte prefix.
    Wide,
}

impl BlockWidth {
    /// Number of prefix bytes.
    #[inline]
    pub fn prefix_size(self) -> usize {
        match self {
            BlockWidth::Narrow => NARROW_PREFIX_SIZE,
            BlockWidth::Wide => WIDE_PREFIX_SIZE,
        }
    }

    /// Largest payload this width can describe.
    #[inline]
    pub fn max_len(self) -> u32 {
        match self {
            BlockWidth::Narrow => NARROW_MAX_LEN,
            BlockWidth::Wide => WIDE_MAX_LEN,
        }
    }

    /// Encode a length prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use linkwire_client::protocol::BlockWidth;
    ///
    /// let prefix = BlockWidth::Narrow.encode_prefix(300).unwrap();
    /// assert_eq!(prefix.as_bytes(), &[0x01, 0x2C]);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a framing error if `len` exceeds [`max_len`](Self::max_len).
    pub fn encode_prefix(self, len: usize) -> Result<Prefix, TransportError> {
        if len > self.max_len() as usize {
            return Err(TransportError::Framing(format!(
                "Block of {} bytes exceeds {:?} limit {}",
                len,
                self,
                self.max_len()
            )));
        }

        let mut bytes = [0u8; WIDE_PREFIX_SIZE];
        match self {
            BlockWidth::Narrow => bytes[..2].copy_from_slice(&(len as u16).to_be_bytes()),
            BlockWidth::Wide => bytes.copy_from_slice(&(len as u32).to_be_bytes()),
        }

        Ok(Prefix { bytes, width: self })
    }

    /// Decode a length prefix.
    ///
    /// Returns `None` if the buffer is shorter than the prefix.
    pub fn decode_prefix(self, buf: &[u8]) -> Option<u32> {
        match self {
            BlockWidth::Narrow if buf.len() >= NARROW_PREFIX_SIZE => {
                Some(u16::from_be_bytes([buf[0], buf[1]]) as u32)
            }
            BlockWidth::Wide if buf.len() >= WIDE_PREFIX_SIZE => {
                Some(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
            }
            _ => None,
        }
    }

    /// Check an advertised length against the width bound and a caller guard.
    ///
    /// Called before allocating the payload buffer, so a hostile peer cannot
    /// make us reserve memory it never sends.
    pub fn validate_len(self, len: u32, max_len: Option<u32>) -> Result<(), TransportError> {
        if len > self.max_len() {
            return Err(TransportError::Framing(format!(
                "Advertised length {} exceeds {:?} limit {}",
                len,
                self,
                self.max_len()
            )));
        }

        if let Some(limit) = max_len {
            if len > limit {
                return Err(TransportError::Framing(format!(
                    "Advertised length {} exceeds maximum {}",
                    len, limit
                )));
            }
        }

        Ok(())
    }
}

/// Encoded length prefix.
#[derive(Debug, Clone, Copy)]
pub struct Prefix {
    bytes: [u8; WIDE_PREFIX_SIZE],
    width: BlockWidth,
}

impl Prefix {
    /// The prefix bytes as they go on the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width.prefix_size()]
    }
}
