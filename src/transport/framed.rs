//! Framed transport: length-prefixed blocks over a [`Channel`].
//!
//! Every operation either moves one whole block or fails. A failed read may
//! leave the stream misaligned, so the owner must drop the transport after
//! any link fault (see [`TransportError::is_link_fault`]).
//!
//! Operations take `&mut self`; a transport is never shared between two
//! in-flight operations.

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream};

use super::channel::BoxedChannel;
use crate::codec::{JsonCodec, TextCodec};
use crate::error::TransportError;
use crate::protocol::{BlockWidth, DEFAULT_MAX_DOCUMENT_SIZE, WIDE_PREFIX_SIZE};

/// Length-prefixed block reader/writer over one channel.
pub struct Transport {
    stream: BufStream<BoxedChannel>,
    max_document_size: u32,
}

impl Transport {
    /// Bind a transport to an open channel.
    pub fn new(channel: BoxedChannel) -> Self {
        Self::with_max_document_size(channel, DEFAULT_MAX_DOCUMENT_SIZE)
    }

    /// Bind with a custom guard for incoming JSON documents.
    pub fn with_max_document_size(channel: BoxedChannel, max_document_size: u32) -> Self {
        Self {
            stream: BufStream::new(channel),
            max_document_size,
        }
    }

    /// Guard applied by [`read_json`](Self::read_json).
    pub fn max_document_size(&self) -> u32 {
        self.max_document_size
    }

    /// Write one block and flush it.
    ///
    /// # Errors
    ///
    /// Framing fault if the payload does not fit `width`; I/O fault otherwise.
    pub async fn write_block(
        &mut self,
        payload: &[u8],
        width: BlockWidth,
    ) -> Result<(), TransportError> {
        let prefix = width.encode_prefix(payload.len())?;

        self.stream.write_all(prefix.as_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one complete block.
    ///
    /// `max_len` guards against a peer advertising more than we are willing
    /// to buffer; it is checked before the payload buffer is allocated.
    ///
    /// # Errors
    ///
    /// Framing fault if the advertised length is over a limit or the peer
    /// closes mid-payload; I/O fault if the prefix cannot be read.
    pub async fn read_block(
        &mut self,
        width: BlockWidth,
        max_len: Option<u32>,
    ) -> Result<Bytes, TransportError> {
        let mut prefix = [0u8; WIDE_PREFIX_SIZE];
        let prefix = &mut prefix[..width.prefix_size()];
        self.stream.read_exact(prefix).await?;

        let len = width
            .decode_prefix(prefix)
            .ok_or_else(|| TransportError::Framing("Short length prefix".to_string()))?;
        width.validate_len(len, max_len)?;

        let mut payload = BytesMut::zeroed(len as usize);
        self.stream.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::Framing(format!("Peer closed inside a {}-byte block", len))
            } else {
                TransportError::Io(e)
            }
        })?;

        Ok(payload.freeze())
    }

    /// Send a value as a JSON document in a wide block.
    pub async fn send_json<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), TransportError> {
        let encoded = JsonCodec::encode(value)?;
        self.write_block(&encoded, BlockWidth::Wide).await
    }

    /// Read a JSON document from a wide block.
    ///
    /// # Errors
    ///
    /// Syntax fault if the block is not a valid document of type `T`.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let block = self
            .read_block(BlockWidth::Wide, Some(self.max_document_size))
            .await?;
        JsonCodec::decode(&block)
    }

    /// Send a UTF-8 string in a narrow block.
    pub async fn send_string(&mut self, text: &str) -> Result<(), TransportError> {
        self.write_block(&TextCodec::encode(text), BlockWidth::Narrow)
            .await
    }

    /// Read a UTF-8 string from a narrow block.
    pub async fn read_string(&mut self) -> Result<String, TransportError> {
        let block = self.read_block(BlockWidth::Narrow, None).await?;
        TextCodec::decode_owned(block)
    }

    /// Flush and shut down the write side of the channel.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("max_document_size", &self.max_document_size)
            .finish_non_exhaustive()
    }
}
