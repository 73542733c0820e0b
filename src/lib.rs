//! # linkwire-client
//!
//! Client-side engine for a request/response protocol over one long-lived
//! TCP connection.
//!
//! ## Architecture
//!
//! - **Transport**: length-prefixed blocks (2-byte strings, 4-byte JSON
//!   documents and payloads) over any [`Channel`](transport::Channel)
//! - **Connection**: owns the transport; every call goes through
//!   [`Connection::act`], which reconnects after link faults and retries
//! - **Serializer**: one request/response exchange in flight at a time
//! - **Actions**: deferred, chainable work run by a single worker task
//!
//! ## Example
//!
//! ```no_run
//! use linkwire_client::request::JsonRequest;
//! use linkwire_client::ClientBuilder;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> linkwire_client::Result<()> {
//!     let client = ClientBuilder::new().host("127.0.0.1").port(7400).start().await?;
//!
//!     let action = client.submit(JsonRequest::<Value>::new("echo", json!({"text": "hi"})));
//!     action.queue()?;
//!     println!("{}", action.get().await?);
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod backoff;
pub mod codec;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod request;
pub mod serializer;
pub mod transport;

mod client;

pub use action::{Action, ActionEngine, ActionState};
pub use client::{Client, ClientBuilder};
pub use connection::{Connection, ConnectionConfig};
pub use error::{LinkError, Result, ServerError, TransportError};
pub use protocol::ErrorKind;
pub use request::{JsonRequest, Request};
pub use serializer::{Serializer, Session};
