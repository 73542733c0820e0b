//! Transport module - channels and block framing.
//!
//! - [`Connector`] / [`Channel`]: how a byte stream to the server is opened
//! - [`Transport`]: length-prefixed blocks, JSON documents and strings on top

mod channel;
mod framed;

pub use channel::{BoxedChannel, Channel, Connector, TcpConnector};
pub use framed::Transport;
