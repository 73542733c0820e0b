//! Client builder and facade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection. [`ClientBuilder::start`] then:
//! 1. Builds the [`Connection`] (TCP unless a connector is supplied)
//! 2. Brings it up through the [`Serializer`], with graduated backoff
//! 3. Spawns the [`ActionEngine`] worker
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use linkwire_client::request::JsonRequest;
//! use linkwire_client::Client;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("127.0.0.1")
//!         .port(7400)
//!         .recovery_interval(Duration::from_secs(5))
//!         .start()
//!         .await?;
//!
//!     let reply: Value = client
//!         .inquire(&JsonRequest::<Value>::new("ping", json!({})))
//!         .await?;
//!     println!("{}", reply);
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::action::{Action, ActionEngine, BoxFuture};
use crate::backoff::BackoffPolicy;
use crate::connection::{Connection, ConnectionConfig};
use crate::error::{LinkError, Result};
use crate::request::Request;
use crate::serializer::{Serializer, Session};
use crate::transport::{Connector, TcpConnector};

/// Builder for configuring and starting a [`Client`].
pub struct ClientBuilder {
    config: ConnectionConfig,
    connector: Option<Arc<dyn Connector>>,
    startup_backoff: BackoffPolicy,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
            connector: None,
            startup_backoff: BackoffPolicy::graduated(),
        }
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Server host.
    ///
    /// Default: `127.0.0.1`
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Server port.
    ///
    /// Default: 7400
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Time allowed for opening a channel.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Fixed delay between reconnect attempts after a link fault.
    ///
    /// Default: 5 seconds
    pub fn recovery_interval(mut self, interval: Duration) -> Self {
        self.config.recovery_interval = interval;
        self
    }

    /// Largest JSON document accepted from the server.
    ///
    /// Default: 16 MB
    pub fn max_document_size(mut self, size: u32) -> Self {
        self.config.max_document_size = size;
        self
    }

    /// Backoff used while bringing the connection up.
    ///
    /// Default: graduated, 2s doubling to 512s then +1s
    pub fn startup_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.startup_backoff = policy;
        self
    }

    /// Open channels through `connector` instead of plain TCP.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Connect (retrying with the startup backoff) and spawn the engine.
    ///
    /// # Errors
    ///
    /// [`LinkError::Stopped`] only if the connection is stopped while
    /// starting; otherwise this keeps retrying.
    pub async fn start(self) -> Result<Client> {
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TcpConnector::new()),
        };
        let connection = Arc::new(Connection::with_connector(self.config, connector));
        let serializer = Arc::new(Serializer::with_backoff(connection, self.startup_backoff));

        serializer.start().await?;
        let engine = ActionEngine::new(serializer);
        info!("client started");

        Ok(Client { engine })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A started client: a serialized connection plus its action engine.
#[derive(Debug)]
pub struct Client {
    engine: ActionEngine,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The action engine.
    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    /// The serializer.
    pub fn serializer(&self) -> &Arc<Serializer> {
        self.engine.serializer()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        self.engine.serializer().connection()
    }

    /// Run one exchange right away.
    pub async fn inquire<R>(&self, request: &R) -> Result<R::Output>
    where
        R: Request + ?Sized,
    {
        self.serializer().inquire(request).await
    }

    /// An UNQUEUED action performing `request`.
    pub fn submit<R>(&self, request: R) -> Action<R::Output>
    where
        R: Request + 'static,
        R::Output: Clone + Sync,
    {
        self.engine.submit(request)
    }

    /// An UNQUEUED action running `f` with exclusive use of the connection.
    pub fn action<T, F>(&self, f: F) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
        F: for<'s> Fn(&'s mut Session) -> BoxFuture<'s, Result<T>> + Send + Sync + 'static,
    {
        self.engine.action(f)
    }

    /// An already COMPLETE action holding `value`.
    pub fn completed<T>(&self, value: T) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.engine.completed(value)
    }

    /// An already COMPLETE action holding `error`.
    pub fn failed<T>(&self, error: LinkError) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.engine.failed(error)
    }

    /// Take the connection down and stop the engine worker.
    pub async fn stop(self) {
        self.engine.serializer().stop().await;
        self.engine.shutdown().await;
        info!("client stopped");
    }
}
