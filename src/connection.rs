//! Connection lifecycle and transparent recovery.
//!
//! A [`Connection`] owns at most one live [`Transport`]. Every transport
//! call goes through [`Connection::act`], which absorbs I/O and framing
//! faults: it drops the broken transport, waits the recovery interval and
//! reopens the channel until that works, then retries the operation.
//!
//! # Lifecycle
//!
//! ```text
//!            start() ok
//!   STOPPED ───────────► LIVE ──┐ link fault: reopen, retry
//!      ▲                  │ ▲   │
//!      └──── stop() ──────┘ └───┘
//! ```
//!
//! `stop()` bumps a lifecycle counter published on a `watch` channel. A
//! recovering `act()` races its sleeps against that channel and re-checks
//! the counter under the transport lock before installing a reopened
//! transport, so an intentional stop is never undone by a reconnect.
//!
//! An exchange abandoned halfway (its future dropped between writing a
//! request and reading the reply) leaves unread bytes on the stream. The
//! caller marks the connection stale and the next `act()` reopens the
//! channel before running anything on it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn, Instrument};

use crate::backoff::{Backoff, BackoffPolicy, DEFAULT_RECOVERY_INTERVAL};
use crate::codec::{JsonCodec, TextCodec};
use crate::error::{LinkError, Result, TransportError};
use crate::protocol::{BlockWidth, DEFAULT_MAX_DOCUMENT_SIZE};
use crate::transport::{Connector, TcpConnector, Transport};

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 7400;

/// Default time allowed for opening a channel (including its handshake).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future returned by an operation passed to [`Connection::act`].
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = std::result::Result<T, TransportError>> + Send + 'a>>;

/// Connection settings.
///
/// Durations are (de)serialized as seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Time allowed for opening a channel.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Fixed delay between reconnect attempts during recovery.
    #[serde(with = "duration_secs")]
    pub recovery_interval: Duration,
    /// Largest JSON document accepted from the server.
    pub max_document_size: u32,
}

impl ConnectionConfig {
    /// Config for `host:port` with default timings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Published lifecycle of a connection.
#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    /// Number of `stop()` calls so far.
    stops: u64,
    /// Whether the last lifecycle call was `stop()` (or none yet).
    stopped: bool,
}

/// One logical connection to the server.
///
/// Not a mutex: two operations must never be in flight at once. The
/// [`Serializer`](crate::Serializer) guarantees that for its callers.
pub struct Connection {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    transport: Mutex<Option<Transport>>,
    lifecycle: watch::Sender<Lifecycle>,
    live: AtomicBool,
    /// Set when the installed transport may hold a half-finished exchange.
    stale: AtomicBool,
    restarts: AtomicU64,
    span: tracing::Span,
}

impl Connection {
    /// Create a stopped connection using plain TCP.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    /// Create a stopped connection using a custom connector.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let span = tracing::info_span!("connection", host = %config.host, port = config.port);
        let (lifecycle, _) = watch::channel(Lifecycle {
            stops: 0,
            stopped: true,
        });

        Self {
            config,
            connector,
            transport: Mutex::new(None),
            lifecycle,
            live: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            restarts: AtomicU64::new(0),
            span,
        }
    }

    /// Settings this connection was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether a transport is currently installed.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Number of transports reopened by recovery so far.
    #[inline]
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Acquire)
    }

    /// Close any previous transport and open a fresh one.
    ///
    /// Does not retry.
    ///
    /// # Errors
    ///
    /// [`LinkError::Startup`] if the channel cannot be opened in time.
    pub async fn start(&self) -> Result<()> {
        async {
            let mut slot = self.transport.lock().await;
            if let Some(mut old) = slot.take() {
                self.live.store(false, Ordering::Release);
                let _ = old.shutdown().await;
            }

            self.stale.store(false, Ordering::Release);
            self.lifecycle.send_modify(|l| l.stopped = false);

            let transport = self.open_transport().await?;
            *slot = Some(transport);
            self.live.store(true, Ordering::Release);
            info!("connection started");
            Ok::<(), LinkError>(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Drop the transport and fail any pending `act()` with `Stopped`.
    pub async fn stop(&self) {
        self.lifecycle.send_modify(|l| {
            l.stops += 1;
            l.stopped = true;
        });

        let mut slot = self.transport.lock().await;
        self.stale.store(false, Ordering::Release);
        if let Some(mut transport) = slot.take() {
            self.live.store(false, Ordering::Release);
            let _ = transport.shutdown().await;
        }

        info!(parent: &self.span, "connection stopped");
    }

    /// Mark the installed transport as out of step with the server.
    ///
    /// Called when an exchange is dropped between its request and its
    /// reply. The next [`act`](Self::act) discards the transport and
    /// reopens the channel at once, so an orphaned reply is never read as
    /// the answer to a later request.
    pub fn abandon_exchange(&self) {
        if !self.stale.swap(true, Ordering::AcqRel) {
            warn!(parent: &self.span, "exchange abandoned midway, transport will be reopened");
        }
    }

    /// Alias for [`stop`](Self::stop).
    pub async fn close(&self) {
        self.stop().await
    }

    /// Run a transport operation, recovering from link faults.
    ///
    /// On an I/O or framing fault the broken transport is dropped, the
    /// channel is reopened every `recovery_interval` until that succeeds,
    /// and `op` runs again. There is no retry cap.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Stopped`] if `stop()` is called while this is pending
    /// - [`LinkError::NotStarted`] if the connection was never started
    /// - [`LinkError::Syntax`] if `op` reports a malformed document
    pub async fn act<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut Transport) -> OpFuture<'a, T> + Send,
        T: Send,
    {
        self.act_inner(op).instrument(self.span.clone()).await
    }

    async fn act_inner<T, F>(&self, mut op: F) -> Result<T>
    where
        F: for<'a> FnMut(&'a mut Transport) -> OpFuture<'a, T> + Send,
        T: Send,
    {
        let mut lifecycle = self.lifecycle.subscribe();
        let stops = lifecycle.borrow().stops;

        loop {
            {
                let mut slot = self.transport.lock().await;
                if self.stale.swap(false, Ordering::AcqRel) && slot.take().is_some() {
                    self.live.store(false, Ordering::Release);
                    drop(slot);
                    self.recover(&mut lifecycle, stops, true).await?;
                    continue;
                }

                let Some(transport) = slot.as_mut() else {
                    let l = *lifecycle.borrow();
                    return Err(if l.stopped && l.stops > 0 {
                        LinkError::Stopped
                    } else {
                        LinkError::NotStarted
                    });
                };

                let outcome = tokio::select! {
                    r = op(transport) => r,
                    _ = lifecycle.wait_for(|l| l.stops != stops) => return Err(LinkError::Stopped),
                };

                match outcome {
                    Ok(value) => return Ok(value),
                    Err(e) if !e.is_link_fault() => return Err(syntax_fault(e)),
                    Err(e) => {
                        warn!(error = %e, "transport fault, restarting connection");
                        slot.take();
                        self.live.store(false, Ordering::Release);
                    }
                }
            }

            self.recover(&mut lifecycle, stops, false).await?;
        }
    }

    /// Reopen the channel, sleeping the recovery interval between attempts.
    ///
    /// With `immediate` the first attempt is made without waiting.
    async fn recover(
        &self,
        lifecycle: &mut watch::Receiver<Lifecycle>,
        stops: u64,
        immediate: bool,
    ) -> Result<()> {
        let mut backoff = Backoff::new(BackoffPolicy::fixed(self.config.recovery_interval));
        let mut wait = !immediate;

        loop {
            if wait {
                let delay = backoff.next_delay();
                debug!(?delay, attempt = backoff.failures(), "waiting before reconnect");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = lifecycle.wait_for(|l| l.stops != stops) => return Err(LinkError::Stopped),
                }
            }
            wait = true;

            let reopened = match self.open_transport().await {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                    continue;
                }
            };

            let mut slot = self.transport.lock().await;
            if lifecycle.borrow().stops != stops {
                return Err(LinkError::Stopped);
            }
            if slot.is_some() {
                debug!("transport already reopened by start(), discarding ours");
                return Ok(());
            }
            *slot = Some(reopened);
            self.live.store(true, Ordering::Release);
            self.restarts.fetch_add(1, Ordering::AcqRel);
            info!(attempts = backoff.failures(), "connection restored");
            return Ok(());
        }
    }

    async fn open_transport(&self) -> Result<Transport> {
        let ConnectionConfig {
            host,
            port,
            connect_timeout,
            ..
        } = &self.config;

        let opened = tokio::time::timeout(
            *connect_timeout,
            self.connector.open(host, *port, *connect_timeout),
        )
        .await;

        let channel = match opened {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(self.startup_error(e.to_string())),
            Err(_) => {
                return Err(self.startup_error(format!("timed out after {:?}", connect_timeout)))
            }
        };

        Ok(Transport::with_max_document_size(
            channel,
            self.config.max_document_size,
        ))
    }

    fn startup_error(&self, reason: String) -> LinkError {
        LinkError::Startup {
            host: self.config.host.clone(),
            port: self.config.port,
            reason,
        }
    }

    /// Write one block (recovering from link faults).
    pub async fn write_block(&self, payload: Bytes, width: BlockWidth) -> Result<()> {
        self.act(move |t| {
            let payload = payload.clone();
            Box::pin(async move { t.write_block(&payload, width).await })
        })
        .await
    }

    /// Read one block (recovering from link faults).
    pub async fn read_block(&self, width: BlockWidth, max_len: Option<u32>) -> Result<Bytes> {
        self.act(move |t| Box::pin(t.read_block(width, max_len)))
            .await
    }

    /// Send a JSON document (recovering from link faults).
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let encoded = JsonCodec::encode(value).map_err(syntax_fault)?;
        self.write_block(Bytes::from(encoded), BlockWidth::Wide)
            .await
    }

    /// Read a JSON document (recovering from link faults).
    pub async fn read_json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.act(|t| Box::pin(t.read_json::<T>())).await
    }

    /// Send a UTF-8 string (recovering from link faults).
    pub async fn send_string(&self, text: &str) -> Result<()> {
        self.write_block(TextCodec::encode(text), BlockWidth::Narrow)
            .await
    }

    /// Read a UTF-8 string (recovering from link faults).
    pub async fn read_string(&self) -> Result<String> {
        self.act(|t| Box::pin(t.read_string())).await
    }
}

/// Report a transport fault that leaves the link usable.
fn syntax_fault(e: TransportError) -> LinkError {
    match e {
        TransportError::Syntax(msg) => LinkError::Syntax(msg),
        other => LinkError::Syntax(other.to_string()),
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("live", &self.is_live())
            .field("restarts", &self.restarts())
            .finish_non_exhaustive()
    }
}
