//! Single-flight request serializer.
//!
//! Wraps one [`Connection`] and guarantees that request/response exchanges
//! alternate strictly: a [`Session`] holds the serializer's lock, and
//! `inquire` sends a request and reads its reply before the lock is given
//! up. Multi-step exchanges hold one `Session` across several inquiries.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use linkwire_client::request::JsonRequest;
//! use linkwire_client::{Connection, ConnectionConfig, Serializer};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> linkwire_client::Result<()> {
//! let connection = Arc::new(Connection::new(ConnectionConfig::new("127.0.0.1", 7400)));
//! let serializer = Serializer::new(connection);
//! serializer.start().await?;
//!
//! let reply: Value = serializer
//!     .inquire(&JsonRequest::<Value>::new("ping", json!({})))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::connection::Connection;
use crate::error::{LinkError, Result};
use crate::request::{confine_errors, Request};

/// Serializes request/response exchanges on one connection.
#[derive(Debug)]
pub struct Serializer {
    connection: Arc<Connection>,
    lock: Arc<Mutex<()>>,
    startup: BackoffPolicy,
    /// Bumped by `stop()` to cancel a `start()` that is still backing off.
    stops: watch::Sender<u64>,
}

impl Serializer {
    /// Create a serializer with the graduated startup backoff.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_backoff(connection, BackoffPolicy::graduated())
    }

    /// Create a serializer with a custom startup backoff.
    pub fn with_backoff(connection: Arc<Connection>, startup: BackoffPolicy) -> Self {
        let (stops, _) = watch::channel(0);
        Self {
            connection,
            lock: Arc::new(Mutex::new(())),
            startup,
            stops,
        }
    }

    /// The wrapped connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Bring the connection up, retrying with backoff until it works.
    ///
    /// # Errors
    ///
    /// [`LinkError::Stopped`] if [`stop`](Self::stop) is called while
    /// waiting between attempts.
    pub async fn start(&self) -> Result<()> {
        let mut stops = self.stops.subscribe();
        let generation = *stops.borrow();
        let mut backoff = Backoff::new(self.startup);

        loop {
            match self.connection.start().await {
                Ok(()) => {
                    info!(failures = backoff.failures(), "serializer started");
                    return Ok(());
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, ?delay, "connection startup failed, retrying");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stops.wait_for(|g| *g != generation) => return Err(LinkError::Stopped),
                    }
                }
            }
        }
    }

    /// Take the connection down. A pending `start()` gives up; in-flight
    /// exchanges fail with [`LinkError::Stopped`].
    pub async fn stop(&self) {
        self.stops.send_modify(|g| *g += 1);
        self.connection.stop().await;
    }

    /// Whether the connection currently has a live transport.
    pub fn is_live(&self) -> bool {
        self.connection.is_live()
    }

    /// Wait for exclusive use of the connection.
    pub async fn session(&self) -> Session {
        let guard = self.lock.clone().lock_owned().await;
        Session {
            connection: self.connection.clone(),
            _guard: guard,
        }
    }

    /// Run one exchange under a fresh session.
    pub async fn inquire<R>(&self, request: &R) -> Result<R::Output>
    where
        R: Request + ?Sized,
    {
        self.session().await.inquire(request).await
    }
}

/// Exclusive use of a serializer's connection. Dropping it releases the lock.
pub struct Session {
    connection: Arc<Connection>,
    _guard: OwnedMutexGuard<()>,
}

impl Session {
    /// Send `request` and read its reply.
    ///
    /// Dropping the returned future midway makes the connection reopen
    /// before the next exchange, so a late reply is never handed to another
    /// request.
    ///
    /// # Errors
    ///
    /// - [`LinkError::NotStarted`] if there is no live connection
    /// - [`LinkError::Protocol`] for a declared server error
    /// - [`LinkError::IllegalProtocol`] for any undeclared server error
    pub async fn inquire<R>(&mut self, request: &R) -> Result<R::Output>
    where
        R: Request + ?Sized,
    {
        if !self.connection.is_live() {
            return Err(LinkError::NotStarted);
        }

        let name = request.name();
        debug!(request = name, "inquire");

        let mut exchange = Exchange {
            connection: &self.connection,
            finished: false,
        };
        let result = async {
            request.send(&self.connection).await?;
            request.receive_response(&self.connection).await
        }
        .await;
        exchange.finished = true;

        if let Err(e) = &result {
            debug!(request = name, error = %e, "inquire failed");
        }
        confine_errors(name, request.declared_errors(), result)
    }

    /// The connection this session has exclusive use of.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

/// Marks the connection stale if an exchange is dropped before it ends.
struct Exchange<'a> {
    connection: &'a Connection,
    finished: bool,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.connection.abandon_exchange();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
