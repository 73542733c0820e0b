//! Asynchronous actions: deferred, chainable request work.
//!
//! An [`Action`] wraps a body that runs with exclusive use of the
//! connection (a [`Session`]). It runs at most once per action, either on
//! the engine's worker after [`Action::queue`] or inline on the first
//! [`Action::get`].
//!
//! # State machine
//!
//! ```text
//!              queue() / first get()            body finished
//!   UNQUEUED ─────────────────────────► QUEUED ──────────────► COMPLETE
//! ```
//!
//! Queuing an action that is already QUEUED or COMPLETE does nothing.
//!
//! # Chaining
//!
//! [`then`](Action::then), [`then_inquire`](Action::then_inquire),
//! [`handle`](Action::handle) and [`then_action`](Action::then_action) build
//! a new UNQUEUED action whose body runs the parent's body first, inside the
//! same session. The parent's result is not shared: every run of a
//! descendant replays the whole chain.
//!
//! Calling `get()` on another action from inside a body deadlocks on the
//! session lock; compose with `then_action` instead.
//!
//! # Example
//!
//! ```no_run
//! use linkwire_client::request::JsonRequest;
//! use linkwire_client::ClientBuilder;
//! use serde_json::{json, Value};
//!
//! # async fn example() -> linkwire_client::Result<()> {
//! let client = ClientBuilder::new().port(7400).start().await?;
//!
//! let user = client.submit(JsonRequest::<Value>::new("find_user", json!({"id": 1})));
//! let name = user.then(|doc| Ok(doc["name"].as_str().unwrap_or_default().to_string()));
//!
//! name.queue()?;
//! println!("{}", name.get().await?);
//! # Ok(())
//! # }
//! ```

mod engine;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::request::Request;
use crate::serializer::Session;

pub use engine::ActionEngine;
use engine::{EngineHandle, Job};

/// Boxed future for action bodies.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The work an action performs with exclusive use of the connection.
type Body<T> = Arc<dyn for<'s> Fn(&'s mut Session) -> BoxFuture<'s, Result<T>> + Send + Sync>;

fn body<T, F>(f: F) -> Body<T>
where
    F: for<'s> Fn(&'s mut Session) -> BoxFuture<'s, Result<T>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Observable state of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Created, not yet claimed.
    Unqueued,
    /// Claimed by the worker or an inline `get()`.
    Queued,
    /// Result available.
    Complete,
}

enum Slot<T> {
    Unqueued,
    Queued,
    Complete(Result<T>),
}

impl<T> Slot<T> {
    fn state(&self) -> ActionState {
        match self {
            Slot::Unqueued => ActionState::Unqueued,
            Slot::Queued => ActionState::Queued,
            Slot::Complete(_) => ActionState::Complete,
        }
    }
}

impl<T: Clone> Slot<T> {
    fn outcome(&self) -> Option<Result<T>> {
        match self {
            Slot::Complete(result) => Some(result.clone()),
            _ => None,
        }
    }
}

struct Inner<T> {
    body: Body<T>,
    slot: watch::Sender<Slot<T>>,
    cancelled: AtomicBool,
    constant: bool,
    engine: EngineHandle,
}

impl<T> Inner<T> {
    /// UNQUEUED -> QUEUED. Returns whether this call made the transition.
    fn claim(&self) -> bool {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Unqueued) {
                *slot = Slot::Queued;
                true
            } else {
                false
            }
        })
    }

    fn complete(&self, result: Result<T>) {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Complete(_)) {
                false
            } else {
                *slot = Slot::Complete(result);
                true
            }
        });
    }
}

/// Completes a claimed action with [`LinkError::Interrupted`] unless it
/// already holds a result when this is dropped.
struct Claimed<'a, T>(&'a Inner<T>);

impl<T> Drop for Claimed<'_, T> {
    fn drop(&mut self) {
        self.0.complete(Err(LinkError::Interrupted));
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn execute(&self) -> Result<T> {
        let _claimed = Claimed(self);
        let mut session = self.engine.serializer.session().await;

        let result = if self.cancelled.load(Ordering::Acquire) {
            debug!("action cancelled before start");
            Err(LinkError::Skipped)
        } else {
            (self.body)(&mut session).await
        };
        drop(session);

        self.complete(result.clone());
        result
    }
}

impl<T> Job for Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn run(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(e) = self.execute().await {
                debug!(error = %e, "queued action failed");
            }
        })
    }

    fn abandon(&self) {
        self.complete(Err(LinkError::EngineShutdown));
    }
}

/// Handle to deferred work producing a `T`.
///
/// Cloning shares the same action.
pub struct Action<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Action<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(engine: EngineHandle, body: Body<T>) -> Self {
        let (slot, _) = watch::channel(Slot::Unqueued);
        Self {
            inner: Arc::new(Inner {
                body,
                slot,
                cancelled: AtomicBool::new(false),
                constant: false,
                engine,
            }),
        }
    }

    fn constant(engine: EngineHandle, result: Result<T>) -> Self {
        let stored = result.clone();
        let body = body(move |_session| {
            let result = stored.clone();
            Box::pin(async move { result })
        });
        let (slot, _) = watch::channel(Slot::Complete(result));

        Self {
            inner: Arc::new(Inner {
                body,
                slot,
                cancelled: AtomicBool::new(false),
                constant: true,
                engine,
            }),
        }
    }

    fn derive<U>(&self, body: Body<U>) -> Action<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        Action::new(self.inner.engine.clone(), body)
    }

    /// Current state.
    pub fn state(&self) -> ActionState {
        self.inner.slot.borrow().state()
    }

    /// Whether a result is available.
    pub fn is_complete(&self) -> bool {
        self.state() == ActionState::Complete
    }

    /// Hand the action to the engine's worker. Returns immediately.
    ///
    /// Does nothing if the action is already queued or complete.
    ///
    /// # Errors
    ///
    /// - [`LinkError::ConstantQueued`] for actions made by
    ///   [`ActionEngine::completed`] / [`ActionEngine::failed`]
    /// - [`LinkError::EngineShutdown`] if the worker has exited
    pub fn queue(&self) -> Result<()> {
        if self.inner.constant {
            return Err(LinkError::ConstantQueued);
        }
        if !self.inner.claim() {
            return Ok(());
        }

        let job: Arc<dyn Job> = self.inner.clone();
        if let Err(e) = self.inner.engine.enqueue(job) {
            self.inner.complete(Err(e.clone()));
            return Err(e);
        }
        Ok(())
    }

    /// Wait for the result.
    ///
    /// An UNQUEUED action runs right here, under the serializer lock.
    /// A COMPLETE action returns its stored result without network access.
    pub async fn get(&self) -> Result<T> {
        if self.inner.claim() {
            return self.inner.execute().await;
        }

        let mut slot = self.inner.slot.subscribe();
        let outcome = match slot.wait_for(|s| matches!(s, Slot::Complete(_))).await {
            Ok(done) => done.outcome(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(LinkError::EngineShutdown))
    }

    /// Wait for the result and return its fault, if any.
    pub async fn get_exception(&self) -> Option<LinkError> {
        self.get().await.err()
    }

    /// The value, if the action completed successfully.
    pub fn poll(&self) -> Option<T> {
        match &*self.inner.slot.borrow() {
            Slot::Complete(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The fault, if the action completed with one.
    pub fn poll_exception(&self) -> Option<LinkError> {
        match &*self.inner.slot.borrow() {
            Slot::Complete(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Ask the action not to run. Only effective before it starts; it then
    /// completes with [`LinkError::Skipped`]. Returns `false` if the action
    /// had already completed.
    pub fn cancel(&self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.inner.cancelled.store(true, Ordering::Release);
        true
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Chain a transformation of the success value.
    pub fn then<U, F>(&self, f: F) -> Action<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let parent = self.inner.body.clone();
        let f = Arc::new(f);

        self.derive(body::<U, _>(move |session| {
            let parent = parent.clone();
            let f = f.clone();
            Box::pin(async move { f(parent(session).await?) })
        }))
    }

    /// Chain a follow-up request built from the success value, sent in the
    /// same session.
    pub fn then_inquire<R, F>(&self, f: F) -> Action<R::Output>
    where
        R: Request + 'static,
        R::Output: Clone + Sync,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let parent = self.inner.body.clone();
        let f = Arc::new(f);

        self.derive(body::<R::Output, _>(move |session| {
            let parent = parent.clone();
            let f = f.clone();
            Box::pin(async move {
                let value = parent(&mut *session).await?;
                let request = f(value);
                session.inquire(&request).await
            })
        }))
    }

    /// Chain a function of the whole outcome, success or fault.
    pub fn handle<U, F>(&self, f: F) -> Action<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(Result<T>) -> Result<U> + Send + Sync + 'static,
    {
        let parent = self.inner.body.clone();
        let f = Arc::new(f);

        self.derive(body::<U, _>(move |session| {
            let parent = parent.clone();
            let f = f.clone();
            Box::pin(async move { f(parent(session).await) })
        }))
    }

    /// Chain another action chosen from the success value.
    ///
    /// A returned action that is already complete contributes its stored
    /// result; otherwise its body runs in this session.
    pub fn then_action<U, F>(&self, f: F) -> Action<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Action<U> + Send + Sync + 'static,
    {
        let parent = self.inner.body.clone();
        let f = Arc::new(f);

        self.derive(body::<U, _>(move |session| {
            let parent = parent.clone();
            let f = f.clone();
            Box::pin(async move {
                let next = f(parent(&mut *session).await?);

                let stored = next.inner.slot.borrow().outcome();
                if let Some(result) = stored {
                    return result;
                }
                if next.is_cancelled() {
                    return Err(LinkError::Skipped);
                }
                (next.inner.body)(session).await
            })
        }))
    }
}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.slot.borrow().state();
        f.debug_struct("Action")
            .field("state", &state)
            .field("constant", &self.inner.constant)
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}
