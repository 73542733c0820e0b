//! Single-worker action engine.
//!
//! Queued actions go through an unbounded mpsc channel to one worker task,
//! which runs them in FIFO order, each under its own serializer session.
//!
//! ```text
//! Action::queue() ─┐
//! Action::queue() ─┼─► mpsc::UnboundedSender<Job> ─► Worker ─► Serializer
//! Action::queue() ─┘
//! ```
//!
//! Each action runs in its own task so a panicking body only takes that
//! action down: it completes with [`LinkError::Interrupted`] and the worker
//! moves on to the next one.
//!
//! The worker exits on [`ActionEngine::shutdown`] or when the engine is
//! dropped. Actions still in the channel then complete with
//! [`LinkError::EngineShutdown`]; the action running at that moment is
//! allowed to finish.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{body, Action, BoxFuture};
use crate::error::{LinkError, Result};
use crate::request::Request;
use crate::serializer::{Serializer, Session};

/// Type-erased queued action.
pub(crate) trait Job: Send + Sync {
    /// Run the action and store its result.
    fn run(self: Arc<Self>) -> BoxFuture<'static, ()>;

    /// Complete the action without running it.
    fn abandon(&self);
}

/// What every action keeps of its engine. Cheap to clone.
#[derive(Clone)]
pub(crate) struct EngineHandle {
    pub(crate) serializer: Arc<Serializer>,
    jobs: mpsc::UnboundedSender<Arc<dyn Job>>,
}

impl EngineHandle {
    pub(crate) fn enqueue(&self, job: Arc<dyn Job>) -> Result<()> {
        self.jobs.send(job).map_err(|_| LinkError::EngineShutdown)
    }
}

/// Creates actions and owns the worker that runs queued ones.
pub struct ActionEngine {
    handle: EngineHandle,
    stop: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl ActionEngine {
    /// Spawn the worker for `serializer`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(serializer: Arc<Serializer>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(worker_loop(rx, stop_rx));

        Self {
            handle: EngineHandle { serializer, jobs },
            stop,
            worker: Some(worker),
        }
    }

    /// The serializer actions run against.
    pub fn serializer(&self) -> &Arc<Serializer> {
        &self.handle.serializer
    }

    /// An UNQUEUED action running `f` with exclusive use of the connection.
    pub fn action<T, F>(&self, f: F) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
        F: for<'s> Fn(&'s mut Session) -> BoxFuture<'s, Result<T>> + Send + Sync + 'static,
    {
        Action::new(self.handle.clone(), body(f))
    }

    /// An UNQUEUED action performing one request.
    pub fn submit<R>(&self, request: R) -> Action<R::Output>
    where
        R: Request + 'static,
        R::Output: Clone + Sync,
    {
        let request = Arc::new(request);
        self.action(move |session| {
            let request = request.clone();
            Box::pin(async move { session.inquire(&*request).await })
        })
    }

    /// An already COMPLETE action holding `value`.
    pub fn completed<T>(&self, value: T) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Action::constant(self.handle.clone(), Ok(value))
    }

    /// An already COMPLETE action holding `error`.
    pub fn failed<T>(&self, error: LinkError) -> Action<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Action::constant(self.handle.clone(), Err(error))
    }

    /// Whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                debug!(error = %e, "action worker ended abnormally");
            }
        }
    }
}

impl Drop for ActionEngine {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

impl fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEngine")
            .field("serializer", &self.handle.serializer)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Runs queued actions one at a time until shutdown.
async fn worker_loop(mut jobs: mpsc::UnboundedReceiver<Arc<dyn Job>>, mut stop: watch::Receiver<bool>) {
    debug!("action worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        if let Err(e) = tokio::spawn(job.run()).await {
            error!(error = %e, "queued action panicked");
        }
    }

    jobs.close();
    let mut abandoned = 0usize;
    while let Ok(job) = jobs.try_recv() {
        job.abandon();
        abandoned += 1;
    }
    debug!(abandoned, "action worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use crate::action::ActionState;
    use crate::connection::{Connection, ConnectionConfig};

    /// Engine over a connection that is never started; these actions never
    /// touch the network.
    fn engine() -> ActionEngine {
        let connection = Connection::new(ConnectionConfig::default());
        ActionEngine::new(Arc::new(Serializer::new(Arc::new(connection))))
    }

    #[tokio::test]
    async fn test_worker_runs_in_fifo_order() {
        let engine = engine();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let actions: Vec<_> = (0..8)
            .map(|i| {
                let order = order.clone();
                engine.action(move |_session| {
                    let order = order.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push(i);
                        Ok(i)
                    })
                })
            })
            .collect();

        for action in &actions {
            action.queue().unwrap();
        }
        for (i, action) in actions.iter().enumerate() {
            assert_eq!(action.get().await.unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_queued_action_runs_once() {
        let engine = engine();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let action = engine.action(move |_session| {
            let counter = counter.clone();
            Box::pin(async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) })
        });

        action.queue().unwrap();
        action.queue().unwrap();
        assert_eq!(action.get().await.unwrap(), 0);
        assert_eq!(action.get().await.unwrap(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_queued_action_is_skipped() {
        let engine = engine();
        let gate = Arc::new(Notify::new());

        let blocker = {
            let gate = gate.clone();
            engine.action(move |_session| {
                let gate = gate.clone();
                Box::pin(async move {
                    gate.notified().await;
                    Ok(())
                })
            })
        };
        let victim = engine.action(|_session| Box::pin(async { Ok(()) }));

        blocker.queue().unwrap();
        victim.queue().unwrap();
        assert_eq!(victim.state(), ActionState::Queued);
        assert!(victim.cancel());
        gate.notify_one();

        assert!(matches!(victim.get().await, Err(LinkError::Skipped)));
        assert!(blocker.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending_actions() {
        let engine = engine();
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let running = {
            let started = started.clone();
            let gate = gate.clone();
            engine.action(move |_session| {
                let started = started.clone();
                let gate = gate.clone();
                Box::pin(async move {
                    started.notify_one();
                    gate.notified().await;
                    Ok(1)
                })
            })
        };
        let pending = engine.action(|_session| Box::pin(async { Ok(2) }));
        running.queue().unwrap();
        started.notified().await;
        pending.queue().unwrap();

        let shutting_down = tokio::spawn(engine.shutdown());
        tokio::task::yield_now().await;
        gate.notify_one();
        shutting_down.await.unwrap();

        assert_eq!(running.get().await.unwrap(), 1);
        assert!(matches!(pending.get().await, Err(LinkError::EngineShutdown)));

        let late = running.then(|v| Ok(v + 1));
        assert!(matches!(late.queue(), Err(LinkError::EngineShutdown)));
        assert!(matches!(late.poll_exception(), Some(LinkError::EngineShutdown)));
    }

    #[tokio::test]
    async fn test_drop_stops_worker() {
        let engine = engine();
        let action = engine.action(|_session| Box::pin(async { Ok(()) }));
        drop(engine);

        match action.queue() {
            Err(e) => assert!(matches!(e, LinkError::EngineShutdown)),
            // Worker not yet exited: it drains the queue on its way out.
            Ok(()) => assert!(matches!(action.get().await, Err(LinkError::EngineShutdown))),
        }
    }

    #[tokio::test]
    async fn test_panicking_action_does_not_stop_worker() {
        let engine = engine();
        let broken = engine
            .action(|_session| Box::pin(async { Ok(1) }))
            .then(|_: i32| -> Result<i32> { panic!("handler bug") });
        let after = engine.action(|_session| Box::pin(async { Ok(2) }));

        broken.queue().unwrap();
        after.queue().unwrap();

        assert!(matches!(broken.get().await, Err(LinkError::Interrupted)));
        assert_eq!(after.get().await.unwrap(), 2);
        assert!(engine.is_running());
    }
}
