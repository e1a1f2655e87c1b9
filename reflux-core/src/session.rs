//! Async Session Host
//!
//! A [`Session`] layers an asynchronous event source on top of a [`Runtime`].
//! Each external event (a form submission, a button press, a message off the
//! wire) is handled inside one [`Runtime::batch`], so it forms exactly one
//! update cycle. The session only suspends between events: once a cycle has
//! started it runs to completion before the next event is awaited.
//!
//! When the event stream ends or [`SessionHandle::shutdown`] is called, the
//! session tears the runtime down, disposing every effect and cancelling any
//! runs still queued.
//!
//! The runtime is single-threaded, so [`Session::run`] is a `!Send` future.
//! Drive it with a current-thread Tokio runtime or inside a `LocalSet`.

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ReactiveError, Result};
use crate::reactive::Runtime;

/// What a finished session did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Events handled, successful or not.
    pub events: usize,
    /// Events whose handler or flush returned an error.
    pub failed: usize,
    /// Effects disposed at teardown.
    pub disposed_effects: usize,
    /// Effect runs still queued at teardown and therefore cancelled.
    pub cancelled_runs: usize,
    /// Whether the session stopped on request rather than because the event
    /// stream ended.
    pub shut_down: bool,
}

/// Sending half of a session: feeds events and requests shutdown.
#[derive(Debug)]
pub struct SessionHandle<E> {
    events: mpsc::Sender<E>,
    shutdown: watch::Sender<bool>,
}

impl<E> Clone for SessionHandle<E> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<E> SessionHandle<E> {
    /// Queue an event. Fails once the session has stopped.
    pub async fn send(&self, event: E) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ReactiveError::SessionClosed)
    }

    /// Ask the session to stop after the event it is currently handling.
    pub fn shutdown(&self) {
        // No receiver means the session already stopped.
        let _ = self.shutdown.send(true);
    }
}

/// Receiving half of a session, owning the runtime it drives.
pub struct Session<E> {
    runtime: Runtime,
    events: mpsc::Receiver<E>,
    shutdown: watch::Receiver<bool>,
}

impl<E> Session<E> {
    /// Create a session around `runtime` with a bounded event queue.
    pub fn new(runtime: Runtime, capacity: usize) -> (SessionHandle<E>, Self) {
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SessionHandle {
            events: events_tx,
            shutdown: shutdown_tx,
        };
        let session = Self {
            runtime,
            events: events_rx,
            shutdown: shutdown_rx,
        };
        (handle, session)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Handle events until the stream ends or shutdown is requested.
    ///
    /// `handler` runs inside a batch: every signal it sets belongs to the same
    /// cycle, and the cycle's effects run before the next event is received.
    pub async fn run<F>(mut self, mut handler: F) -> SessionReport
    where
        F: FnMut(&Runtime, E) -> Result<()>,
    {
        let name = self.runtime.config().name.clone();
        let mut report = SessionReport::default();
        let mut watching = true;

        info!(session = %name, "session started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed(), if watching => match changed {
                    Ok(()) if *self.shutdown.borrow() => {
                        report.shut_down = true;
                        break;
                    }
                    Ok(()) => {}
                    // Every handle is gone; the event stream ends on its own.
                    Err(_) => watching = false,
                },

                event = self.events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    report.events += 1;

                    let outcome = self
                        .runtime
                        .batch(|| handler(&self.runtime, event))
                        .and_then(|handled| handled);

                    if let Err(err) = outcome {
                        report.failed += 1;
                        warn!(session = %name, error = %err, "event handling failed");
                    } else {
                        debug!(session = %name, cycle = self.runtime.cycle(), "event handled");
                    }
                }
            }
        }

        report.cancelled_runs = self.runtime.pending_effects();
        report.disposed_effects = self.runtime.teardown();

        info!(
            session = %name,
            events = report.events,
            failed = report.failed,
            disposed = report.disposed_effects,
            "session ended"
        );
        report
    }
}
