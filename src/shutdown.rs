//! Interrupt-driven shutdown.
//!
//! The controller has two states, `Running` and `Stopping`. An interrupt
//! moves it to `Stopping` and does nothing else: it never prints, never
//! touches the histogram, and never cuts a connection short. If no
//! connection is active the idle acceptor is woken so it can report and
//! exit; otherwise the acceptor notices the flag once the active
//! connection has finished, including its histogram merge.
//!
//! Interrupts are received by a watcher task rather than a raw signal
//! handler, so the only work done on delivery is flipping the flag.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Stopping,
}

#[derive(Debug, Default)]
struct Inner {
    /// Set once an interrupt has been requested. Never cleared.
    interrupted: AtomicBool,
    /// Set while a connection is between accept and close.
    active: AtomicBool,
    /// Wakes an idle acceptor.
    wake: Notify,
}

/// Shared handle to the shutdown state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        if self.is_stopping() {
            State::Stopping
        } else {
            State::Running
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Whether a connection is currently being processed.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Request shutdown (Running -> Stopping).
    ///
    /// Wakes the acceptor only when it is idle. An active connection is left
    /// alone; the acceptor checks the flag after the connection completes.
    pub fn request(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        if !self.is_active() {
            self.inner.wake.notify_waiters();
        }
    }

    /// Mark a connection as in progress until the returned guard is dropped.
    pub fn begin_connection(&self) -> ActiveConnection<'_> {
        self.inner.active.store(true, Ordering::SeqCst);
        ActiveConnection { shutdown: self }
    }

    /// Resolve once shutdown has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a request landing in
            // between is not lost.
            notified.as_mut().enable();

            if self.is_stopping() {
                return;
            }
            notified.await;
        }
    }

    /// Spawn a task that requests shutdown on the first interrupt (SIGINT).
    ///
    /// The handler is registered before this returns, so an interrupt
    /// delivered at any later point is observed. Must be called from within
    /// a tokio runtime.
    pub fn watch_interrupt(&self) -> io::Result<JoinHandle<()>> {
        #[cfg(unix)]
        let mut interrupt =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            #[cfg(unix)]
            let received = interrupt.recv().await.is_some();
            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if received {
                info!(
                    active_connection = shutdown.is_active(),
                    "Interrupt received"
                );
                shutdown.request();
            }
        }))
    }
}

/// Guard returned by [`Shutdown::begin_connection`]. Clears the
/// active-connection marker when dropped.
#[derive(Debug)]
pub struct ActiveConnection<'a> {
    shutdown: &'a Shutdown,
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.shutdown.inner.active.store(false, Ordering::SeqCst);
    }
}
