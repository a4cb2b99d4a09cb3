//! Asynchronous dispatch of push-delivered messages.
//!
//! The transport's delivery task must never wait on application code, so
//! every pushed message is handed to the [`DispatchPool`] as a (message,
//! handler) unit of work and executed on tokio's blocking pool, which grows
//! with concurrent load and reuses idle workers. Invocation order across
//! messages is not guaranteed.

use crate::message::Message;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error};

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

/// Application contract for asynchronously delivered messages.
///
/// Invoked once per message from a dispatch worker. A panicking handler
/// aborts only its own unit of work; the pool logs the panic and keeps
/// serving other messages.
pub trait MessageHandler: Send + Sync {
    /// Process one delivered message
    fn handle(&self, message: Message);
}

impl<F> MessageHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn handle(&self, message: Message) {
        self(message)
    }
}

struct PoolState {
    accepting: AtomicBool,
    active: AtomicUsize,
    drained: Notify,
}

/// Decrements the active count when a unit of work finishes, including by
/// panic unwind.
struct WorkGuard(Arc<PoolState>);

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_one();
        }
    }
}

/// Elastic worker pool executing handler callbacks off the delivery task.
///
/// Cloning is cheap; all clones share one pool.
#[derive(Clone)]
pub struct DispatchPool {
    state: Arc<PoolState>,
}

impl DispatchPool {
    /// Create a pool that accepts work immediately
    pub fn new() -> Self {
        Self {
            state: Arc::new(PoolState {
                accepting: AtomicBool::new(true),
                active: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Submit one (message, handler) unit of work.
    ///
    /// Returns immediately; the handler runs on a pool worker. Work
    /// submitted after [`shutdown`](Self::shutdown) has begun is dropped.
    pub fn submit(&self, message: Message, handler: Arc<dyn MessageHandler>) {
        if !self.state.accepting.load(Ordering::SeqCst) {
            debug!(message_id = %message.message_id, "Dispatch pool is shut down; dropping message");
            return;
        }

        self.state.active.fetch_add(1, Ordering::SeqCst);
        let state = self.state.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let _guard = WorkGuard(state);
            handler.handle(message);
        });
        tokio::spawn(async move {
            if let Err(join_error) = worker.await {
                if join_error.is_panic() {
                    error!(error = %join_error, "Message handler panicked");
                }
            }
        });
    }

    /// Number of units of work currently executing or queued on workers
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Check whether the pool still accepts new work
    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting new work and wait for already-submitted work to
    /// finish.
    pub async fn shutdown(&self) {
        self.state.accepting.store(false, Ordering::SeqCst);
        loop {
            let drained = self.state.drained.notified();
            if self.state.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            drained.await;
        }
        // Cascade to any other waiter blocked in shutdown.
        self.state.drained.notify_one();
        debug!("Dispatch pool drained");
    }
}

impl Default for DispatchPool {
    fn default() -> Self {
        Self::new()
    }
}
