use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use log::{debug, error};
use tokio::sync::{mpsc, Notify};

use crate::pipeline::PipelineError;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct QueueState {
    processing: AtomicBool,
    /// Tasks enqueued but not yet finished, including the running one.
    pending: AtomicUsize,
    idle: Notify,
}

/// Runs submitted tasks one at a time, in submission order.
///
/// A single worker task drains the channel. A task that panics is logged
/// and the next one starts as usual.
pub struct ExecutionQueue {
    sender: mpsc::UnboundedSender<Task>,
    state: Arc<QueueState>,
}

impl ExecutionQueue {
    /// Spawns the worker.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(run_queue(receiver, Arc::clone(&state)));
        debug!("Execution queue started");
        Self { sender, state }
    }

    /// A queue whose worker is already gone.
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        let (sender, _) = mpsc::unbounded_channel();
        Self {
            sender,
            state: Arc::new(QueueState::default()),
        }
    }

    pub fn enqueue<F>(&self, task: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(Box::pin(task)).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::QueueClosed);
        }
        Ok(())
    }

    /// True while a task body is running.
    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Resolves once every task enqueued so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ExecutionQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_queue(mut receiver: mpsc::UnboundedReceiver<Task>, state: Arc<QueueState>) {
    while let Some(task) = receiver.recv().await {
        state.processing.store(true, Ordering::SeqCst);

        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            error!("Queued task panicked: {}", panic_message(panic.as_ref()));
        }

        state.processing.store(false, Ordering::SeqCst);
        if state.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            state.idle.notify_waiters();
        }
    }
    debug!("Execution queue stopped");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
