//! Single-consumer callback dispatcher
//!
//! Close and detach notifications must not run on the producer's or a
//! reader's task: the subscriber owns state that is only touched from its
//! own context. A `MessageLoop` is that context: a task draining a queue of
//! boxed callbacks, so the source can post a notification from any task and
//! the callback still runs where the subscriber expects it.

use tokio::sync::mpsc;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a dispatcher task that runs posted callbacks in order
///
/// Cloning the handle shares the same queue. The task exits once every
/// handle has been dropped and the queue has drained.
#[derive(Clone)]
pub struct MessageLoop {
    tx: mpsc::UnboundedSender<Task>,
}

impl MessageLoop {
    /// Spawn a dispatcher task and return a handle to it
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
            tracing::trace!("Message loop drained");
        });

        Self { tx }
    }

    /// Post a callback to run on the dispatcher task
    ///
    /// Posting after the dispatcher has shut down silently drops the
    /// callback, mirroring an event posted to a stopped event loop.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        self.post_task(Box::new(f));
    }

    pub(crate) fn post_task(&self, task: Task) {
        let _ = self.tx.send(task);
    }
}

impl std::fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLoop").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn runs_posted_callbacks_in_order() {
        let message_loop = MessageLoop::spawn();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for i in 0..4 {
            let done_tx = done_tx.clone();
            message_loop.post(move || {
                let _ = done_tx.send(i);
            });
        }

        for expected in 0..4 {
            assert_eq!(done_rx.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn callbacks_from_many_tasks_all_run() {
        let message_loop = MessageLoop::spawn();
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for _ in 0..8 {
            let message_loop = message_loop.clone();
            let counter = Arc::clone(&counter);
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                message_loop.post(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = done_tx.send(());
                });
            });
        }

        for _ in 0..8 {
            done_rx.recv().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
