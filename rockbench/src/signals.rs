//! Shutdown coordination.
//!
//! A run stops when its budget is spent or when the operator interrupts it.
//! Every long-lived task (the scheduler and the latency probe) holds a clone
//! of [`Shutdown`] and selects on [`Shutdown::recv`] alongside its own work.
//! Requests already handed to the destination are not tracked here: shutdown
//! stops new work, it does not drain old work.

use std::sync::Arc;

use tokio::sync::broadcast;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Shutdown`]
pub enum Error {
    /// No instance was left listening for the signal.
    #[error("No receivers listening for shutdown: {0}")]
    Tokio(#[from] broadcast::error::SendError<()>),
}

#[derive(Debug)]
/// Broadcast handle for graceful shutdown.
///
/// Create one root with [`Shutdown::new`] and hand clones to every task that
/// must stop on interrupt. Clones share the same sender.
pub struct Shutdown {
    sender: Arc<broadcast::Sender<()>>,
    notify: broadcast::Receiver<()>,
    /// `true` once this instance has observed the signal
    received: bool,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create the root `Shutdown`. Further instances come from `clone`.
    #[must_use]
    pub fn new() -> Self {
        let (sender, notify) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            notify,
            received: false,
        }
    }

    /// Wait for the shutdown signal. Returns immediately once it has been
    /// observed by this instance.
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }
        // A value or a lag both mean the signal was sent.
        let _ = self.notify.recv().await;
        self.received = true;
    }

    /// Signal every derived instance. Returns the number of listeners.
    ///
    /// # Errors
    ///
    /// Function will return an error if no instance is listening.
    pub fn signal(&self) -> Result<usize, Error> {
        Ok(self.sender.send(())?)
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            notify: self.sender.subscribe(),
            received: self.received,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn every_clone_observes_signal() {
        let root = Shutdown::new();
        let mut a = root.clone();
        let mut b = root.clone();
        assert!(timeout(WAIT, a.recv()).await.is_err());

        assert_eq!(root.signal().expect("listeners exist"), 3);
        timeout(WAIT, a.recv()).await.expect("a observes the signal");
        timeout(WAIT, b.recv()).await.expect("b observes the signal");
        // Observed signals are sticky.
        timeout(WAIT, a.recv()).await.expect("a stays shut down");
    }

    #[tokio::test(start_paused = true)]
    async fn clone_of_observed_instance_is_already_shut_down() {
        let mut root = Shutdown::new();
        root.signal().expect("root listens");
        root.recv().await;
        let mut late = root.clone();
        timeout(WAIT, late.recv())
            .await
            .expect("late clone inherits the observed signal");
    }
}
