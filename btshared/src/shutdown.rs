//! Graceful-shutdown signaling: the orchestrator drops the `Receiver` half
//! it was handed at construction; every clone of `Shutdown` observes that
//! through `recv_shutdown`/`is_shutdown` without needing a broadcast
//! channel. Grounds `spec.md` §5's "Cancellation" requirement that adapter
//! shutdown unblocks every reader task and resolves pending requests with
//! `Cancelled`.

use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Shutdown {
    shutdown_tx: mpsc::Sender<()>,
    shutdown_complete_tx: mpsc::WeakSender<()>,
}

impl Shutdown {
    /// Returns the handle plus the receiver whose drop triggers shutdown,
    /// and the receiver that resolves once every outstanding
    /// [`Shutdown::drop_guard`] has gone out of scope.
    pub fn new() -> (Self, mpsc::Receiver<()>, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (complete_tx, complete_rx) = mpsc::channel(1);
        (
            Self {
                shutdown_tx,
                shutdown_complete_tx: complete_tx.downgrade(),
            },
            shutdown_rx,
            complete_rx,
        )
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_tx.is_closed()
    }

    /// Resolves once the orchestrator has dropped its `Receiver`.
    pub async fn recv_shutdown(&self) {
        self.shutdown_tx.closed().await;
    }

    /// Held by a task for as long as it is doing cleanup work; shutdown
    /// completion (the second `Receiver`'s `recv()` returning `None`) is
    /// observed once every such handle has dropped.
    pub fn drop_guard(&self) -> Option<mpsc::Sender<()>> {
        self.shutdown_complete_tx.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_the_shutdown_receiver_unblocks_every_clone() {
        let (shutdown, shutdown_rx, mut complete_rx) = Shutdown::new();
        let s2 = shutdown.clone();
        let guard = shutdown.drop_guard().unwrap();
        assert!(!shutdown.is_shutdown());

        drop(shutdown_rx);
        shutdown.recv_shutdown().await;
        s2.recv_shutdown().await;
        assert!(shutdown.is_shutdown());

        drop(guard);
        assert_eq!(complete_rx.recv().await, None);
    }
}
