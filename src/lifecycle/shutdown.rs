//! Shutdown coordination for the edge router.

use tokio::sync::broadcast;

/// Broadcast shutdown signal shared by the HTTP servers and revalidation workers.
///
/// Subscribe before the signal fires; a receiver created afterwards never
/// observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Safe to call more than once.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Subscribers still listening (servers plus worker shards).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Future resolving once `trigger` is called, for `with_graceful_shutdown`.
    pub fn signalled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
