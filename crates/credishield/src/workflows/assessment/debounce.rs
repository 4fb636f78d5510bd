use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Fired<T> {
    generation: u64,
    value: T,
}

/// Trailing-edge debounce with an explicit, cancellable pending slot.
///
/// Each [`arm`](Self::arm) replaces whatever was pending. A value is only
/// delivered by [`fired`](Self::fired) if no later `arm` or
/// [`cancel_pending`](Self::cancel_pending) happened while it waited.
pub struct DebounceTimer<T> {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Fired<T>>,
    rx: mpsc::UnboundedReceiver<Fired<T>>,
}

impl<T: Send + 'static> DebounceTimer<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generation: 0,
            pending: None,
            tx,
            rx,
        }
    }

    pub fn arm(&mut self, delay: Duration, value: T) {
        self.cancel_pending();
        let generation = self.generation;
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Fired { generation, value });
        }));
    }

    pub fn cancel_pending(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// True from `arm` until the value is taken by `fired` or cancelled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the surviving timer. Pends forever while nothing is armed.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to other sources.
    pub async fn fired(&mut self) -> T {
        loop {
            match self.rx.recv().await {
                Some(fired) if fired.generation == self.generation => {
                    self.pending = None;
                    return fired.value;
                }
                Some(_) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    }
}

impl<T: Send + 'static> Default for DebounceTimer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for DebounceTimer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
