use tokio::sync::watch;

/// Cooperative shutdown signal, cloned into every listener and worker task.
/// Closing the sender (via `ShutdownHandle::shutdown`) is observed by every
/// clone's `wait()` future, mirroring the single "close the `done` channel"
/// design: there is no per-task acknowledgement, just a broadcast close.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered. Safe to call from
    /// `tokio::select!` repeatedly; once triggered it resolves immediately
    /// on every subsequent call.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_shutdown() {
        let (handle, mut signal) = ShutdownHandle::new();
        assert!(!signal.is_shutdown());
        handle.shutdown();
        signal.wait().await;
        assert!(signal.is_shutdown());
    }
}
