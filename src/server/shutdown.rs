use tokio::sync::oneshot;

pub(crate) fn shutdown_signal() -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RpcServerShutdownHandle { tx }, RpcServerShutdownSignal { rx })
}

/// Stops the RPC server when told to, or when dropped.
pub(crate) struct RpcServerShutdownHandle {
    tx: oneshot::Sender<()>,
}

impl RpcServerShutdownHandle {
    pub(crate) fn shutdown(self) {
        let _ = self.tx.send(());
    }
}

pub(crate) struct RpcServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl RpcServerShutdownSignal {
    /// Resolves on `shutdown()` or once the handle is dropped.
    pub(crate) async fn wait(self) {
        let _ = self.rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dropping_handle_signals_shutdown() {
        let (handle, signal) = shutdown_signal();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal.wait()).await.unwrap();

        let (handle, signal) = shutdown_signal();
        let waiter = tokio::spawn(signal.wait());
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
