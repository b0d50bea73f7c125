use crate::apply::ReplicationUpdate;
use tokio::sync::mpsc;

pub(crate) fn new() -> (RaftCommitStreamPublisher, RaftCommitStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    (RaftCommitStreamPublisher { sender: tx }, RaftCommitStream { receiver: rx })
}

pub(crate) struct RaftCommitStreamPublisher {
    sender: mpsc::UnboundedSender<ReplicationUpdate>,
}

impl RaftCommitStreamPublisher {
    pub(crate) fn publish(&self, logger: &slog::Logger, update: ReplicationUpdate) {
        // The application isn't required to consume the stream.
        if self.sender.send(update).is_err() {
            slog::debug!(logger, "RaftCommitStream has been dropped.");
        }
    }
}

/// RaftCommitStream yields every change after the storage engine has applied it, in log order.
pub struct RaftCommitStream {
    receiver: mpsc::UnboundedReceiver<ReplicationUpdate>,
}

impl RaftCommitStream {
    /// `None` once the replica has shut down and every update has been handed out.
    pub async fn next(&mut self) -> Option<ReplicationUpdate> {
        self.receiver.recv().await
    }
}
