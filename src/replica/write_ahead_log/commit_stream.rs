use crate::replica::LogRecord;
use tokio::sync::mpsc;

/// Hands committed records, in index order, from the replica actor to the apply task.
pub(crate) struct CommitStreamPublisher {
    sender: mpsc::UnboundedSender<CommittedEntry>,
}

pub(crate) struct CommitStream {
    receiver: mpsc::UnboundedReceiver<CommittedEntry>,
}

#[derive(Debug)]
pub(crate) struct CommittedEntry {
    pub(crate) record: LogRecord,
}

pub(crate) fn new() -> (CommitStreamPublisher, CommitStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    (CommitStreamPublisher { sender: tx }, CommitStream { receiver: rx })
}

impl CommitStreamPublisher {
    pub(super) fn notify_commit(&self, logger: &slog::Logger, record: LogRecord) {
        if self.sender.send(CommittedEntry { record }).is_err() {
            slog::warn!(logger, "CommitStream has disconnected.");
        }
    }
}

impl CommitStream {
    pub(crate) async fn recv(&mut self) -> Option<CommittedEntry> {
        self.receiver.recv().await
    }
}
