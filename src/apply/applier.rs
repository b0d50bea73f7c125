use crate::actor::WeakActorClient;
use crate::api::RaftCommitStreamPublisher;
use crate::apply::{AppliedChange, ReplicationUpdate, StorageEngine};
use crate::codec::SchemaContext;
use crate::replica::{CommitStream, LogRecord, ReplicaId};
use std::io;

/// Applier is the task that writes committed records into the storage engine, one transaction per
/// record, then tells the replica and the application about it.
pub(crate) struct Applier<S: StorageEngine> {
    logger: slog::Logger,
    storage: S,
    schema: SchemaContext,
    my_replica_id: ReplicaId,
    commit_stream: CommitStream,
    actor_client: WeakActorClient,
    publisher: RaftCommitStreamPublisher,
}

impl<S: StorageEngine> Applier<S> {
    pub(crate) fn new(
        logger: slog::Logger,
        storage: S,
        schema: SchemaContext,
        my_replica_id: ReplicaId,
        commit_stream: CommitStream,
        actor_client: WeakActorClient,
        publisher: RaftCommitStreamPublisher,
    ) -> Self {
        Applier {
            logger,
            storage,
            schema,
            my_replica_id,
            commit_stream,
            actor_client,
            publisher,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(committed) = self.commit_stream.recv().await {
            let index = committed.record.index;
            if let Some(update) = self.apply(committed.record) {
                self.publisher.publish(&self.logger, update);
            }

            if self.actor_client.entries_applied(index).await.is_err() {
                break;
            }
        }

        slog::info!(self.logger, "Apply task exited.");
    }

    /// Panics if a committed record can't be applied. Every replica must eventually apply every
    /// committed record, so there's no safe way to continue.
    fn apply(&mut self, record: LogRecord) -> Option<ReplicationUpdate> {
        let index = record.index.as_u64();
        if index <= self.storage.last_applied() {
            slog::debug!(self.logger, "Skipping {:?}, storage already has it.", record.index);
            return None;
        }

        let change = match record.decode_change(&self.schema) {
            Ok(change) => change,
            Err(e) => panic!("Committed log record {:?} can't be decoded: {}", record.index, e),
        };
        let applied = change.map(|change| AppliedChange {
            index,
            term: record.term.as_u32(),
            change,
        });

        if let Err(e) = self.write_transaction(index, applied.as_ref()) {
            panic!("Failed to apply committed log record {:?}: {}", record.index, e);
        }
        slog::debug!(self.logger, "Applied {:?}", record.index);

        applied.map(|applied| {
            ReplicationUpdate::new(applied, record.entry_id, self.my_replica_id.as_str(), chrono::Utc::now())
        })
    }

    // A NoOp record commits an empty transaction, so it still moves the storage's last applied index.
    fn write_transaction(&mut self, index: u64, applied: Option<&AppliedChange>) -> io::Result<()> {
        self.storage.begin()?;

        let result = match applied {
            Some(applied) => self.storage.apply(applied),
            None => Ok(()),
        }
        .and_then(|()| self.storage.commit(index));

        if result.is_err() {
            self.storage.abort();
        }
        result
    }
}
