use crate::actor::ActorClient;
use crate::api::types::{RaftLeaderInfo, WriteReceipt};
use crate::codec::{self, CodecError, DirectoryChange, Dn, Entry, Modification, SchemaContext};
use crate::replica;
use std::time::Duration;

/// DirectoryLog is where the application submits directory writes. Only the leader accepts them.
/// A write returns once it's committed and applied to the local storage engine.
pub struct DirectoryLog {
    actor_client: ActorClient,
    schema: SchemaContext,
    consensus_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryWriteError {
    /// Retry on the leader. `None` while an election is in progress; retry with backoff.
    #[error("Not leader, leader is {0:?}")]
    NotLeader(Option<RaftLeaderInfo>),

    /// The write may still commit later. Retrying can duplicate it.
    #[error("Write didn't reach consensus in time")]
    ConsensusTimeout,

    #[error("Replica is shutting down")]
    ShuttingDown,

    #[error("Invalid entry: {0}")]
    InvalidEntry(#[from] CodecError),

    #[error("Failed to persist log record: {0}")]
    LocalIoError(String),
}

impl DirectoryLog {
    pub(crate) fn new(actor_client: ActorClient, schema: SchemaContext, consensus_timeout: Duration) -> Self {
        DirectoryLog {
            actor_client,
            schema,
            consensus_timeout,
        }
    }

    /// The entry's DN comes from its `dn` attribute. Attribute descriptors missing from `entry` are
    /// resolved by name against the schema.
    pub async fn add_entry(&self, mut entry: Entry) -> Result<WriteReceipt, DirectoryWriteError> {
        entry.resolve_descriptors(&self.schema)?;
        codec::entry_sanity_check(&entry)?;

        self.write(DirectoryChange::Add(entry)).await
    }

    pub async fn modify_entry(
        &self,
        dn: &str,
        mut mods: Vec<Modification>,
    ) -> Result<WriteReceipt, DirectoryWriteError> {
        let dn = Dn::parse(&self.schema, dn)?;
        if mods.is_empty() {
            return Err(CodecError::InvalidEntry("no modifications").into());
        }
        for modification in mods.iter_mut() {
            let attribute = &mut modification.attribute;
            if attribute.descriptor.is_none() {
                attribute.descriptor = self.schema.resolver().name_to_descriptor(&attribute.name);
            }
            if attribute.descriptor.is_none() {
                return Err(CodecError::MissingAttributeDescriptor(attribute.name.clone()).into());
            }
        }

        self.write(DirectoryChange::Modify { dn, mods }).await
    }

    pub async fn delete_entry(&self, dn: &str) -> Result<WriteReceipt, DirectoryWriteError> {
        let dn = Dn::parse(&self.schema, dn)?;

        self.write(DirectoryChange::Delete { dn }).await
    }

    async fn write(&self, change: DirectoryChange) -> Result<WriteReceipt, DirectoryWriteError> {
        let input = replica::WriteToLogInput { change };

        match tokio::time::timeout(self.consensus_timeout, self.actor_client.write_to_log(input)).await {
            Ok(result) => result.map(WriteReceipt::from).map_err(DirectoryWriteError::from),
            Err(_) => Err(DirectoryWriteError::ConsensusTimeout),
        }
    }
}

// ------- Conversions --------

impl From<replica::WriteToLogOutput> for WriteReceipt {
    fn from(output: replica::WriteToLogOutput) -> Self {
        WriteReceipt {
            term: output.term.as_u32(),
            index: output.index.as_u64(),
        }
    }
}

impl From<replica::WriteToLogError> for DirectoryWriteError {
    fn from(internal_error: replica::WriteToLogError) -> Self {
        match internal_error {
            replica::WriteToLogError::NotLeader(leader) => DirectoryWriteError::NotLeader(leader.map(RaftLeaderInfo::from)),
            replica::WriteToLogError::InvalidEntry(e) => DirectoryWriteError::InvalidEntry(e),
            replica::WriteToLogError::LocalIoError(e) => DirectoryWriteError::LocalIoError(e.to_string()),
            replica::WriteToLogError::ShuttingDown => DirectoryWriteError::ShuttingDown,
        }
    }
}
