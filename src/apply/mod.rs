//! Commit pipeline: committed log records flow from the replica into the storage engine.
mod applier;
mod storage;
mod update;

pub use storage::AppliedChange;
pub use storage::InMemoryStorageEngine;
pub use storage::StorageEngine;
pub use update::AttributeMetadata;
pub use update::ReplicationUpdate;
pub use update::SyncState;
pub use update::ValueMetadata;
pub use update::ValueOp;

pub(crate) use applier::Applier;
