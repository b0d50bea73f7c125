mod actor;
mod api;
mod apply;
mod codec;
mod commitlog;
mod replica;
mod server;
mod grpc {
    include!("../generated/dirraft.rs");
}

pub use api::try_create_raft_client;
pub use api::DirectoryLog;
pub use api::DirectoryWriteError;
pub use api::MembershipChangeError;
pub use api::RaftClient;
pub use api::RaftClientConfig;
pub use api::RaftClientCreationError;
pub use api::RaftCommitStream;
pub use api::RaftConnectionState;
pub use api::RaftElectionState;
pub use api::RaftEvent;
pub use api::RaftEventListener;
pub use api::RaftLeaderInfo;
pub use api::RaftMemberInfo;
pub use api::RaftMemberStatus;
pub use api::RaftOptions;
pub use api::RaftRole;
pub use api::RaftStatus;
pub use api::WriteReceipt;

pub use apply::AppliedChange;
pub use apply::AttributeMetadata;
pub use apply::InMemoryStorageEngine;
pub use apply::ReplicationUpdate;
pub use apply::StorageEngine;
pub use apply::SyncState;
pub use apply::ValueMetadata;
pub use apply::ValueOp;

pub use codec::compute_encoded_size;
pub use codec::decode_entry;
pub use codec::decode_mods;
pub use codec::encode_entry;
pub use codec::encode_mods;
pub use codec::entry_sanity_check;
pub use codec::Attribute;
pub use codec::AttributeDescriptor;
pub use codec::ChangeKind;
pub use codec::CodecError;
pub use codec::DirectoryChange;
pub use codec::Dn;
pub use codec::EncodedSize;
pub use codec::Entry;
pub use codec::ModOp;
pub use codec::Modification;
pub use codec::SchemaContext;
pub use codec::SchemaResolver;
pub use codec::StaticSchema;
pub use codec::Syntax;
pub use codec::ATTR_DN;
pub use codec::ATTR_OBJECT_CLASS;
pub use codec::SUB_SCHEMA_SUB_ENTRY_ID;

