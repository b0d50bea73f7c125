//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod commit_stream;
mod directory_log;
mod event_bus;
mod options;
mod types;
mod wiring;

pub use client::MembershipChangeError;
pub use client::RaftClient;
pub use commit_stream::RaftCommitStream;
pub use directory_log::DirectoryLog;
pub use directory_log::DirectoryWriteError;
pub use event_bus::RaftElectionState;
pub use event_bus::RaftEvent;
pub use event_bus::RaftEventListener;
pub use options::RaftOptions;
pub use types::RaftConnectionState;
pub use types::RaftLeaderInfo;
pub use types::RaftMemberInfo;
pub use types::RaftMemberStatus;
pub use types::RaftRole;
pub use types::RaftStatus;
pub use types::WriteReceipt;
pub use wiring::try_create_raft_client;
pub use wiring::RaftClientConfig;
pub use wiring::RaftClientCreationError;

// So the apply task can publish to the application.
pub(crate) use commit_stream::new as new_commit_stream;
pub(crate) use commit_stream::RaftCommitStreamPublisher;
