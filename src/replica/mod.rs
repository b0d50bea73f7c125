mod election;
mod local_state;
mod membership;
mod peer_client;
mod peer_proxy;
mod replica;
mod replica_api;
mod replica_wiring;
mod write_ahead_log;

pub(crate) use election::ElectionStateChangeListener;
pub(crate) use election::ElectionStateSnapshot;
pub(crate) use local_state::FileLocalState;
pub(crate) use local_state::PersistentLocalState;
pub(crate) use local_state::Term;
pub(crate) use local_state::VolatileLocalState;
pub(crate) use membership::ClusterTracker;
pub(crate) use membership::MemberInfo;
pub(crate) use membership::MemberStatus;
pub(crate) use membership::MembershipError;
pub(crate) use membership::ProxyState;
pub(crate) use membership::ReplicaId;
pub(crate) use peer_client::TransportError;
pub(crate) use peer_proxy::PeerProxyConfig;
pub(crate) use peer_proxy::PeerProxyHandle;
pub(crate) use peer_proxy::PeerRequest;
pub(crate) use replica::Replica;
pub(crate) use replica::ReplicaConfig;
pub(crate) use replica_api::AppendEntriesError;
pub(crate) use replica_api::AppendEntriesInput;
pub(crate) use replica_api::AppendEntriesOutput;
pub(crate) use replica_api::AppendEntriesPayload;
pub(crate) use replica_api::AppendEntriesReplyFromPeer;
pub(crate) use replica_api::AppendEntriesReplyFromPeerDescriptor;
pub(crate) use replica_api::AppendEntriesStatus;
pub(crate) use replica_api::InitiateVoteError;
pub(crate) use replica_api::InitiateVoteInput;
pub(crate) use replica_api::LeaderRedirectInfo;
pub(crate) use replica_api::LeaderTimerTick;
pub(crate) use replica_api::PeerConnectionChanged;
pub(crate) use replica_api::ReplicaStatus;
pub(crate) use replica_api::RequestVoteError;
pub(crate) use replica_api::RequestVoteInput;
pub(crate) use replica_api::RequestVoteOutput;
pub(crate) use replica_api::RequestVoteReplyFromPeer;
pub(crate) use replica_api::TransferLeadershipError;
pub(crate) use replica_api::VoteDecision;
pub(crate) use replica_api::WriteToLogError;
pub(crate) use replica_api::WriteToLogInput;
pub(crate) use replica_api::WriteToLogOutput;
pub(crate) use replica_wiring::create_replica;
pub(crate) use replica_wiring::ReplicaOptions;
pub(crate) use write_ahead_log::wired;
pub(crate) use write_ahead_log::CommitStream;
pub(crate) use write_ahead_log::LogRecord;
pub(crate) use write_ahead_log::LookupResult;
pub(crate) use write_ahead_log::WriteAheadLog;
