use crate::actor::ActorExited;
use crate::codec::{CodecError, DirectoryChange};
use crate::commitlog::Index;
use crate::replica::election::ElectionStateSnapshot;
use crate::replica::local_state::Term;
use crate::replica::membership::{MemberStatus, ReplicaId};
use crate::replica::peer_client::TransportError;
use crate::replica::write_ahead_log::{LogRecord, LogStoreError};
use std::io;
use std::net::SocketAddrV4;

#[derive(Debug)]
pub(crate) struct WriteToLogInput {
    pub(crate) change: DirectoryChange,
}

#[derive(Debug)]
pub(crate) struct WriteToLogOutput {
    pub(crate) term: Term,
    pub(crate) index: Index,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WriteToLogError {
    #[error("not leader, leader is {0:?}")]
    NotLeader(Option<LeaderRedirectInfo>),
    #[error("invalid directory change: {0}")]
    InvalidEntry(CodecError),
    #[error("failed to persist log record: {0}")]
    LocalIoError(LogStoreError),
    #[error("replica is shutting down")]
    ShuttingDown,
}

impl From<ActorExited> for WriteToLogError {
    fn from(_: ActorExited) -> Self {
        WriteToLogError::ShuttingDown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderRedirectInfo {
    pub(crate) replica_id: ReplicaId,
    pub(crate) address: Option<SocketAddrV4>,
}

#[derive(Debug, Clone)]
pub(crate) struct RequestVoteInput {
    pub(crate) candidate_term: Term,
    pub(crate) candidate_id: ReplicaId,
    pub(crate) candidate_last_log_entry: Option<(Term, Index)>,
}

/// StrongDenied means the candidate's log is behind ours. The candidate gives up on this term's
/// election instead of waiting for more votes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum VoteDecision {
    Granted = 0,
    Denied = 1,
    StrongDenied = 2,
}

#[derive(Debug, Clone)]
pub(crate) struct RequestVoteOutput {
    pub(crate) term: Term,
    pub(crate) decision: VoteDecision,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestVoteError {
    #[error("replica is not initialized")]
    NotInitialized,
    #[error("failed to persist vote: {0}")]
    LocalIoError(io::Error),
    #[error(transparent)]
    ActorExited(#[from] ActorExited),
}

#[derive(Debug, Clone)]
pub(crate) enum AppendEntriesPayload {
    Heartbeat,
    Record(LogRecord),
}

#[derive(Debug, Clone)]
pub(crate) struct AppendEntriesInput {
    pub(crate) leader_term: Term,
    pub(crate) leader_id: ReplicaId,
    // Entry immediately preceding the payload, `None` when the payload starts the log.
    pub(crate) previous_log_entry: Option<(Term, Index)>,
    pub(crate) leader_commit_index: Option<Index>,
    pub(crate) payload: AppendEntriesPayload,
}

impl AppendEntriesInput {
    pub(crate) fn num_records(&self) -> usize {
        match self.payload {
            AppendEntriesPayload::Heartbeat => 0,
            AppendEntriesPayload::Record(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AppendEntriesStatus {
    Accepted,
    /// Carries the follower's last log index so the leader can skip back in one step.
    Rejected { last_log_index: Option<Index> },
}

#[derive(Debug, Clone)]
pub(crate) struct AppendEntriesOutput {
    pub(crate) term: Term,
    pub(crate) status: AppendEntriesStatus,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum AppendEntriesError {
    #[error("replica is not initialized")]
    NotInitialized,
    #[error("too many committed entries are waiting to be applied")]
    ApplyBacklog,
    #[error("log record can't be decoded: {0}")]
    InvalidRecord(CodecError),
    #[error("failed to write log record: {0}")]
    LogStore(LogStoreError),
    #[error("local IO failure: {0}")]
    LocalIoError(io::Error),
    #[error(transparent)]
    ActorExited(#[from] ActorExited),
}

#[derive(Debug)]
pub(crate) struct RequestVoteReplyFromPeer {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
    pub(crate) result: Result<RequestVoteOutput, TransportError>,
}

#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeer {
    pub(crate) descriptor: AppendEntriesReplyFromPeerDescriptor,
    pub(crate) result: Result<AppendEntriesOutput, TransportError>,
}

// Info about the original request, echoed back with the reply.
#[derive(Debug, Clone)]
pub(crate) struct AppendEntriesReplyFromPeerDescriptor {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
    pub(crate) seq_no: u64,
    pub(crate) previous_log_entry_index: Option<Index>,
    pub(crate) num_log_entries: usize,
}

/// LeaderTimerTick contains info for a single tick of a leader's per-peer timer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderTimerTick {
    pub(crate) peer_id: ReplicaId,
    pub(crate) term: Term,
}

#[derive(Debug)]
pub(crate) struct PeerConnectionChanged {
    pub(crate) peer_id: ReplicaId,
    pub(crate) connected: bool,
}

#[derive(Debug)]
pub(crate) struct InitiateVoteInput {
    pub(crate) requested_by: ReplicaId,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum InitiateVoteError {
    #[error("replica is not initialized")]
    NotInitialized,
    #[error("replica is already leader")]
    Leader,
    #[error(transparent)]
    ActorExited(#[from] ActorExited),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum TransferLeadershipError {
    #[error("not leader, leader is {0:?}")]
    NotLeader(Option<LeaderRedirectInfo>),
    #[error("no peer is caught up enough to take over")]
    NoEligiblePeer,
    #[error("replica is shutting down")]
    ShuttingDown,
}

impl From<ActorExited> for TransferLeadershipError {
    fn from(_: ActorExited) -> Self {
        TransferLeadershipError::ShuttingDown
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReplicaStatus {
    pub(crate) replica_id: ReplicaId,
    pub(crate) role: ElectionStateSnapshot,
    pub(crate) term: Term,
    pub(crate) last_log_entry: Option<(Term, Index)>,
    pub(crate) commit_index: Option<Index>,
    pub(crate) last_applied: Option<Index>,
    pub(crate) cluster_size: usize,
    pub(crate) initialized: bool,
    pub(crate) members: Vec<MemberStatus>,
}
