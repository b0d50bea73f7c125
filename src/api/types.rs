use crate::commitlog::Index;
use crate::replica;
use std::net::{Ipv4Addr, SocketAddrV4};

/// A cluster member as the application configures it. The replica id is the member's hostname.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftMemberInfo {
    pub replica_id: String,
    pub ip_addr: Ipv4Addr,
    pub raft_rpc_port: u16,
}

impl From<RaftMemberInfo> for replica::MemberInfo {
    fn from(member_info: RaftMemberInfo) -> Self {
        Self::new(
            replica::ReplicaId::new(member_info.replica_id),
            member_info.ip_addr,
            member_info.raft_rpc_port,
        )
    }
}

impl From<replica::MemberInfo> for RaftMemberInfo {
    fn from(member_info: replica::MemberInfo) -> Self {
        Self {
            replica_id: member_info.id.into_inner(),
            ip_addr: member_info.ip,
            raft_rpc_port: member_info.port,
        }
    }
}

/// Where to send writes instead. The address is unknown if the leader isn't in our member list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftLeaderInfo {
    pub replica_id: String,
    pub address: Option<SocketAddrV4>,
}

impl From<replica::LeaderRedirectInfo> for RaftLeaderInfo {
    fn from(internal_leader: replica::LeaderRedirectInfo) -> Self {
        Self {
            replica_id: internal_leader.replica_id.into_inner(),
            address: internal_leader.address,
        }
    }
}

/// Position of a committed write in the replicated log. Matches the `index` and `term` of the
/// corresponding update on the commit stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WriteReceipt {
    pub term: u32,
    pub index: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RaftRole {
    Leader,
    Candidate,
    Follower,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RaftConnectionState {
    Connected,
    Disconnected,
    /// Added at runtime and never reached yet. Doesn't count towards the majority.
    PendingAdd,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftMemberStatus {
    pub member: RaftMemberInfo,
    /// `None` for the local replica.
    pub connection: Option<RaftConnectionState>,
    pub is_deleted: bool,
}

/// Snapshot of the local replica's view of the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RaftStatus {
    pub replica_id: String,
    pub role: RaftRole,
    pub term: u32,
    pub leader: Option<RaftLeaderInfo>,
    /// 0 when the log is empty. Same for the other indexes.
    pub last_log_index: u64,
    pub last_log_term: u32,
    pub commit_index: u64,
    pub last_applied: u64,
    pub cluster_size: usize,
    pub initialized: bool,
    pub members: Vec<RaftMemberStatus>,
}

// ------- Conversions --------

impl From<replica::ReplicaStatus> for RaftStatus {
    fn from(status: replica::ReplicaStatus) -> Self {
        let my_address = status
            .members
            .iter()
            .find(|m| m.info.id == status.replica_id)
            .map(|m| m.info.rpc_addr());
        let (role, leader) = match status.role {
            replica::ElectionStateSnapshot::Leader => (
                RaftRole::Leader,
                Some(RaftLeaderInfo {
                    replica_id: status.replica_id.as_str().to_string(),
                    address: my_address,
                }),
            ),
            replica::ElectionStateSnapshot::Candidate => (RaftRole::Candidate, None),
            replica::ElectionStateSnapshot::Follower(leader) => (RaftRole::Follower, Some(leader.into())),
            replica::ElectionStateSnapshot::FollowerNoLeader => (RaftRole::Follower, None),
        };

        let (last_log_term, last_log_index) = match status.last_log_entry {
            Some((term, index)) => (term.as_u32(), index.as_u64()),
            None => (0, 0),
        };

        RaftStatus {
            replica_id: status.replica_id.into_inner(),
            role,
            term: status.term.as_u32(),
            leader,
            last_log_index,
            last_log_term,
            commit_index: Index::opt_as_u64(status.commit_index),
            last_applied: Index::opt_as_u64(status.last_applied),
            cluster_size: status.cluster_size,
            initialized: status.initialized,
            members: status.members.into_iter().map(RaftMemberStatus::from).collect(),
        }
    }
}

impl From<replica::MemberStatus> for RaftMemberStatus {
    fn from(status: replica::MemberStatus) -> Self {
        RaftMemberStatus {
            member: status.info.into(),
            connection: status.proxy_state.map(|state| match state {
                replica::ProxyState::Busy => RaftConnectionState::Connected,
                replica::ProxyState::Disconnected => RaftConnectionState::Disconnected,
                replica::ProxyState::PendingAdd => RaftConnectionState::PendingAdd,
            }),
            is_deleted: status.is_deleted,
        }
    }
}
