use crate::actor::ActorClient;
use crate::api::types::{RaftLeaderInfo, RaftMemberInfo, RaftStatus};
use crate::api::{DirectoryLog, RaftCommitStream, RaftEventListener};
use crate::replica::{self, MemberInfo, ReplicaId};
use crate::server::RpcServerShutdownHandle;
use std::sync::Mutex;

/// RaftClient is the application's handle on the local replica.
pub struct RaftClient {
    pub directory: DirectoryLog,
    pub commit_stream: RaftCommitStream,
    pub event_listener: RaftEventListener,
    actor_client: ActorClient,
    // Taken on the first shutdown.
    server_shutdown_handle: Mutex<Option<RpcServerShutdownHandle>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipChangeError {
    #[error("Not leader, leader is {0:?}")]
    NotLeader(Option<RaftLeaderInfo>),
    #[error("{0} is already a cluster member")]
    AlreadyMember(String),
    #[error("{0} is not a cluster member")]
    NotMember(String),
    #[error("A replica can't remove itself from the cluster")]
    RemoveSelf,
    #[error("No member is caught up enough to take over leadership")]
    NoEligibleMember,
    #[error("Replica is shutting down")]
    ShuttingDown,
}

impl RaftClient {
    pub(crate) fn new(
        directory: DirectoryLog,
        commit_stream: RaftCommitStream,
        event_listener: RaftEventListener,
        actor_client: ActorClient,
        server_shutdown_handle: RpcServerShutdownHandle,
    ) -> Self {
        RaftClient {
            directory,
            commit_stream,
            event_listener,
            actor_client,
            server_shutdown_handle: Mutex::new(Some(server_shutdown_handle)),
        }
    }

    pub async fn status(&self) -> Option<RaftStatus> {
        self.actor_client.status().await.ok().map(RaftStatus::from)
    }

    /// Leader only. The new member takes part in replication right away, and counts towards the
    /// majority once it has been reached for the first time.
    pub async fn add_member(&self, member: RaftMemberInfo) -> Result<(), MembershipChangeError> {
        self.require_leader().await?;
        self.actor_client
            .add_member(MemberInfo::from(member))
            .await
            .map_err(MembershipChangeError::from)
    }

    /// Leader only. The member stops counting towards the majority immediately.
    pub async fn remove_member(&self, replica_id: &str) -> Result<(), MembershipChangeError> {
        self.require_leader().await?;
        self.actor_client
            .remove_member(ReplicaId::new(replica_id))
            .await
            .map_err(MembershipChangeError::from)
    }

    /// Asks a caught-up follower, or `target` if given, to start an election right away. Returns
    /// the chosen member's id.
    pub async fn transfer_leadership(&self, target: Option<&str>) -> Result<String, MembershipChangeError> {
        self.actor_client
            .transfer_leadership(target.map(ReplicaId::new))
            .await
            .map(ReplicaId::into_inner)
            .map_err(MembershipChangeError::from)
    }

    /// Lets a replica created with `initialized: false` vote, accept entries and start elections.
    pub async fn mark_initialized(&self) {
        let _ = self.actor_client.mark_initialized().await;
    }

    /// Fails pending writes, stops the RPC server, peer connections and timers, then ends the
    /// replica task. Calling it again does nothing.
    pub async fn shutdown(&self) {
        let handle = match self.server_shutdown_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.shutdown();
        }

        // Already exited is fine.
        let _ = self.actor_client.shutdown().await;
    }

    async fn require_leader(&self) -> Result<(), MembershipChangeError> {
        let status = self
            .actor_client
            .status()
            .await
            .map_err(|_| MembershipChangeError::ShuttingDown)?;
        match status.role {
            replica::ElectionStateSnapshot::Leader => Ok(()),
            replica::ElectionStateSnapshot::Follower(leader) => {
                Err(MembershipChangeError::NotLeader(Some(RaftLeaderInfo::from(leader))))
            }
            _ => Err(MembershipChangeError::NotLeader(None)),
        }
    }
}

// ------- Conversions --------

impl From<replica::MembershipError> for MembershipChangeError {
    fn from(internal_error: replica::MembershipError) -> Self {
        match internal_error {
            replica::MembershipError::AlreadyMember(id) => MembershipChangeError::AlreadyMember(id.into_inner()),
            replica::MembershipError::NotMember(id) => MembershipChangeError::NotMember(id.into_inner()),
            replica::MembershipError::RemoveSelf => MembershipChangeError::RemoveSelf,
            replica::MembershipError::ShuttingDown => MembershipChangeError::ShuttingDown,
        }
    }
}

impl From<replica::TransferLeadershipError> for MembershipChangeError {
    fn from(internal_error: replica::TransferLeadershipError) -> Self {
        match internal_error {
            replica::TransferLeadershipError::NotLeader(leader) => {
                MembershipChangeError::NotLeader(leader.map(RaftLeaderInfo::from))
            }
            replica::TransferLeadershipError::NoEligiblePeer => MembershipChangeError::NoEligibleMember,
            replica::TransferLeadershipError::ShuttingDown => MembershipChangeError::ShuttingDown,
        }
    }
}
