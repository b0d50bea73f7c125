use crate::actor::ActorExited;
use crate::replica::PeerProxyHandle;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// ReplicaId is the member's hostname as configured by the application.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct ReplicaId(String);

impl ReplicaId {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        ReplicaId(id.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MemberInfo {
    pub(crate) id: ReplicaId,
    pub(crate) ip: Ipv4Addr,
    pub(crate) port: u16,
}

impl MemberInfo {
    pub(crate) fn new(id: ReplicaId, ip: Ipv4Addr, port: u16) -> Self {
        MemberInfo { id, ip, port }
    }

    pub(crate) fn rpc_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ProxyState {
    Disconnected,
    Busy,
    /// Added at runtime and never connected. Not counted in the cluster size yet.
    PendingAdd,
}

pub(crate) struct PeerProxy {
    info: MemberInfo,
    // Dropping the handle stops the proxy task, and with it any reconnect attempts.
    handle: Option<PeerProxyHandle>,
    proxy_state: ProxyState,
    is_deleted: bool,
}

impl PeerProxy {
    pub(crate) fn info(&self) -> &MemberInfo {
        &self.info
    }

    pub(crate) fn handle(&self) -> Option<&PeerProxyHandle> {
        self.handle.as_ref()
    }

    pub(crate) fn proxy_state(&self) -> ProxyState {
        self.proxy_state
    }

    fn is_voting(&self) -> bool {
        !self.is_deleted && self.proxy_state != ProxyState::PendingAdd
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MemberStatus {
    pub(crate) info: MemberInfo,
    pub(crate) proxy_state: Option<ProxyState>,
    pub(crate) is_deleted: bool,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum MembershipError {
    #[error("{0:?} is already a cluster member")]
    AlreadyMember(ReplicaId),
    #[error("{0:?} is not a cluster member")]
    NotMember(ReplicaId),
    #[error("a replica can't remove itself from the cluster")]
    RemoveSelf,
    #[error("replica is shutting down")]
    ShuttingDown,
}

impl From<ActorExited> for MembershipError {
    fn from(_: ActorExited) -> Self {
        MembershipError::ShuttingDown
    }
}

/// ClusterTracker is the local view of cluster membership, plus the size used for majority math.
pub(crate) struct ClusterTracker {
    my_info: MemberInfo,
    peers: HashMap<ReplicaId, PeerProxy>,
    cluster_size: usize,
}

impl ClusterTracker {
    /// Initial members count toward the cluster size right away.
    pub(crate) fn new(my_info: MemberInfo, initial_peers: Vec<(MemberInfo, PeerProxyHandle)>) -> Self {
        let mut peers = HashMap::with_capacity(initial_peers.len());
        for (info, handle) in initial_peers {
            peers.insert(
                info.id.clone(),
                PeerProxy {
                    info,
                    handle: Some(handle),
                    proxy_state: ProxyState::Disconnected,
                    is_deleted: false,
                },
            );
        }

        let cluster_size = 1 + peers.len();
        ClusterTracker {
            my_info,
            peers,
            cluster_size,
        }
    }

    pub(crate) fn my_replica_id(&self) -> &ReplicaId {
        &self.my_info.id
    }

    pub(crate) fn contains_member(&self, id: &ReplicaId) -> bool {
        self.metadata(id).is_some()
    }

    /// Member info of self or any non-deleted peer.
    pub(crate) fn metadata(&self, id: &ReplicaId) -> Option<&MemberInfo> {
        if id == &self.my_info.id {
            return Some(&self.my_info);
        }
        self.peer(id).map(|p| &p.info)
    }

    pub(crate) fn peer(&self, id: &ReplicaId) -> Option<&PeerProxy> {
        self.peers.get(id).filter(|p| !p.is_deleted)
    }

    pub(crate) fn iter_peers(&self) -> impl Iterator<Item = &PeerProxy> {
        self.peers.values().filter(|p| !p.is_deleted)
    }

    /// Non-deleted peers, including ones still pending their first connection.
    pub(crate) fn peer_ids(&self) -> HashSet<ReplicaId> {
        self.iter_peers().map(|p| p.info.id.clone()).collect()
    }

    /// Peers whose votes and replication acks count toward a majority.
    pub(crate) fn voting_peer_ids(&self) -> HashSet<ReplicaId> {
        self.peers
            .values()
            .filter(|p| p.is_voting())
            .map(|p| p.info.id.clone())
            .collect()
    }

    pub(crate) fn is_voting_peer(&self, id: &ReplicaId) -> bool {
        self.peers.get(id).map(PeerProxy::is_voting).unwrap_or(false)
    }

    pub(crate) fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub(crate) fn majority(&self) -> usize {
        self.cluster_size / 2 + 1
    }

    /// A re-added member that was previously deleted starts over as pending.
    pub(crate) fn add_member(&mut self, info: MemberInfo, handle: PeerProxyHandle) -> Result<(), MembershipError> {
        if self.contains_member(&info.id) {
            return Err(MembershipError::AlreadyMember(info.id));
        }

        self.peers.insert(
            info.id.clone(),
            PeerProxy {
                info,
                handle: Some(handle),
                proxy_state: ProxyState::PendingAdd,
                is_deleted: false,
            },
        );
        Ok(())
    }

    /// Returns false if the member was already deleted.
    pub(crate) fn remove_member(&mut self, id: &ReplicaId) -> Result<bool, MembershipError> {
        if id == &self.my_info.id {
            return Err(MembershipError::RemoveSelf);
        }

        let peer = match self.peers.get_mut(id) {
            Some(peer) => peer,
            None => return Err(MembershipError::NotMember(id.clone())),
        };
        if peer.is_deleted {
            return Ok(false);
        }

        peer.is_deleted = true;
        peer.handle.take();
        if peer.proxy_state != ProxyState::PendingAdd {
            self.cluster_size -= 1;
        }
        Ok(true)
    }

    /// Returns true if this connection made a pending member count toward the cluster size.
    pub(crate) fn mark_connected(&mut self, id: &ReplicaId, connected: bool) -> bool {
        let peer = match self.peers.get_mut(id) {
            Some(peer) if !peer.is_deleted => peer,
            _ => return false,
        };

        match (peer.proxy_state, connected) {
            (ProxyState::PendingAdd, true) => {
                peer.proxy_state = ProxyState::Busy;
                self.cluster_size += 1;
                true
            }
            // Never connected, so nothing changes until it does.
            (ProxyState::PendingAdd, false) => false,
            (_, true) => {
                peer.proxy_state = ProxyState::Busy;
                false
            }
            (_, false) => {
                peer.proxy_state = ProxyState::Disconnected;
                false
            }
        }
    }

    pub(crate) fn member_statuses(&self) -> Vec<MemberStatus> {
        let mut statuses = Vec::with_capacity(self.peers.len() + 1);
        statuses.push(MemberStatus {
            info: self.my_info.clone(),
            proxy_state: None,
            is_deleted: false,
        });
        for peer in self.peers.values() {
            statuses.push(MemberStatus {
                info: peer.info.clone(),
                proxy_state: Some(peer.proxy_state),
                is_deleted: peer.is_deleted,
            });
        }
        statuses.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        statuses
    }
}
