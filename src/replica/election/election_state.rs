use crate::actor::WeakActorClient;
use crate::commitlog::Index;
use crate::replica::election::state_change_listener::{self, ElectionStateChangeNotifier};
use crate::replica::election::timers::FollowerTimerHandle;
use crate::replica::election::LeaderStateTracker;
use crate::replica::{ElectionStateChangeListener, ElectionStateSnapshot, LeaderRedirectInfo, ReplicaId, Term};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct ElectionConfig {
    pub(crate) my_replica_id: ReplicaId,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) election_timeout_min: Duration,
    pub(crate) election_timeout_max: Duration,
}

/// ElectionState holds what is specific to the replica's current role. Its methods decide "what"
/// happens on a role change. It does NOT validate terms or logs, or decide "when" to change roles.
pub(crate) struct ElectionState {
    role: Role,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    state_change_notifier: ElectionStateChangeNotifier,
}

enum Role {
    Leader(LeaderStateTracker),
    Candidate {
        received_votes_from: HashSet<ReplicaId>,
        election_timer: FollowerTimerHandle,
    },
    Follower {
        leader: Option<LeaderRedirectInfo>,
        election_timer: FollowerTimerHandle,
    },
}

impl ElectionState {
    pub(crate) fn new_follower(
        config: ElectionConfig,
        actor_client: WeakActorClient,
    ) -> (Self, ElectionStateChangeListener) {
        let role = Role::Follower {
            leader: None,
            election_timer: spawn_election_timer(&config, &actor_client),
        };
        let (notifier, listener) = state_change_listener::new(snapshot(&role));

        let election_state = ElectionState {
            role,
            config,
            actor_client,
            state_change_notifier: notifier,
        };

        (election_state, listener)
    }

    pub(crate) fn transition_to_follower(&mut self, leader: Option<LeaderRedirectInfo>) {
        self.role = Role::Follower {
            leader,
            election_timer: spawn_election_timer(&self.config, &self.actor_client),
        };
        self.notify_new_state();
    }

    pub(crate) fn transition_to_candidate_and_vote_for_self(&mut self) {
        let mut received_votes_from = HashSet::new();
        received_votes_from.insert(self.config.my_replica_id.clone());

        self.role = Role::Candidate {
            received_votes_from,
            election_timer: spawn_election_timer(&self.config, &self.actor_client),
        };
        self.notify_new_state();
    }

    /// Every peer in `peer_ids` gets a heartbeat timer that ticks right away.
    pub(crate) fn transition_to_leader(
        &mut self,
        term: Term,
        peer_ids: HashSet<ReplicaId>,
        latest_log_index: Option<Index>,
    ) {
        let mut tracker = LeaderStateTracker::new(term, self.config.heartbeat_interval, self.actor_client.clone());
        for peer_id in peer_ids {
            tracker.add_peer(peer_id, latest_log_index);
        }

        self.role = Role::Leader(tracker);
        self.notify_new_state();
    }

    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        snapshot(&self.role)
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader(_))
    }

    pub(crate) fn is_follower(&self) -> bool {
        matches!(self.role, Role::Follower { .. })
    }

    /// Known leader when following, for redirecting writes.
    pub(crate) fn leader(&self) -> Option<&LeaderRedirectInfo> {
        match &self.role {
            Role::Follower { leader, .. } => leader.as_ref(),
            _ => None,
        }
    }

    fn notify_new_state(&self) {
        self.state_change_notifier.notify_new_state(snapshot(&self.role));
    }

    pub(crate) fn reset_timeout_if_follower(&self) {
        if let Role::Follower { election_timer, .. } = &self.role {
            election_timer.reset_timeout();
        }
    }

    /// Makes a follower or candidate start an election without waiting out its timeout.
    pub(crate) fn expire_timeout_now(&self) {
        match &self.role {
            Role::Follower { election_timer, .. } | Role::Candidate { election_timer, .. } => {
                election_timer.expire_now()
            }
            Role::Leader(_) => {}
        }
    }

    pub(crate) fn set_leader_if_changed(&mut self, new_leader: &LeaderRedirectInfo) {
        if let Role::Follower { leader, .. } = &mut self.role {
            if leader.as_ref() != Some(new_leader) {
                leader.replace(new_leader.clone());
                self.notify_new_state();
            }
        }
    }

    /// Returns the number of votes received, or None if no longer candidate.
    pub(crate) fn add_vote_if_candidate(&mut self, vote_from: ReplicaId) -> Option<usize> {
        if let Role::Candidate {
            received_votes_from, ..
        } = &mut self.role
        {
            received_votes_from.insert(vote_from);
            Some(received_votes_from.len())
        } else {
            None
        }
    }

    pub(crate) fn leader_state(&self) -> Option<&LeaderStateTracker> {
        match &self.role {
            Role::Leader(tracker) => Some(tracker),
            _ => None,
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderStateTracker> {
        match &mut self.role {
            Role::Leader(tracker) => Some(tracker),
            _ => None,
        }
    }

    pub(crate) fn add_peer_if_leader(&mut self, peer_id: ReplicaId, latest_log_index: Option<Index>) {
        if let Some(tracker) = self.leader_state_mut() {
            tracker.add_peer(peer_id, latest_log_index);
        }
    }

    pub(crate) fn remove_peer_if_leader(&mut self, peer_id: &ReplicaId) {
        if let Some(tracker) = self.leader_state_mut() {
            tracker.remove_peer(peer_id);
        }
    }
}

fn spawn_election_timer(config: &ElectionConfig, actor_client: &WeakActorClient) -> FollowerTimerHandle {
    FollowerTimerHandle::spawn_timer_task(
        config.election_timeout_min,
        config.election_timeout_max,
        actor_client.clone(),
    )
}

fn snapshot(role: &Role) -> ElectionStateSnapshot {
    match role {
        Role::Leader(_) => ElectionStateSnapshot::Leader,
        Role::Candidate { .. } => ElectionStateSnapshot::Candidate,
        Role::Follower { leader: None, .. } => ElectionStateSnapshot::FollowerNoLeader,
        Role::Follower {
            leader: Some(leader), ..
        } => ElectionStateSnapshot::Follower(leader.clone()),
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Role::Leader(_) => write!(f, "Leader"),
            Role::Candidate { .. } => write!(f, "Candidate"),
            Role::Follower {
                leader: Some(leader), ..
            } => write!(f, "Follower(Leader={:?})", leader.replica_id),
            Role::Follower { leader: None, .. } => write!(f, "Follower(Leader=None)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;

    fn config() -> ElectionConfig {
        ElectionConfig {
            my_replica_id: ReplicaId::new("a"),
            heartbeat_interval: Duration::from_secs(60),
            election_timeout_min: Duration::from_secs(60),
            election_timeout_max: Duration::from_secs(61),
        }
    }

    fn leader_info(id: &str) -> LeaderRedirectInfo {
        LeaderRedirectInfo {
            replica_id: ReplicaId::new(id),
            address: None,
        }
    }

    #[tokio::test]
    async fn role_changes_are_published() {
        let (client, _rx) = ActorClient::new(10);
        let (mut state, mut listener) = ElectionState::new_follower(config(), client.weak());
        assert!(matches!(state.current_state(), ElectionStateSnapshot::FollowerNoLeader));

        state.set_leader_if_changed(&leader_info("b"));
        assert_eq!(
            listener.next().await.unwrap(),
            ElectionStateSnapshot::Follower(leader_info("b"))
        );
        assert_eq!(state.leader(), Some(&leader_info("b")));

        state.transition_to_candidate_and_vote_for_self();
        assert_eq!(listener.next().await.unwrap(), ElectionStateSnapshot::Candidate);
        // Our own vote is already counted.
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("a")), Some(1));
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("c")), Some(2));

        let peers = vec![ReplicaId::new("b"), ReplicaId::new("c")].into_iter().collect();
        state.transition_to_leader(Term::new(2), peers, Some(Index::new(4)));
        assert_eq!(listener.next().await.unwrap(), ElectionStateSnapshot::Leader);
        assert!(state.is_leader());
        assert_eq!(state.add_vote_if_candidate(ReplicaId::new("b")), None);
        assert_eq!(state.leader_state().unwrap().peers_iter().count(), 2);

        state.remove_peer_if_leader(&ReplicaId::new("b"));
        state.add_peer_if_leader(ReplicaId::new("d"), Some(Index::new(5)));
        let tracker = state.leader_state().unwrap();
        assert!(tracker.peer_state(&ReplicaId::new("b")).is_none());
        assert_eq!(
            tracker.peer_state(&ReplicaId::new("d")).unwrap().next_and_previous_log_index().0,
            Index::new(6)
        );
    }
}
