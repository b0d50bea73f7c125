use crate::actor::WeakActorClient;
use crate::commitlog::Index;
use crate::replica::election::timers::LeaderTimerHandle;
use crate::replica::{ReplicaId, Term};
use std::cmp;
use std::collections::HashMap;
use std::time::Duration;

/// LeaderStateTracker holds the leader's per-peer replication progress for a single term.
pub(crate) struct LeaderStateTracker {
    term: Term,
    heartbeat_interval: Duration,
    actor_client: WeakActorClient,
    peer_state: HashMap<ReplicaId, PeerState>,
}

impl LeaderStateTracker {
    pub(super) fn new(term: Term, heartbeat_interval: Duration, actor_client: WeakActorClient) -> Self {
        LeaderStateTracker {
            term,
            heartbeat_interval,
            actor_client,
            peer_state: HashMap::new(),
        }
    }

    /// Starts tracking a peer and spawns its heartbeat timer, which ticks right away.
    pub(crate) fn add_peer(&mut self, peer_id: ReplicaId, latest_log_index: Option<Index>) {
        if self.peer_state.contains_key(&peer_id) {
            return;
        }

        let timer = LeaderTimerHandle::spawn_timer_task(
            self.heartbeat_interval,
            self.actor_client.clone(),
            peer_id.clone(),
            self.term,
        );
        self.peer_state
            .insert(peer_id, PeerState::new(timer, latest_log_index));
    }

    /// Dropping the peer state stops its timer.
    pub(crate) fn remove_peer(&mut self, peer_id: &ReplicaId) -> bool {
        self.peer_state.remove(peer_id).is_some()
    }

    pub(crate) fn peer_state(&self, peer_id: &ReplicaId) -> Option<&PeerState> {
        self.peer_state.get(peer_id)
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn peers_iter(&self) -> impl Iterator<Item = (&ReplicaId, &PeerState)> {
        self.peer_state.iter()
    }
}

pub(crate) struct PeerState {
    leader_timer: LeaderTimerHandle,

    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Index,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: Option<Index>,

    // Logical clock of requests sent to this peer in this term. Replies carry the seq-no of their
    // request, and anything older than the latest received reply is dropped.
    last_sent_seq_no: u64,
    last_received_seq_no: u64,
}

impl PeerState {
    fn new(leader_timer: LeaderTimerHandle, latest_log_index: Option<Index>) -> Self {
        PeerState {
            leader_timer,
            next: latest_log_index
                .map(|i| i.plus(1))
                .unwrap_or_else(Index::start_index),
            matched: None,
            last_sent_seq_no: 0,
            last_received_seq_no: 0,
        }
    }

    pub(crate) fn next_and_previous_log_index(&self) -> (Index, Option<Index>) {
        (self.next, self.next.checked_minus(1))
    }

    pub(crate) fn matched(&self) -> Option<Index> {
        self.matched
    }

    /// Returns false if the reply was out of date and dropped.
    pub(crate) fn handle_append_entries_result(
        &mut self,
        logger: &slog::Logger,
        received_seq_no: u64,
        update: PeerStateUpdate,
    ) -> bool {
        if !self.ratchet_fwd_received_seq_no(received_seq_no) {
            slog::debug!(logger, "Dropping out of date seq-no({}): {:?}", received_seq_no, update);
            return false;
        }

        match update {
            PeerStateUpdate::OtherError => {}
            PeerStateUpdate::Success {
                previous_log_entry,
                num_entries_replicated,
            } => self.update_log(previous_log_entry, num_entries_replicated),
            PeerStateUpdate::PeerLogBehind { peer_last_log_index } => self.rewind_log(logger, peer_last_log_index),
        }
        true
    }

    fn update_log(&mut self, previous_log_entry: Option<Index>, num_entries_replicated: usize) {
        // An accepted heartbeat also proves the peer's log ends exactly at `previous_log_entry`.
        let new_matched = match (previous_log_entry, num_entries_replicated) {
            (None, 0) => return,
            (None, n) => Index::new_usize(n),
            (Some(prev), n) => prev.plus(n as u64),
        };

        self.matched = cmp::max(self.matched, Some(new_matched));
        self.next = new_matched.plus(1);
    }

    /// Steps `next` back by one, or straight to just past the peer's last entry if that is further
    /// back. Never below what's already matched.
    fn rewind_log(&mut self, logger: &slog::Logger, peer_last_log_index: Option<Index>) {
        let one_back = self.next.checked_minus(1).unwrap_or(self.next);
        let after_peer_log = peer_last_log_index
            .map(|i| i.plus(1))
            .unwrap_or_else(Index::start_index);
        let floor = self
            .matched
            .map(|i| i.plus(1))
            .unwrap_or_else(Index::start_index);

        let rewound = cmp::max(cmp::min(one_back, after_peer_log), floor);
        if rewound == self.next {
            slog::warn!(logger, "Can't rewind peer log any further than {:?}", self.next);
        }
        self.next = rewound;
    }

    pub(crate) fn has_outstanding_request(&self) -> bool {
        self.last_received_seq_no < self.last_sent_seq_no
    }

    pub(crate) fn next_seq_no(&mut self) -> u64 {
        self.last_sent_seq_no += 1;
        self.last_sent_seq_no
    }

    fn ratchet_fwd_received_seq_no(&mut self, received_seq_no: u64) -> bool {
        if self.last_received_seq_no < received_seq_no && received_seq_no <= self.last_sent_seq_no {
            self.last_received_seq_no = received_seq_no;
            true
        } else {
            false
        }
    }

    pub(crate) fn reset_heartbeat_timer(&self) {
        self.leader_timer.reset_heartbeat_timer();
    }

    pub(crate) fn trigger_heartbeat_now(&self) {
        self.leader_timer.trigger_now();
    }
}

#[derive(Debug)]
pub(crate) enum PeerStateUpdate {
    Success {
        previous_log_entry: Option<Index>,
        num_entries_replicated: usize,
    },
    PeerLogBehind {
        peer_last_log_index: Option<Index>,
    },
    OtherError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn tracked_peer(tracker: &mut LeaderStateTracker, latest: Option<Index>) -> &mut PeerState {
        let peer_id = ReplicaId::new("b");
        tracker.add_peer(peer_id.clone(), latest);
        tracker.peer_state_mut(&peer_id).unwrap()
    }

    fn send(peer: &mut PeerState) -> (u64, Option<Index>) {
        (peer.next_seq_no(), peer.next_and_previous_log_index().1)
    }

    #[tokio::test]
    async fn rewinds_to_peer_log_end_then_catches_up() {
        let (client, _rx) = ActorClient::new(10);
        let mut tracker = LeaderStateTracker::new(Term::new(3), Duration::from_secs(60), client.weak());
        let logger = logger();
        let peer = tracked_peer(&mut tracker, Some(Index::new(10)));
        assert_eq!(peer.next_and_previous_log_index(), (Index::new(11), Some(Index::new(10))));

        // Peer only has 4 entries, skip straight there.
        let (seq_no, _) = send(peer);
        assert!(peer.has_outstanding_request());
        let update = PeerStateUpdate::PeerLogBehind {
            peer_last_log_index: Some(Index::new(4)),
        };
        assert!(peer.handle_append_entries_result(&logger, seq_no, update));
        assert!(!peer.has_outstanding_request());
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(5));

        // Hint further ahead than where we are only steps back by one.
        let (seq_no, _) = send(peer);
        let update = PeerStateUpdate::PeerLogBehind {
            peer_last_log_index: Some(Index::new(9)),
        };
        peer.handle_append_entries_result(&logger, seq_no, update);
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(4));

        let (seq_no, prev) = send(peer);
        let update = PeerStateUpdate::Success {
            previous_log_entry: prev,
            num_entries_replicated: 1,
        };
        peer.handle_append_entries_result(&logger, seq_no, update);
        assert_eq!(peer.matched(), Some(Index::new(4)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(5));

        // Never rewinds into the matched range.
        let (seq_no, _) = send(peer);
        let update = PeerStateUpdate::PeerLogBehind {
            peer_last_log_index: None,
        };
        peer.handle_append_entries_result(&logger, seq_no, update);
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(5));
    }

    #[tokio::test]
    async fn accepted_heartbeat_marks_previous_entry_matched() {
        let (client, _rx) = ActorClient::new(10);
        let mut tracker = LeaderStateTracker::new(Term::new(3), Duration::from_secs(60), client.weak());
        let logger = logger();
        let peer = tracked_peer(&mut tracker, Some(Index::new(7)));

        let (seq_no, prev) = send(peer);
        let update = PeerStateUpdate::Success {
            previous_log_entry: prev,
            num_entries_replicated: 0,
        };
        peer.handle_append_entries_result(&logger, seq_no, update);
        assert_eq!(peer.matched(), Some(Index::new(7)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(8));
    }

    #[tokio::test]
    async fn drops_stale_and_unsent_seq_nos() {
        let (client, _rx) = ActorClient::new(10);
        let mut tracker = LeaderStateTracker::new(Term::new(3), Duration::from_secs(60), client.weak());
        let logger = logger();
        let peer = tracked_peer(&mut tracker, None);

        let (first, _) = send(peer);
        let (second, _) = send(peer);
        assert!(peer.handle_append_entries_result(&logger, second, PeerStateUpdate::OtherError));
        assert!(!peer.handle_append_entries_result(&logger, first, PeerStateUpdate::OtherError));
        assert!(!peer.handle_append_entries_result(&logger, second + 1, PeerStateUpdate::OtherError));

        assert!(tracker.remove_peer(&ReplicaId::new("b")));
        assert!(tracker.peers_iter().next().is_none());
    }
}
