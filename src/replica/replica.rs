use crate::actor::{Callback, WeakActorClient};
use crate::codec::SchemaContext;
use crate::commitlog::{Index, Log};
use crate::replica::election::{ElectionConfig, ElectionState, PeerStateUpdate};
use crate::replica::{
    AppendEntriesError, AppendEntriesInput, AppendEntriesOutput, AppendEntriesPayload, AppendEntriesReplyFromPeer,
    AppendEntriesReplyFromPeerDescriptor, AppendEntriesStatus, ClusterTracker, ElectionStateChangeListener,
    ElectionStateSnapshot, InitiateVoteError, InitiateVoteInput, LeaderRedirectInfo, LeaderTimerTick, LogRecord,
    LookupResult, MemberInfo, MembershipError, PeerConnectionChanged, PeerProxyConfig, PeerProxyHandle, PeerRequest,
    PersistentLocalState, ReplicaId, ReplicaStatus, RequestVoteError, RequestVoteInput, RequestVoteOutput,
    RequestVoteReplyFromPeer, Term, TransferLeadershipError, TransportError, VoteDecision, WriteAheadLog,
    WriteToLogError, WriteToLogInput, WriteToLogOutput,
};
use std::collections::BTreeMap;
use std::io;
use std::mem;
use std::time::Duration;
use tokio::time::Instant;

type PendingWrite = (Term, Callback<WriteToLogOutput, WriteToLogError>);

pub(crate) struct ReplicaConfig<L, S>
where
    L: Log<LogRecord>,
    S: PersistentLocalState,
{
    pub(crate) logger: slog::Logger,
    pub(crate) cluster_tracker: ClusterTracker,
    pub(crate) wal: WriteAheadLog<L>,
    pub(crate) local_state: S,
    pub(crate) actor_client: WeakActorClient,
    pub(crate) schema: SchemaContext,
    pub(crate) initialized: bool,
    pub(crate) election: ElectionConfig,
    pub(crate) ping_interval: Duration,
    pub(crate) apply_lag_max: u64,
    pub(crate) log_retention_count: u64,
    pub(crate) proxy_config: PeerProxyConfig,
}

/// Replica is the raft state machine of one cluster member. Every method runs on the actor task,
/// so nothing here is ever called concurrently.
pub(crate) struct Replica<L, S>
where
    L: Log<LogRecord>,
    S: PersistentLocalState,
{
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    wal: WriteAheadLog<L>,
    local_state: S,
    election_state: ElectionState,
    actor_client: WeakActorClient,
    schema: SchemaContext,

    // Uninitialized replicas neither vote nor accept entries.
    initialized: bool,
    ping_interval: Duration,
    apply_lag_max: u64,
    log_retention_count: u64,
    proxy_config: PeerProxyConfig,

    // Leader only. Client writes waiting for their entry to be applied, keyed by log index.
    pending_writes: BTreeMap<Index, PendingWrite>,
    last_retention_trim: Instant,
}

impl<L, S> Replica<L, S>
where
    L: Log<LogRecord>,
    S: PersistentLocalState,
{
    pub(crate) fn new(config: ReplicaConfig<L, S>) -> (Self, ElectionStateChangeListener) {
        let (election_state, listener) = ElectionState::new_follower(config.election, config.actor_client.clone());

        let replica = Replica {
            logger: config.logger,
            cluster_tracker: config.cluster_tracker,
            wal: config.wal,
            local_state: config.local_state,
            election_state,
            actor_client: config.actor_client,
            schema: config.schema,
            initialized: config.initialized,
            ping_interval: config.ping_interval,
            apply_lag_max: config.apply_lag_max,
            log_retention_count: config.log_retention_count,
            proxy_config: config.proxy_config,
            pending_writes: BTreeMap::new(),
            last_retention_trim: Instant::now(),
        };

        (replica, listener)
    }

    // ---- client writes ----

    pub(crate) fn handle_write_to_log(
        &mut self,
        input: WriteToLogInput,
        callback: Callback<WriteToLogOutput, WriteToLogError>,
    ) {
        if !self.election_state.is_leader() {
            callback.send(Err(WriteToLogError::NotLeader(self.election_state.leader().cloned())));
            return;
        }

        // > If command received from client: append entry to local log,
        // > respond after entry applied to state machine (§5.3)
        let term = self.local_state.current_term();
        let index = self.wal.next_index();
        let record = match LogRecord::for_change(index, term, &input.change) {
            Ok(record) => record,
            Err(e) => {
                callback.send(Err(WriteToLogError::InvalidEntry(e)));
                return;
            }
        };
        if let Err(e) = self.wal.append_at(record) {
            slog::error!(self.logger, "Failed to append client write at {:?}: {}", index, e);
            callback.send(Err(WriteToLogError::LocalIoError(e)));
            return;
        }

        slog::debug!(self.logger, "Appended client write at {:?} in term {:?}", index, term);
        self.pending_writes.insert(index, (term, callback));

        // No-op with peers, commits right away when we're alone.
        self.try_advance_commit_index();

        if let Some(leader_state) = self.election_state.leader_state() {
            for (_, peer_state) in leader_state.peers_iter() {
                if !peer_state.has_outstanding_request() {
                    peer_state.trigger_heartbeat_now();
                }
            }
        }
    }

    // ---- RequestVote ----

    pub(crate) fn handle_request_vote(&mut self, input: RequestVoteInput) -> Result<RequestVoteOutput, RequestVoteError> {
        if !self.initialized {
            return Err(RequestVoteError::NotInitialized);
        }

        let current_term = self.local_state.current_term();
        let candidate_log_behind = !self.is_candidate_log_gte_mine(input.candidate_last_log_entry);

        // 1. Reply false if term < currentTerm (§5.1)
        if input.candidate_term < current_term {
            slog::info!(
                self.logger,
                "Not granting vote to {:?}. Candidate term {:?} is behind ours {:?}.",
                input.candidate_id,
                input.candidate_term,
                current_term
            );
            let decision = if candidate_log_behind {
                VoteDecision::StrongDenied
            } else {
                VoteDecision::Denied
            };
            return Ok(self.vote(decision));
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        let term_adopted = input.candidate_term > current_term;
        if term_adopted {
            self.observe_term(input.candidate_term, None)
                .map_err(RequestVoteError::LocalIoError)?;
        }

        if candidate_log_behind {
            slog::info!(
                self.logger,
                "Strongly denying vote to {:?}. Candidate log {:?} is behind ours {:?}.",
                input.candidate_id,
                input.candidate_last_log_entry,
                self.wal.latest_entry()
            );
            // Only a term we just adopted has no leader yet. Within our current term, a live
            // leader keeps its followers.
            if term_adopted {
                self.election_state.expire_timeout_now();
            }
            return Ok(self.vote(VoteDecision::StrongDenied));
        }

        if self.election_state.is_leader() {
            slog::info!(self.logger, "Not granting vote to {:?}. We're leader of this term.", input.candidate_id);
            return Ok(self.vote(VoteDecision::Denied));
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        let term = self.local_state.current_term();
        let stored = self
            .local_state
            .store_vote_for_term_if_unvoted(term, input.candidate_id.clone())
            .map_err(RequestVoteError::LocalIoError)?;

        let decision = if stored {
            slog::info!(self.logger, "Voting for {:?} in term {:?}.", input.candidate_id, term);
            self.election_state.reset_timeout_if_follower();
            VoteDecision::Granted
        } else {
            match self.local_state.voted_for_current_term() {
                // Candidate retried.
                (voted_term, Some(voted_for)) if voted_term == term && voted_for == input.candidate_id => {
                    VoteDecision::Granted
                }
                (_, voted_for) => {
                    slog::info!(
                        self.logger,
                        "Not granting vote to {:?}. Already voted for {:?}.",
                        input.candidate_id,
                        voted_for
                    );
                    VoteDecision::Denied
                }
            }
        };

        Ok(self.vote(decision))
    }

    fn vote(&self, decision: VoteDecision) -> RequestVoteOutput {
        RequestVoteOutput {
            term: self.local_state.current_term(),
            decision,
        }
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_entry: Option<(Term, Index)>) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        match (self.wal.latest_entry(), candidate_last_entry) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(candidate)) => candidate >= mine,
        }
    }

    pub(crate) fn handle_request_vote_reply(&mut self, reply: RequestVoteReplyFromPeer) {
        let current_term = self.local_state.current_term();
        if current_term != reply.term {
            slog::debug!(
                self.logger,
                "Dropping vote from {:?} for outdated term {:?}, current term: {:?}.",
                reply.peer_id,
                reply.term,
                current_term,
            );
            return;
        }

        let output = match reply.result {
            Ok(output) => output,
            Err(e) => {
                slog::info!(self.logger, "RequestVote to {:?} failed: {}", reply.peer_id, e);
                return;
            }
        };

        if output.term > current_term {
            if let Err(e) = self.observe_term(output.term, None) {
                slog::error!(self.logger, "Failed to persist term {:?}: {:?}", output.term, e);
            }
            return;
        }

        match output.decision {
            VoteDecision::Granted => {
                if !self.cluster_tracker.is_voting_peer(&reply.peer_id) {
                    slog::info!(self.logger, "Ignoring vote from non-voting member {:?}", reply.peer_id);
                    return;
                }

                let num_votes = match self.election_state.add_vote_if_candidate(reply.peer_id) {
                    Some(num_votes) => num_votes,
                    None => return,
                };
                let majority = self.cluster_tracker.majority();
                slog::info!(
                    self.logger,
                    "Received {}/{} votes for term {:?}",
                    num_votes,
                    majority,
                    current_term
                );
                if num_votes >= majority {
                    self.become_leader();
                }
            }
            VoteDecision::Denied => {
                slog::info!(self.logger, "Vote not granted by {:?} for term {:?}", reply.peer_id, current_term);
            }
            VoteDecision::StrongDenied => {
                if self.election_state.current_state() == ElectionStateSnapshot::Candidate {
                    slog::info!(
                        self.logger,
                        "{:?} has a more up to date log. Giving up election for term {:?}.",
                        reply.peer_id,
                        current_term
                    );
                    self.election_state.transition_to_follower(None);
                }
            }
        }
    }

    // ---- AppendEntries ----

    pub(crate) fn handle_append_entries(
        &mut self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        if !self.initialized {
            return Err(AppendEntriesError::NotInitialized);
        }

        let result = self.try_handle_append_entries(input);
        // Time spent persisting must never count toward our election timeout.
        self.election_state.reset_timeout_if_follower();
        result
    }

    fn try_handle_append_entries(
        &mut self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        // 1. Reply false if term < currentTerm (§5.1)
        let current_term = self.local_state.current_term();
        if input.leader_term < current_term {
            slog::warn!(
                self.logger,
                "Rejecting AppendEntries from {:?}. Its term {:?} is behind ours {:?}.",
                input.leader_id,
                input.leader_term,
                current_term
            );
            return Ok(self.rejected());
        }

        let leader = self.redirect_info(&input.leader_id);
        if input.leader_term > current_term {
            let was_follower = self.election_state.is_follower();
            self.observe_term(input.leader_term, Some(leader.clone()))
                .map_err(AppendEntriesError::LocalIoError)?;
            if !was_follower {
                // Leader retries once we're a clean follower.
                return Ok(self.rejected());
            }
            self.election_state.set_leader_if_changed(&leader);
        } else if self.election_state.is_leader() {
            slog::error!(
                self.logger,
                "Received AppendEntries from {:?} while we're leader of the same term {:?}.",
                input.leader_id,
                current_term
            );
            return Ok(self.rejected());
        } else if self.election_state.is_follower() {
            self.election_state.set_leader_if_changed(&leader);
        } else {
            slog::info!(self.logger, "{:?} won the election for term {:?}.", input.leader_id, current_term);
            self.step_down(Some(leader));
        }

        // 2. Reply false if log doesn't contain an entry at prevLogIndex
        // whose term matches prevLogTerm (§5.3)
        let previous_log_index = match input.previous_log_entry {
            None => None,
            Some((previous_term, previous_index)) => {
                match self
                    .wal
                    .lookup_term(previous_index, previous_term)
                    .map_err(AppendEntriesError::LocalIoError)?
                {
                    LookupResult::Match => Some(previous_index),
                    LookupResult::NotFound => {
                        slog::info!(self.logger, "Missing previous log entry {:?}", previous_index);
                        return Ok(self.rejected());
                    }
                    LookupResult::Mismatch(my_term) => {
                        slog::info!(
                            self.logger,
                            "Previous log entry {:?} has term {:?}, leader has {:?}",
                            previous_index,
                            my_term,
                            previous_term
                        );
                        return Ok(self.rejected());
                    }
                }
            }
        };

        // 3. If an existing entry conflicts with a new one (same index
        // but different terms), delete the existing entry and all that
        // follow it (§5.3)
        // 4. Append any new entries not already in the log
        match input.payload {
            AppendEntriesPayload::Heartbeat => self
                .wal
                .delete_after(previous_log_index)
                .map_err(AppendEntriesError::LocalIoError)?,
            AppendEntriesPayload::Record(record) => {
                let already_present = self
                    .wal
                    .lookup_term(record.index, record.term)
                    .map_err(AppendEntriesError::LocalIoError)?
                    == LookupResult::Match;
                if !already_present {
                    record
                        .decode_change(&self.schema)
                        .map_err(AppendEntriesError::InvalidRecord)?;
                    self.wal
                        .delete_after(previous_log_index)
                        .map_err(AppendEntriesError::LocalIoError)?;
                    self.wal.append_at(record).map_err(AppendEntriesError::LogStore)?;
                }
            }
        }

        // 5. If leaderCommit > commitIndex, set commitIndex =
        // min(leaderCommit, index of last new entry)
        //
        // The record itself only counts from the next call, once the leader has seen it accepted.
        let new_commit_index = match (input.leader_commit_index, previous_log_index) {
            (Some(leader_commit), Some(previous)) => Some(std::cmp::min(leader_commit, previous)),
            _ => None,
        };
        if let Some(new_commit_index) = new_commit_index {
            if self.wal.ratchet_fwd_commit_index_if_changed(new_commit_index) {
                self.wal.apply_all_committed_entries();
            }
        }

        let apply_lag = self.wal.apply_lag();
        if apply_lag > self.apply_lag_max {
            slog::warn!(
                self.logger,
                "Apply lag {} exceeds {}. Asking leader to back off.",
                apply_lag,
                self.apply_lag_max
            );
            return Err(AppendEntriesError::ApplyBacklog);
        }

        Ok(AppendEntriesOutput {
            term: input.leader_term,
            status: AppendEntriesStatus::Accepted,
        })
    }

    fn rejected(&self) -> AppendEntriesOutput {
        AppendEntriesOutput {
            term: self.local_state.current_term(),
            status: AppendEntriesStatus::Rejected {
                last_log_index: self.wal.latest_index(),
            },
        }
    }

    pub(crate) fn handle_append_entries_reply(&mut self, reply: AppendEntriesReplyFromPeer) {
        let descriptor = reply.descriptor;
        let logger = self.logger.new(slog::o!(
            "Peer" => descriptor.peer_id.as_str().to_string(),
            "SeqNo" => descriptor.seq_no,
        ));

        let current_term = self.local_state.current_term();
        if descriptor.term != current_term {
            slog::debug!(
                logger,
                "Dropping AppendEntries reply for outdated term {:?}, current term: {:?}",
                descriptor.term,
                current_term
            );
            return;
        }

        let update = match reply.result {
            Ok(output) if output.term > current_term => {
                slog::info!(logger, "Peer is on newer term {:?}.", output.term);
                if let Err(e) = self.observe_term(output.term, None) {
                    slog::error!(logger, "Failed to persist term {:?}: {:?}", output.term, e);
                }
                return;
            }
            Ok(AppendEntriesOutput {
                status: AppendEntriesStatus::Accepted,
                ..
            }) => PeerStateUpdate::Success {
                previous_log_entry: descriptor.previous_log_entry_index,
                num_entries_replicated: descriptor.num_log_entries,
            },
            Ok(AppendEntriesOutput {
                status: AppendEntriesStatus::Rejected { last_log_index },
                ..
            }) => PeerStateUpdate::PeerLogBehind {
                peer_last_log_index: last_log_index,
            },
            Err(TransportError::Unwilling) => {
                slog::info!(logger, "Peer is busy. Pausing until its next heartbeat.");
                PeerStateUpdate::OtherError
            }
            Err(e) => {
                slog::debug!(logger, "AppendEntries failed: {}", e);
                PeerStateUpdate::OtherError
            }
        };
        let peer_log_behind = matches!(update, PeerStateUpdate::PeerLogBehind { .. });
        let succeeded = matches!(update, PeerStateUpdate::Success { .. });

        let next_index = match self
            .election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.peer_state_mut(&descriptor.peer_id))
        {
            None => return,
            Some(peer_state) => {
                if !peer_state.handle_append_entries_result(&logger, descriptor.seq_no, update) {
                    return;
                }
                peer_state.next_and_previous_log_index().0
            }
        };

        if succeeded {
            self.try_advance_commit_index();
        }

        // > If last log index ≥ nextIndex for a follower: send
        // > AppendEntries RPC with log entries starting at nextIndex
        let more_to_send = matches!(self.wal.latest_index(), Some(latest) if latest >= next_index);
        if peer_log_behind || (succeeded && more_to_send) {
            if let Some(peer_state) = self
                .election_state
                .leader_state()
                .and_then(|leader_state| leader_state.peer_state(&descriptor.peer_id))
            {
                peer_state.trigger_heartbeat_now();
            }
        }
    }

    fn try_advance_commit_index(&mut self) {
        let leader_state = match self.election_state.leader_state() {
            Some(leader_state) => leader_state,
            None => return,
        };

        // Deleted and pending members don't count toward the majority.
        let peers_matched_indexes = self
            .cluster_tracker
            .voting_peer_ids()
            .iter()
            .map(|peer_id| leader_state.peer_state(peer_id).and_then(|p| p.matched()))
            .collect();

        let tentative_commit_index = match cluster_commit_index(self.wal.latest_index(), peers_matched_indexes) {
            Some(index) => index,
            None => return,
        };

        // > If there exists an N such that N > commitIndex, a majority
        // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
        // > set commitIndex = N (§5.3, §5.4).
        match self
            .wal
            .ratchet_fwd_commit_index_if_valid(tentative_commit_index, self.local_state.current_term())
        {
            Ok(true) => {
                slog::debug!(self.logger, "Commit index is now {:?}", tentative_commit_index);
                self.wal.apply_all_committed_entries();
            }
            Ok(false) => {}
            Err(e) => slog::error!(
                self.logger,
                "IO failure while confirming commit index {:?}: {:?}",
                tentative_commit_index,
                e
            ),
        }
    }

    // ---- leader replication ----

    pub(crate) fn handle_leader_timer(&mut self, tick: LeaderTimerTick) {
        let current_term = self.local_state.current_term();
        if current_term != tick.term {
            slog::debug!(
                self.logger,
                "Dropping leader timer tick for outdated term {:?}, current term: {:?}",
                tick.term,
                current_term
            );
            return;
        }

        let (next_index, previous_index) = match self
            .election_state
            .leader_state()
            .and_then(|leader_state| leader_state.peer_state(&tick.peer_id))
        {
            None => return,
            Some(peer_state) if peer_state.has_outstanding_request() => {
                slog::debug!(self.logger, "AppendEntries to {:?} still outstanding", tick.peer_id);
                peer_state.reset_heartbeat_timer();
                return;
            }
            Some(peer_state) => peer_state.next_and_previous_log_index(),
        };

        let handle = match self.cluster_tracker.peer(&tick.peer_id).and_then(|peer| peer.handle()) {
            Some(handle) => handle,
            None => {
                slog::warn!(self.logger, "Leader timer for unknown peer {:?}", tick.peer_id);
                self.election_state.remove_peer_if_leader(&tick.peer_id);
                return;
            }
        };

        let input = match self.new_append_entries_input(current_term, next_index, previous_index) {
            Ok(Some(input)) => input,
            Ok(None) => {
                slog::error!(
                    self.logger,
                    "{:?} needs entry {:?} which was already trimmed. First retained entry is {:?}.",
                    tick.peer_id,
                    next_index,
                    self.wal.first_index()
                );
                return;
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to read log entry {:?}: {:?}", next_index, e);
                return;
            }
        };

        let peer_state = match self
            .election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.peer_state_mut(&tick.peer_id))
        {
            Some(peer_state) => peer_state,
            None => return,
        };

        let descriptor = AppendEntriesReplyFromPeerDescriptor {
            peer_id: tick.peer_id,
            term: current_term,
            seq_no: peer_state.next_seq_no(),
            previous_log_entry_index: previous_index,
            num_log_entries: input.num_records(),
        };
        handle.send(PeerRequest::AppendEntries { input, descriptor });
        peer_state.reset_heartbeat_timer();
    }

    /// `None` if the entries the peer needs were already trimmed.
    fn new_append_entries_input(
        &self,
        current_term: Term,
        next_index: Index,
        previous_index: Option<Index>,
    ) -> io::Result<Option<AppendEntriesInput>> {
        let previous_log_entry = match previous_index {
            None => None,
            Some(index) => match self.wal.read(index)? {
                Some(record) => Some((record.term, index)),
                None => return Ok(None),
            },
        };

        let payload = match self.wal.latest_index() {
            Some(latest) if latest >= next_index => match self.wal.read(next_index)? {
                Some(record) => AppendEntriesPayload::Record(record),
                None => return Ok(None),
            },
            _ => AppendEntriesPayload::Heartbeat,
        };

        Ok(Some(AppendEntriesInput {
            leader_term: current_term,
            leader_id: self.cluster_tracker.my_replica_id().clone(),
            previous_log_entry,
            leader_commit_index: self.wal.commit_index(),
            payload,
        }))
    }

    // ---- elections ----

    pub(crate) fn handle_follower_timeout(&mut self) {
        if !self.initialized {
            self.election_state.reset_timeout_if_follower();
            return;
        }
        if self.election_state.is_leader() {
            return;
        }

        // > On conversion to candidate, start election:
        // > - Increment currentTerm
        // > - Vote for self
        // > - Reset election timer
        // > - Send RequestVote RPCs to all other servers
        let new_term = match self.local_state.increment_term_and_vote_for_self() {
            Ok(term) => term,
            Err(e) => {
                slog::error!(self.logger, "Failed to persist new term, not starting election: {:?}", e);
                return;
            }
        };
        self.election_state.transition_to_candidate_and_vote_for_self();
        slog::info!(self.logger, "Starting election for term {:?}", new_term);

        if self.cluster_tracker.majority() <= 1 {
            self.become_leader();
            return;
        }

        let request = RequestVoteInput {
            candidate_term: new_term,
            candidate_id: self.cluster_tracker.my_replica_id().clone(),
            candidate_last_log_entry: self.wal.latest_entry(),
        };
        for peer_id in self.cluster_tracker.voting_peer_ids() {
            if let Some(handle) = self.cluster_tracker.peer(&peer_id).and_then(|peer| peer.handle()) {
                handle.send(PeerRequest::RequestVote {
                    input: request.clone(),
                });
            }
        }
    }

    fn become_leader(&mut self) {
        let term = self.local_state.current_term();
        self.election_state
            .transition_to_leader(term, self.cluster_tracker.peer_ids(), self.wal.latest_index());
        slog::info!(self.logger, "Became leader of term {:?}", term);

        // A leader can't count replicas of entries from earlier terms. Committing one of its own
        // commits everything before it.
        let no_op = LogRecord::no_op(self.wal.next_index(), term);
        if let Err(e) = self.wal.append_at(no_op) {
            slog::error!(self.logger, "Failed to append NoOp for term {:?}: {}", term, e);
            return;
        }
        self.try_advance_commit_index();
    }

    pub(crate) fn handle_initiate_vote(&mut self, input: InitiateVoteInput) -> Result<(), InitiateVoteError> {
        if !self.initialized {
            return Err(InitiateVoteError::NotInitialized);
        }
        if self.election_state.is_leader() {
            return Err(InitiateVoteError::Leader);
        }

        slog::info!(self.logger, "{:?} asked us to start an election.", input.requested_by);
        self.handle_follower_timeout();
        Ok(())
    }

    pub(crate) fn transfer_leadership(&mut self, target: Option<ReplicaId>) -> Result<ReplicaId, TransferLeadershipError> {
        let leader_state = match self.election_state.leader_state() {
            Some(leader_state) => leader_state,
            None => {
                return Err(TransferLeadershipError::NotLeader(
                    self.election_state.leader().cloned(),
                ))
            }
        };

        let latest_index = self.wal.latest_index();
        let is_caught_up = |peer_id: &ReplicaId| {
            self.cluster_tracker.is_voting_peer(peer_id)
                && leader_state.peer_state(peer_id).map(|p| p.matched()) == Some(latest_index)
        };

        let target = match target {
            Some(peer_id) if is_caught_up(&peer_id) => peer_id,
            Some(_) => return Err(TransferLeadershipError::NoEligiblePeer),
            None => {
                let mut candidates: Vec<_> = self
                    .cluster_tracker
                    .voting_peer_ids()
                    .into_iter()
                    .filter(|peer_id| is_caught_up(peer_id))
                    .collect();
                candidates.sort();
                match candidates.into_iter().next() {
                    Some(peer_id) => peer_id,
                    None => return Err(TransferLeadershipError::NoEligiblePeer),
                }
            }
        };

        match self.cluster_tracker.peer(&target).and_then(|peer| peer.handle()) {
            Some(handle) => handle.send(PeerRequest::InitiateVote {
                requested_by: self.cluster_tracker.my_replica_id().clone(),
            }),
            None => return Err(TransferLeadershipError::NoEligiblePeer),
        }

        slog::info!(self.logger, "Asked {:?} to take over leadership.", target);
        Ok(target)
    }

    /// Adopts a newer term and becomes follower.
    fn observe_term(&mut self, new_term: Term, leader: Option<LeaderRedirectInfo>) -> io::Result<()> {
        if self.local_state.store_term_if_increased(new_term)? {
            slog::info!(self.logger, "Observed newer term {:?}.", new_term);
            self.step_down(leader);
        }
        Ok(())
    }

    fn step_down(&mut self, leader: Option<LeaderRedirectInfo>) {
        self.election_state.transition_to_follower(leader.clone());
        slog::info!(self.logger, "Transitioned to {:?}", self.election_state);

        // Their entries may still commit under the new leader, but we can't tell anymore.
        for (_, (_, callback)) in mem::take(&mut self.pending_writes) {
            callback.send(Err(WriteToLogError::NotLeader(leader.clone())));
        }
    }

    fn redirect_info(&self, replica_id: &ReplicaId) -> LeaderRedirectInfo {
        LeaderRedirectInfo {
            replica_id: replica_id.clone(),
            address: self.cluster_tracker.metadata(replica_id).map(MemberInfo::rpc_addr),
        }
    }

    // ---- apply pipeline ----

    pub(crate) fn handle_entries_applied(&mut self, applied_index: Index) {
        self.wal.mark_applied(applied_index);

        let still_pending = self.pending_writes.split_off(&applied_index.plus(1));
        for (index, (term, callback)) in mem::replace(&mut self.pending_writes, still_pending) {
            callback.send(Ok(WriteToLogOutput { term, index }));
        }

        if self.last_retention_trim.elapsed() >= self.ping_interval {
            self.last_retention_trim = Instant::now();
            if let Err(e) = self.wal.retention_trim(self.log_retention_count) {
                slog::error!(self.logger, "Failed to trim log: {:?}", e);
            }
        }
    }

    // ---- membership ----

    pub(crate) fn add_member(&mut self, info: MemberInfo) -> Result<(), MembershipError> {
        if self.cluster_tracker.contains_member(&info.id) {
            return Err(MembershipError::AlreadyMember(info.id));
        }

        let handle = PeerProxyHandle::spawn(
            self.logger.clone(),
            info.clone(),
            self.actor_client.clone(),
            self.proxy_config.clone(),
        );
        let peer_id = info.id.clone();
        self.cluster_tracker.add_member(info, handle)?;
        self.election_state.add_peer_if_leader(peer_id.clone(), self.wal.latest_index());

        slog::info!(self.logger, "Added member {:?}. It counts once it's connected.", peer_id);
        Ok(())
    }

    pub(crate) fn remove_member(&mut self, peer_id: ReplicaId) -> Result<(), MembershipError> {
        if self.cluster_tracker.remove_member(&peer_id)? {
            self.election_state.remove_peer_if_leader(&peer_id);
            slog::info!(
                self.logger,
                "Removed member {:?}. Cluster size is now {}.",
                peer_id,
                self.cluster_tracker.cluster_size()
            );
            // A smaller majority may already have everything.
            self.try_advance_commit_index();
        }
        Ok(())
    }

    pub(crate) fn handle_peer_connection_changed(&mut self, change: PeerConnectionChanged) {
        if self.cluster_tracker.mark_connected(&change.peer_id, change.connected) {
            slog::info!(
                self.logger,
                "{:?} connected for the first time. Cluster size is now {}.",
                change.peer_id,
                self.cluster_tracker.cluster_size()
            );
        }

        if change.connected {
            if let Some(peer_state) = self
                .election_state
                .leader_state()
                .and_then(|leader_state| leader_state.peer_state(&change.peer_id))
            {
                peer_state.trigger_heartbeat_now();
            }
        }
    }

    // ---- admin ----

    pub(crate) fn mark_initialized(&mut self) {
        if !self.initialized {
            slog::info!(self.logger, "Replica is initialized.");
            self.initialized = true;
            self.election_state.reset_timeout_if_follower();
        }
    }

    pub(crate) fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            replica_id: self.cluster_tracker.my_replica_id().clone(),
            role: self.election_state.current_state(),
            term: self.local_state.current_term(),
            last_log_entry: self.wal.latest_entry(),
            commit_index: self.wal.commit_index(),
            last_applied: self.wal.last_applied(),
            cluster_size: self.cluster_tracker.cluster_size(),
            initialized: self.initialized,
            members: self.cluster_tracker.member_statuses(),
        }
    }

    pub(crate) fn shutdown(&mut self) {
        slog::info!(self.logger, "Shutting down. Failing {} pending writes.", self.pending_writes.len());
        for (_, (_, callback)) in mem::take(&mut self.pending_writes) {
            callback.send(Err(WriteToLogError::ShuttingDown));
        }
    }
}

/// Highest index replicated on a majority, counting ourselves. Our own log is always the longest,
/// so we sit at the tail of the sorted list.
fn cluster_commit_index(my_latest_index: Option<Index>, mut peers_matched_indexes: Vec<Option<Index>>) -> Option<Index> {
    if peers_matched_indexes.is_empty() {
        return my_latest_index;
    }

    peers_matched_indexes.sort_by_key(|matched| Index::opt_as_u64(*matched));

    // Cluster of n = peers + 1 needs n/2 + 1 copies. Besides us, that's n/2 peers, so take the
    // (peers+1)/2-th largest peer, i.e. position peers/2 from the left.
    let quorum_idx = peers_matched_indexes.len() / 2;

    peers_matched_indexes.remove(quorum_idx)
}
