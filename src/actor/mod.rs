use crate::commitlog::{self, Index};
use crate::replica::{self, LogRecord, MemberInfo, MembershipError, PersistentLocalState, ReplicaId};
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

// Disk interaction is synchronous inside the actor. Anything that waits on the network is spawned
// and comes back to the actor as another event.
#[derive(Debug)]
pub(crate) enum Event {
    // Leader: Write to disk, reply once committed.
    // Candidate/Follower: Reject with redirect info.
    WriteToLog(
        replica::WriteToLogInput,
        Callback<replica::WriteToLogOutput, replica::WriteToLogError>,
    ),
    RequestVote(
        replica::RequestVoteInput,
        Callback<replica::RequestVoteOutput, replica::RequestVoteError>,
    ),
    RequestVoteReplyFromPeer(replica::RequestVoteReplyFromPeer),
    AppendEntries(
        replica::AppendEntriesInput,
        Callback<replica::AppendEntriesOutput, replica::AppendEntriesError>,
    ),
    AppendEntriesReplyFromPeer(replica::AppendEntriesReplyFromPeer),
    InitiateVote(replica::InitiateVoteInput, Callback<(), replica::InitiateVoteError>),
    LeaderTimer(replica::LeaderTimerTick),
    FollowerTimeout,
    PeerConnectionChanged(replica::PeerConnectionChanged),
    // The apply task finished writing everything up to this index to the storage engine.
    EntriesApplied(Index),
    AddMember(MemberInfo, Callback<(), MembershipError>),
    RemoveMember(ReplicaId, Callback<(), MembershipError>),
    TransferLeadership(
        Option<ReplicaId>,
        Callback<ReplicaId, replica::TransferLeadershipError>,
    ),
    MarkInitialized,
    GetStatus(Callback<replica::ReplicaStatus, ActorExited>),
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
#[error("replica actor has exited")]
pub(crate) struct ActorExited;

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Result<O, E>>) {
        let (tx, rx) = oneshot::channel();
        (Callback(tx), rx)
    }

    pub(crate) fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

/// ActorClient keeps the replica actor alive. The actor exits once every strong client is dropped.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// WeakActorClient is handed to background tasks, so they never keep a shut-down actor alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn write_to_log(
        &self,
        input: replica::WriteToLogInput,
    ) -> Result<replica::WriteToLogOutput, replica::WriteToLogError> {
        call(&self.sender, |cb| Event::WriteToLog(input, cb)).await
    }

    pub(crate) async fn add_member(&self, info: MemberInfo) -> Result<(), MembershipError> {
        call(&self.sender, |cb| Event::AddMember(info, cb)).await
    }

    pub(crate) async fn remove_member(&self, id: ReplicaId) -> Result<(), MembershipError> {
        call(&self.sender, |cb| Event::RemoveMember(id, cb)).await
    }

    pub(crate) async fn transfer_leadership(
        &self,
        target: Option<ReplicaId>,
    ) -> Result<ReplicaId, replica::TransferLeadershipError> {
        call(&self.sender, |cb| Event::TransferLeadership(target, cb)).await
    }

    pub(crate) async fn mark_initialized(&self) -> Result<(), ActorExited> {
        notify(&self.sender, Event::MarkInitialized).await
    }

    pub(crate) async fn status(&self) -> Result<replica::ReplicaStatus, ActorExited> {
        call(&self.sender, Event::GetStatus).await
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ActorExited> {
        notify(&self.sender, Event::Shutdown).await
    }
}

impl WeakActorClient {
    fn upgrade(&self) -> Result<mpsc::Sender<Event>, ActorExited> {
        self.sender.upgrade().ok_or(ActorExited)
    }

    pub(crate) async fn request_vote(
        &self,
        input: replica::RequestVoteInput,
    ) -> Result<replica::RequestVoteOutput, replica::RequestVoteError> {
        call(&self.upgrade()?, |cb| Event::RequestVote(input, cb)).await
    }

    pub(crate) async fn append_entries(
        &self,
        input: replica::AppendEntriesInput,
    ) -> Result<replica::AppendEntriesOutput, replica::AppendEntriesError> {
        call(&self.upgrade()?, |cb| Event::AppendEntries(input, cb)).await
    }

    pub(crate) async fn initiate_vote(&self, input: replica::InitiateVoteInput) -> Result<(), replica::InitiateVoteError> {
        call(&self.upgrade()?, |cb| Event::InitiateVote(input, cb)).await
    }

    pub(crate) async fn request_vote_reply_from_peer(
        &self,
        reply: replica::RequestVoteReplyFromPeer,
    ) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::RequestVoteReplyFromPeer(reply)).await
    }

    pub(crate) async fn append_entries_reply_from_peer(
        &self,
        reply: replica::AppendEntriesReplyFromPeer,
    ) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::AppendEntriesReplyFromPeer(reply)).await
    }

    pub(crate) async fn peer_connection_changed(&self, change: replica::PeerConnectionChanged) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::PeerConnectionChanged(change)).await
    }

    pub(crate) async fn leader_timer(&self, tick: replica::LeaderTimerTick) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::LeaderTimer(tick)).await
    }

    pub(crate) async fn follower_timeout(&self) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::FollowerTimeout).await
    }

    pub(crate) async fn entries_applied(&self, index: Index) -> Result<(), ActorExited> {
        notify(&self.upgrade()?, Event::EntriesApplied(index)).await
    }
}

async fn call<O, E>(sender: &mpsc::Sender<Event>, event: impl FnOnce(Callback<O, E>) -> Event) -> Result<O, E>
where
    O: Debug,
    E: Error + From<ActorExited>,
{
    let (callback, rx) = Callback::channel();
    notify(sender, event(callback)).await?;

    match rx.await {
        Ok(result) => result,
        // Actor dropped the callback while shutting down.
        Err(_) => Err(ActorExited.into()),
    }
}

async fn notify(sender: &mpsc::Sender<Event>, event: Event) -> Result<(), ActorExited> {
    sender.send(event).await.map_err(|_| ActorExited)
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L, S>
where
    L: commitlog::Log<LogRecord>,
    S: PersistentLocalState,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: replica::Replica<L, S>,
}

impl<L, S> ReplicaActor<L, S>
where
    L: commitlog::Log<LogRecord>,
    S: PersistentLocalState,
{
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: replica::Replica<L, S>) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if let Event::Shutdown = event {
                self.replica.shutdown();
                break;
            }
            self.handle_event(event);
        }

        slog::info!(self.logger, "Replica event loop exited.");
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and come back as an event to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::WriteToLog(input, callback) => {
                self.replica.handle_write_to_log(input, callback);
            }
            Event::RequestVote(input, callback) => {
                callback.send(self.replica.handle_request_vote(input));
            }
            Event::RequestVoteReplyFromPeer(reply) => {
                self.replica.handle_request_vote_reply(reply);
            }
            Event::AppendEntries(input, callback) => {
                callback.send(self.replica.handle_append_entries(input));
            }
            Event::AppendEntriesReplyFromPeer(reply) => {
                self.replica.handle_append_entries_reply(reply);
            }
            Event::InitiateVote(input, callback) => {
                callback.send(self.replica.handle_initiate_vote(input));
            }
            Event::LeaderTimer(tick) => {
                self.replica.handle_leader_timer(tick);
            }
            Event::FollowerTimeout => {
                self.replica.handle_follower_timeout();
            }
            Event::PeerConnectionChanged(change) => {
                self.replica.handle_peer_connection_changed(change);
            }
            Event::EntriesApplied(index) => {
                self.replica.handle_entries_applied(index);
            }
            Event::AddMember(info, callback) => {
                callback.send(self.replica.add_member(info));
            }
            Event::RemoveMember(id, callback) => {
                callback.send(self.replica.remove_member(id));
            }
            Event::TransferLeadership(target, callback) => {
                callback.send(self.replica.transfer_leadership(target));
            }
            Event::MarkInitialized => {
                self.replica.mark_initialized();
            }
            Event::GetStatus(callback) => {
                callback.send(Ok(self.replica.status()));
            }
            Event::Shutdown => unreachable!("handled by the event loop"),
        }
    }
}
