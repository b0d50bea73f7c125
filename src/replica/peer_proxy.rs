use crate::actor::WeakActorClient;
use crate::replica::peer_client::{PeerClient, TransportError};
use crate::replica::{
    AppendEntriesInput, AppendEntriesReplyFromPeer, AppendEntriesReplyFromPeerDescriptor, MemberInfo,
    PeerConnectionChanged, ReplicaId, RequestVoteInput, RequestVoteReplyFromPeer,
};
use std::cmp;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) enum PeerRequest {
    AppendEntries {
        input: AppendEntriesInput,
        descriptor: AppendEntriesReplyFromPeerDescriptor,
    },
    RequestVote {
        input: RequestVoteInput,
    },
    InitiateVote {
        requested_by: ReplicaId,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct PeerProxyConfig {
    pub(crate) rpc_timeout: Duration,
    pub(crate) min_backoff: Duration,
    pub(crate) max_backoff: Duration,
}

/// PeerProxyHandle queues requests for one peer. Dropping it stops the proxy task, including any
/// pending reconnect.
pub(crate) struct PeerProxyHandle {
    sender: mpsc::UnboundedSender<PeerRequest>,
}

impl PeerProxyHandle {
    pub(crate) fn spawn(
        logger: slog::Logger,
        info: MemberInfo,
        actor_client: WeakActorClient,
        config: PeerProxyConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = PeerProxyTask {
            logger: logger.new(slog::o!("Peer" => info.id.as_str().to_string())),
            backoff: config.min_backoff,
            info,
            actor_client,
            config,
            requests: rx,
            client: None,
            reconnect_at: Instant::now(),
            consecutive_failures: 0,
        };
        tokio::task::spawn(task.run());

        PeerProxyHandle { sender: tx }
    }

    /// Requests to a proxy that has already exited are dropped.
    pub(crate) fn send(&self, request: PeerRequest) {
        let _ = self.sender.send(request);
    }

    #[cfg(test)]
    pub(crate) fn new_detached() -> (Self, mpsc::UnboundedReceiver<PeerRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerProxyHandle { sender: tx }, rx)
    }
}

struct PeerProxyTask {
    logger: slog::Logger,
    info: MemberInfo,
    actor_client: WeakActorClient,
    config: PeerProxyConfig,
    requests: mpsc::UnboundedReceiver<PeerRequest>,

    // Only ever owned here. A reconnect replaces it.
    client: Option<PeerClient>,
    reconnect_at: Instant,
    backoff: Duration,
    consecutive_failures: u64,
}

impl PeerProxyTask {
    async fn run(mut self) {
        loop {
            let keep_running = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    // Handle dropped: member deleted or replica shut down.
                    None => false,
                },
                _ = tokio::time::sleep_until(self.reconnect_at), if self.client.is_none() => {
                    self.connect().await
                }
            };

            if !keep_running {
                slog::debug!(self.logger, "Peer proxy exiting.");
                return;
            }
        }
    }

    async fn connect(&mut self) -> bool {
        match PeerClient::connect(self.info.rpc_addr(), self.config.rpc_timeout).await {
            Ok(client) => {
                slog::info!(self.logger, "Connected to {:?}", self.info.rpc_addr());
                self.client.replace(client);
                self.backoff = self.config.min_backoff;
                self.consecutive_failures = 0;
                self.notify_connection_changed(true).await
            }
            Err(e) => {
                self.record_failure(&e);
                true
            }
        }
    }

    /// Returns false once the actor is gone.
    async fn handle_request(&mut self, request: PeerRequest) -> bool {
        match request {
            PeerRequest::AppendEntries { input, descriptor } => {
                let result = match self.client.as_mut() {
                    Some(client) => client.append_entries(&input).await,
                    None => Err(TransportError::PeerDown),
                };
                if !self.after_call(&result).await {
                    return false;
                }
                let reply = AppendEntriesReplyFromPeer { descriptor, result };
                self.actor_client.append_entries_reply_from_peer(reply).await.is_ok()
            }
            PeerRequest::RequestVote { input } => {
                let result = match self.client.as_mut() {
                    Some(client) => client.request_vote(&input).await,
                    None => Err(TransportError::PeerDown),
                };
                if !self.after_call(&result).await {
                    return false;
                }
                let reply = RequestVoteReplyFromPeer {
                    peer_id: self.info.id.clone(),
                    term: input.candidate_term,
                    result,
                };
                self.actor_client.request_vote_reply_from_peer(reply).await.is_ok()
            }
            PeerRequest::InitiateVote { requested_by } => {
                let result = match self.client.as_mut() {
                    Some(client) => client.initiate_vote(&requested_by).await,
                    None => Err(TransportError::PeerDown),
                };
                match &result {
                    Ok(()) => slog::info!(self.logger, "Peer accepted request to start an election."),
                    Err(e) => slog::warn!(self.logger, "Peer refused request to start an election: {}", e),
                }
                self.after_call(&result).await
            }
        }
    }

    async fn after_call<T>(&mut self, result: &Result<T, TransportError>) -> bool {
        match result {
            Err(e) if e.is_connection_failure() && self.client.is_some() => {
                self.client = None;
                self.record_failure(e);
                self.notify_connection_changed(false).await
            }
            _ => true,
        }
    }

    fn record_failure(&mut self, e: &TransportError) {
        self.consecutive_failures += 1;
        if self.consecutive_failures % 10 == 1 {
            slog::warn!(
                self.logger,
                "Failed to reach peer ({} consecutive failures): {}",
                self.consecutive_failures,
                e
            );
        } else {
            slog::debug!(self.logger, "Failed to reach peer: {}", e);
        }

        self.reconnect_at = Instant::now() + self.backoff;
        self.backoff = cmp::min(self.backoff * 2, self.config.max_backoff);
    }

    async fn notify_connection_changed(&self, connected: bool) -> bool {
        let change = PeerConnectionChanged {
            peer_id: self.info.id.clone(),
            connected,
        };
        self.actor_client.peer_connection_changed(change).await.is_ok()
    }
}
