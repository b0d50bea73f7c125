use crate::actor::WeakActorClient;
use crate::grpc::directory_service_server::{DirectoryService, DirectoryServiceServer};
use crate::grpc::{ProtoScope, ProtoSearchRequest, ProtoSearchResult};
use crate::replica::{AppendEntriesError, RequestVoteError};
use crate::server::controls::{self, RESULT_NO_SUCH_OBJECT, RESULT_PROTOCOL_ERROR, RESULT_UNWILLING_TO_PERFORM};
use crate::server::RpcServerShutdownSignal;
use std::net::SocketAddr;
use std::time::Duration;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer answers peer RPCs, which arrive as directory searches against the raft pseudo-DNs.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    local_replica: WeakActorClient,
    // How long an uninitialized replica stalls a vote request before refusing it.
    ping_interval: Duration,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_replica: WeakActorClient, ping_interval: Duration) -> Self {
        RpcServer {
            logger,
            local_replica,
            ping_interval,
        }
    }

    pub(crate) async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(DirectoryServiceServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal.wait())
            .await;

        match result {
            Ok(()) => slog::info!(logger, "Server has exited."),
            Err(e) => slog::error!(logger, "Server failed: {:?}", e),
        }
    }

    async fn handle_search(&self, request: ProtoSearchRequest) -> ProtoSearchResult {
        if request.scope != ProtoScope::BaseObject as i32 {
            return controls::error_result(
                RESULT_PROTOCOL_ERROR,
                "raft requests must be base scope searches".to_string(),
            );
        }

        match request.base_dn.to_ascii_lowercase().as_str() {
            controls::APPEND_ENTRIES_DN => self.handle_append_entries(&request).await,
            controls::REQUEST_VOTE_DN => self.handle_request_vote(&request).await,
            controls::INITIATE_VOTE_DN => self.handle_initiate_vote(&request).await,
            other => controls::error_result(RESULT_NO_SUCH_OBJECT, format!("no such object: {}", other)),
        }
    }

    async fn handle_append_entries(&self, request: &ProtoSearchRequest) -> ProtoSearchResult {
        let input = match controls::decode_append_entries(request) {
            Ok(input) => input,
            Err(e) => return controls::error_result(RESULT_PROTOCOL_ERROR, e.to_string()),
        };

        match self.local_replica.append_entries(input).await {
            Ok(output) => controls::append_entries_reply(&output),
            Err(e @ AppendEntriesError::InvalidRecord(_)) => {
                slog::warn!(self.logger, "Rejecting AppendEntries: {}", e);
                controls::error_result(RESULT_PROTOCOL_ERROR, e.to_string())
            }
            Err(e) => controls::error_result(RESULT_UNWILLING_TO_PERFORM, e.to_string()),
        }
    }

    async fn handle_request_vote(&self, request: &ProtoSearchRequest) -> ProtoSearchResult {
        let input = match controls::decode_request_vote(request) {
            Ok(input) => input,
            Err(e) => return controls::error_result(RESULT_PROTOCOL_ERROR, e.to_string()),
        };

        match self.local_replica.request_vote(input).await {
            Ok(output) => controls::request_vote_reply(&output),
            Err(RequestVoteError::NotInitialized) => {
                // Slow the candidate down, so it doesn't burn through terms on us.
                tokio::time::sleep(self.ping_interval).await;
                controls::error_result(
                    RESULT_UNWILLING_TO_PERFORM,
                    RequestVoteError::NotInitialized.to_string(),
                )
            }
            Err(e) => controls::error_result(RESULT_UNWILLING_TO_PERFORM, e.to_string()),
        }
    }

    async fn handle_initiate_vote(&self, request: &ProtoSearchRequest) -> ProtoSearchResult {
        let input = match controls::decode_initiate_vote(request) {
            Ok(input) => input,
            Err(e) => return controls::error_result(RESULT_PROTOCOL_ERROR, e.to_string()),
        };

        match self.local_replica.initiate_vote(input).await {
            Ok(()) => controls::empty_success(),
            Err(e) => controls::error_result(RESULT_UNWILLING_TO_PERFORM, e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryService for RpcServer {
    async fn search(&self, rpc_request: Request<ProtoSearchRequest>) -> Result<Response<ProtoSearchResult>, Status> {
        let request = rpc_request.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", request);
        let result = self.handle_search(request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", result);

        Ok(Response::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::commitlog::Index;
    use crate::replica::{
        AppendEntriesInput, AppendEntriesOutput, AppendEntriesPayload, AppendEntriesStatus, ReplicaId,
        RequestVoteInput, RequestVoteOutput, Term, TransportError, VoteDecision,
    };
    use tokio::sync::mpsc;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    /// Answers replica events the way a follower at term 4 with 6 log entries would.
    fn spawn_fake_replica(mut rx: mpsc::Receiver<Event>, initialized: bool) {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::AppendEntries(_, callback) if !initialized => {
                        callback.send(Err(AppendEntriesError::NotInitialized))
                    }
                    Event::AppendEntries(input, callback) => callback.send(Ok(AppendEntriesOutput {
                        term: Term::new(4),
                        status: match input.payload {
                            AppendEntriesPayload::Heartbeat => AppendEntriesStatus::Accepted,
                            AppendEntriesPayload::Record(_) => AppendEntriesStatus::Rejected {
                                last_log_index: Some(Index::new(6)),
                            },
                        },
                    })),
                    Event::RequestVote(_, callback) if !initialized => {
                        callback.send(Err(RequestVoteError::NotInitialized))
                    }
                    Event::RequestVote(_, callback) => callback.send(Ok(RequestVoteOutput {
                        term: Term::new(4),
                        decision: VoteDecision::StrongDenied,
                    })),
                    Event::InitiateVote(_, callback) => callback.send(Ok(())),
                    other => panic!("Unexpected event {:?}", other),
                }
            }
        });
    }

    fn server(initialized: bool) -> (RpcServer, ActorClient) {
        let (client, rx) = ActorClient::new(10);
        spawn_fake_replica(rx, initialized);
        let server = RpcServer::new(logger(), client.weak(), Duration::from_millis(20));
        (server, client)
    }

    fn heartbeat() -> AppendEntriesInput {
        AppendEntriesInput {
            leader_term: Term::new(4),
            leader_id: ReplicaId::new("b"),
            previous_log_entry: Some((Term::new(4), Index::new(6))),
            leader_commit_index: Some(Index::new(5)),
            payload: AppendEntriesPayload::Heartbeat,
        }
    }

    fn vote_request() -> RequestVoteInput {
        RequestVoteInput {
            candidate_term: Term::new(4),
            candidate_id: ReplicaId::new("c"),
            candidate_last_log_entry: None,
        }
    }

    #[tokio::test]
    async fn replies_carry_term_and_status() {
        let (server, _client) = server(true);

        let result = server.handle_search(controls::append_entries_request(&heartbeat())).await;
        let output = controls::parse_append_entries_reply(result).unwrap();
        assert_eq!(output.term, Term::new(4));
        assert_eq!(output.status, AppendEntriesStatus::Accepted);

        let result = server.handle_search(controls::request_vote_request(&vote_request())).await;
        let output = controls::parse_request_vote_reply(result).unwrap();
        assert_eq!(output.decision, VoteDecision::StrongDenied);

        let result = server
            .handle_search(controls::initiate_vote_request(&ReplicaId::new("b")))
            .await;
        assert!(controls::parse_initiate_vote_reply(result).is_ok());
    }

    #[tokio::test]
    async fn rejects_unknown_dn_and_scope() {
        let (server, _client) = server(true);

        let mut request = controls::request_vote_request(&vote_request());
        request.base_dn = "cn=users,dc=example".to_string();
        assert_eq!(server.handle_search(request).await.result_code, RESULT_NO_SUCH_OBJECT);

        let mut request = controls::request_vote_request(&vote_request());
        request.scope = ProtoScope::WholeSubtree as i32;
        assert_eq!(server.handle_search(request).await.result_code, RESULT_PROTOCOL_ERROR);

        // Right DN, wrong control.
        let mut request = controls::request_vote_request(&vote_request());
        request.base_dn = controls::APPEND_ENTRIES_DN.to_uppercase();
        assert_eq!(server.handle_search(request).await.result_code, RESULT_PROTOCOL_ERROR);
    }

    #[tokio::test]
    async fn uninitialized_replica_is_unwilling() {
        let (server, _client) = server(false);

        let result = server.handle_search(controls::append_entries_request(&heartbeat())).await;
        assert!(matches!(
            controls::parse_append_entries_reply(result),
            Err(TransportError::Unwilling)
        ));

        let started = tokio::time::Instant::now();
        let result = server.handle_search(controls::request_vote_request(&vote_request())).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(matches!(
            controls::parse_request_vote_reply(result),
            Err(TransportError::Unwilling)
        ));
    }

    #[tokio::test]
    async fn gone_replica_is_unwilling() {
        let (server, client) = server(true);
        drop(client);

        let result = server.handle_search(controls::append_entries_request(&heartbeat())).await;
        assert_eq!(result.result_code, RESULT_UNWILLING_TO_PERFORM);
    }
}
