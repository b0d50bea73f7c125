use crate::grpc::directory_service_client::DirectoryServiceClient;
use crate::grpc::{ProtoSearchRequest, ProtoSearchResult};
use crate::replica::{
    AppendEntriesInput, AppendEntriesOutput, ReplicaId, RequestVoteInput, RequestVoteOutput,
};
use crate::server;
use std::net::SocketAddrV4;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, Clone, thiserror::Error)]
pub(crate) enum TransportError {
    #[error("peer is down")]
    PeerDown,
    #[error("peer didn't reply within {0:?}")]
    Timeout(Duration),
    #[error("peer is unwilling to perform the request")]
    Unwilling,
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl TransportError {
    /// The connection can't be trusted anymore and should be re-established.
    pub(crate) fn is_connection_failure(&self) -> bool {
        matches!(self, TransportError::PeerDown | TransportError::Timeout(_))
    }
}

/// PeerClient is one live connection to a peer's RPC server. Every call is bounded by the RPC
/// timeout.
pub(crate) struct PeerClient {
    client: DirectoryServiceClient<Channel>,
    rpc_timeout: Duration,
}

impl PeerClient {
    pub(crate) async fn connect(addr: SocketAddrV4, rpc_timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|e| TransportError::Malformed(format!("bad peer address {}: {}", addr, e)))?;

        match tokio::time::timeout(rpc_timeout, endpoint.connect()).await {
            Ok(Ok(channel)) => Ok(PeerClient {
                client: DirectoryServiceClient::new(channel),
                rpc_timeout,
            }),
            Ok(Err(_)) => Err(TransportError::PeerDown),
            Err(_) => Err(TransportError::Timeout(rpc_timeout)),
        }
    }

    pub(crate) async fn append_entries(
        &mut self,
        input: &AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, TransportError> {
        let result = self.search(server::append_entries_request(input)).await?;
        server::parse_append_entries_reply(result)
    }

    pub(crate) async fn request_vote(&mut self, input: &RequestVoteInput) -> Result<RequestVoteOutput, TransportError> {
        let result = self.search(server::request_vote_request(input)).await?;
        server::parse_request_vote_reply(result)
    }

    pub(crate) async fn initiate_vote(&mut self, requested_by: &ReplicaId) -> Result<(), TransportError> {
        let result = self.search(server::initiate_vote_request(requested_by)).await?;
        server::parse_initiate_vote_reply(result)
    }

    async fn search(&mut self, request: ProtoSearchRequest) -> Result<ProtoSearchResult, TransportError> {
        match tokio::time::timeout(self.rpc_timeout, self.client.search(request)).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(_status)) => Err(TransportError::PeerDown),
            Err(_) => Err(TransportError::Timeout(self.rpc_timeout)),
        }
    }
}
