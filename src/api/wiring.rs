use crate::actor::{ActorClient, ReplicaActor};
use crate::api::client::RaftClient;
use crate::api::new_commit_stream;
use crate::api::options::RaftOptionsValidated;
use crate::api::types::RaftMemberInfo;
use crate::api::{DirectoryLog, RaftEventListener, RaftOptions};
use crate::apply::{Applier, StorageEngine};
use crate::codec::{SchemaContext, SchemaResolver};
use crate::commitlog::{FileLog, InMemoryLog, Index, Log};
use crate::replica::{
    self, FileLocalState, LogRecord, MemberInfo, PeerProxyConfig, PersistentLocalState, ReplicaId, ReplicaOptions,
    VolatileLocalState,
};
use crate::server::{self, RpcServer};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;

const ACTOR_QUEUE_SIZE: usize = 64;
const LOG_DIRECTORY: &str = "log";

pub struct RaftClientConfig {
    pub my_replica_id: String,
    /// Every member of the cluster, including this one.
    pub cluster_members: Vec<RaftMemberInfo>,
    /// Where the log, term and vote are kept. `None` keeps everything in memory, which is only
    /// safe for tests.
    pub data_directory: Option<PathBuf>,
    /// A replica that isn't initialized refuses to vote, accept entries or start elections until
    /// `RaftClient::mark_initialized` is called.
    pub initialized: bool,
    pub schema: Arc<dyn SchemaResolver>,
    pub storage_engine: Box<dyn StorageEngine>,
    pub info_logger: slog::Logger,
    pub options: RaftOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum RaftClientCreationError {
    #[error("Invalid cluster info: {0}")]
    InvalidClusterInfo(String),
    #[error("Illegal options for configuring client: {0}")]
    IllegalClientOptions(String),
    #[error("Log initialization failure")]
    LogInitialization(#[from] io::Error),
    #[error("my replica ID not in cluster config")]
    MeNotInCluster,
}

/// Recovers local state, then starts the replica, its RPC server, peer connections and the apply
/// task on the current tokio runtime.
pub async fn try_create_raft_client(config: RaftClientConfig) -> Result<RaftClient, RaftClientCreationError> {
    let options = RaftOptionsValidated::try_from(config.options.clone())
        .map_err(|e| RaftClientCreationError::IllegalClientOptions(e.to_string()))?;
    validate_cluster(&config.my_replica_id, &config.cluster_members)?;

    match config.data_directory.clone() {
        Some(directory) => {
            let my_replica_id = ReplicaId::new(config.my_replica_id.clone());
            let log = FileLog::open(directory.join(LOG_DIRECTORY))?;
            let local_state = FileLocalState::open(&directory, my_replica_id)?;
            start(config, options, log, local_state)
        }
        None => {
            let my_replica_id = ReplicaId::new(config.my_replica_id.clone());
            let log = InMemoryLog::create()?;
            let local_state = VolatileLocalState::new(my_replica_id);
            start(config, options, log, local_state)
        }
    }
}

fn start<L, S>(
    config: RaftClientConfig,
    options: RaftOptionsValidated,
    log: L,
    local_state: S,
) -> Result<RaftClient, RaftClientCreationError>
where
    L: Log<LogRecord> + Send + 'static,
    S: PersistentLocalState,
{
    let my_replica_id = config.my_replica_id;
    let root_logger = config.info_logger.new(slog::o!("ReplicaId" => my_replica_id.clone()));
    let schema = SchemaContext::new(config.schema);
    let storage_engine = config.storage_engine;

    let my_member_info = config
        .cluster_members
        .iter()
        .find(|member| member.replica_id == my_replica_id)
        .cloned()
        .map(MemberInfo::from)
        .ok_or(RaftClientCreationError::MeNotInCluster)?;
    let my_server_addr = SocketAddr::V4(my_member_info.rpc_addr());
    let cluster_members = config.cluster_members.into_iter().map(MemberInfo::from).collect();

    let (actor_client, actor_queue_rx) = ActorClient::new(ACTOR_QUEUE_SIZE);
    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal();

    let last_applied = Index::from_u64_opt(storage_engine.last_applied());
    let (replica, replica_commit_stream, election_state_change_listener) = replica::create_replica(
        root_logger.clone(),
        ReplicaOptions {
            my_info: my_member_info,
            cluster_members,
            initialized: config.initialized,
            schema: schema.clone(),
            heartbeat_interval: options.ping_interval,
            election_timeout_min: options.election_timeout_min(),
            election_timeout_max: options.election_timeout_max(),
            apply_lag_max: options.apply_lag_max,
            log_retention_count: options.log_retention_count,
            proxy_config: PeerProxyConfig {
                rpc_timeout: options.rpc_timeout(),
                min_backoff: options.min_backoff(),
                max_backoff: options.max_backoff(),
            },
        },
        log,
        local_state,
        last_applied,
        actor_client.weak(),
    )?;

    let replica_actor = ReplicaActor::new(root_logger.clone(), actor_queue_rx, replica);
    tokio::spawn(replica_actor.run_event_loop());

    let rpc_server = RpcServer::new(
        root_logger.new(slog::o!("Component" => "RpcServer")),
        actor_client.weak(),
        options.ping_interval,
    );
    tokio::spawn(rpc_server.run(my_server_addr, server_shutdown_signal));

    let (publisher, commit_stream) = new_commit_stream();
    let applier = Applier::new(
        root_logger.new(slog::o!("Component" => "Applier")),
        storage_engine,
        schema.clone(),
        ReplicaId::new(my_replica_id),
        replica_commit_stream,
        actor_client.weak(),
        publisher,
    );
    tokio::spawn(applier.run());

    let directory = DirectoryLog::new(actor_client.clone(), schema, options.consensus_timeout);
    let event_listener = RaftEventListener::new(election_state_change_listener);

    Ok(RaftClient::new(
        directory,
        commit_stream,
        event_listener,
        actor_client,
        server_shutdown_handle,
    ))
}

fn validate_cluster(my_replica_id: &str, cluster_members: &[RaftMemberInfo]) -> Result<(), RaftClientCreationError> {
    let mut ids = HashSet::new();
    let mut addrs = HashSet::new();
    for member in cluster_members {
        if !ids.insert(member.replica_id.as_str()) {
            return Err(RaftClientCreationError::InvalidClusterInfo(format!(
                "replica id {} is listed twice",
                member.replica_id
            )));
        }
        if !addrs.insert(SocketAddrV4::new(member.ip_addr, member.raft_rpc_port)) {
            return Err(RaftClientCreationError::InvalidClusterInfo(format!(
                "{}:{} is listed twice",
                member.ip_addr, member.raft_rpc_port
            )));
        }
    }

    if !ids.contains(my_replica_id) {
        return Err(RaftClientCreationError::MeNotInCluster);
    }
    Ok(())
}
