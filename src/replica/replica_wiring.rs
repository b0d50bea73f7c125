use crate::actor::WeakActorClient;
use crate::codec::SchemaContext;
use crate::commitlog::{Index, Log};
use crate::replica::election::ElectionConfig;
use crate::replica::{
    write_ahead_log, ClusterTracker, CommitStream, ElectionStateChangeListener, LogRecord, MemberInfo,
    PeerProxyConfig, PeerProxyHandle, PersistentLocalState, Replica, ReplicaConfig,
};
use std::io;
use std::time::Duration;

pub(crate) struct ReplicaOptions {
    pub(crate) my_info: MemberInfo,
    // May include ourselves, which is skipped.
    pub(crate) cluster_members: Vec<MemberInfo>,
    pub(crate) initialized: bool,
    pub(crate) schema: SchemaContext,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) election_timeout_min: Duration,
    pub(crate) election_timeout_max: Duration,
    pub(crate) apply_lag_max: u64,
    pub(crate) log_retention_count: u64,
    pub(crate) proxy_config: PeerProxyConfig,
}

/// Opens the log and spawns a proxy per peer. `last_applied` comes from the storage engine, and
/// the returned commit stream starts right after it.
pub(crate) fn create_replica<L, S>(
    logger: slog::Logger,
    options: ReplicaOptions,
    log: L,
    local_state: S,
    last_applied: Option<Index>,
    actor_client: WeakActorClient,
) -> io::Result<(Replica<L, S>, CommitStream, ElectionStateChangeListener)>
where
    L: Log<LogRecord>,
    S: PersistentLocalState,
{
    let (wal, commit_stream) = write_ahead_log::wired(logger.new(slog::o!("Component" => "Log")), log, last_applied)?;

    let my_replica_id = options.my_info.id.clone();
    let proxy_config = options.proxy_config.clone();
    let peers = options
        .cluster_members
        .into_iter()
        .filter(|member| member.id != my_replica_id)
        .map(|member| {
            let handle = PeerProxyHandle::spawn(
                logger.clone(),
                member.clone(),
                actor_client.clone(),
                proxy_config.clone(),
            );
            (member, handle)
        })
        .collect();
    let cluster_tracker = ClusterTracker::new(options.my_info, peers);

    let (replica, election_state_change_listener) = Replica::new(ReplicaConfig {
        logger,
        cluster_tracker,
        wal,
        local_state,
        actor_client,
        schema: options.schema,
        initialized: options.initialized,
        election: ElectionConfig {
            my_replica_id,
            heartbeat_interval: options.heartbeat_interval,
            election_timeout_min: options.election_timeout_min,
            election_timeout_max: options.election_timeout_max,
        },
        ping_interval: options.heartbeat_interval,
        apply_lag_max: options.apply_lag_max,
        log_retention_count: options.log_retention_count,
        proxy_config: options.proxy_config,
    });

    Ok((replica, commit_stream, election_state_change_listener))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::codec::StaticSchema;
    use crate::commitlog::InMemoryLog;
    use crate::replica::{ReplicaId, VolatileLocalState};
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn member(id: &str, port: u16) -> MemberInfo {
        MemberInfo::new(ReplicaId::new(id), Ipv4Addr::LOCALHOST, port)
    }

    #[tokio::test]
    async fn spawns_a_proxy_per_peer_and_skips_self() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let (actor_client, _actor_events) = ActorClient::new(10);
        let long = Duration::from_secs(600);

        let (replica, _commit_stream, _listener) = create_replica(
            logger,
            ReplicaOptions {
                my_info: member("a", 4100),
                cluster_members: vec![member("a", 4100), member("b", 4101), member("c", 4102)],
                initialized: true,
                schema: SchemaContext::new(Arc::new(StaticSchema::core())),
                heartbeat_interval: long,
                election_timeout_min: long,
                election_timeout_max: long * 2,
                apply_lag_max: 100,
                log_retention_count: 100,
                proxy_config: PeerProxyConfig {
                    rpc_timeout: long,
                    min_backoff: long,
                    max_backoff: long,
                },
            },
            InMemoryLog::create().unwrap(),
            VolatileLocalState::new(ReplicaId::new("a")),
            None,
            actor_client.weak(),
        )
        .unwrap();

        let status = replica.status();
        assert_eq!(status.replica_id, ReplicaId::new("a"));
        assert_eq!(status.cluster_size, 3);
        let mut proxied: Vec<_> = status
            .members
            .iter()
            .filter(|m| m.proxy_state.is_some())
            .map(|m| m.info.id.clone())
            .collect();
        proxied.sort();
        assert_eq!(proxied, vec![ReplicaId::new("b"), ReplicaId::new("c")]);
    }
}
