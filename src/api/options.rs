use std::convert::TryFrom;
use std::ops::RangeInclusive;
use tokio::time::Duration;

/// Tunables for a raft client. Every field is optional; unset fields fall back to defaults.
#[derive(Clone, Debug, Default)]
pub struct RaftOptions {
    /// Base follower timeout. The actual timeout is random in `[election_timeout, 1.5 * election_timeout]`.
    /// It also bounds every RPC to a peer.
    pub election_timeout: Option<Duration>,
    /// Leader heartbeat interval.
    pub ping_interval: Option<Duration>,
    /// Applied log entries kept around for lagging peers.
    pub log_retention_count: Option<u64>,
    /// A follower reports itself busy once this many written entries are waiting to be applied.
    pub apply_lag_max: Option<u64>,
    /// How long a client write waits to be committed and applied.
    pub consensus_timeout: Option<Duration>,
}

const ELECTION_TIMEOUT_RANGE: RangeInclusive<Duration> = Duration::from_millis(200)..=Duration::from_millis(90_000);
const PING_INTERVAL_RANGE: RangeInclusive<Duration> = Duration::from_millis(100)..=Duration::from_millis(30_000);
const LOG_RETENTION_COUNT_RANGE: RangeInclusive<u64> = 50..=10_000;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RaftOptionsValidated {
    pub election_timeout: Duration,
    pub ping_interval: Duration,
    pub log_retention_count: u64,
    pub apply_lag_max: u64,
    pub consensus_timeout: Duration,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if !ELECTION_TIMEOUT_RANGE.contains(&self.election_timeout) {
            return Err("Election timeout must be within 200ms and 90s");
        }
        if !PING_INTERVAL_RANGE.contains(&self.ping_interval) {
            return Err("Ping interval must be within 100ms and 30s");
        }
        if self.election_timeout <= self.ping_interval * 2 {
            return Err("Election timeout must be greater than twice the ping interval");
        }
        if !LOG_RETENTION_COUNT_RANGE.contains(&self.log_retention_count) {
            return Err("Log retention count must be within 50 and 10000");
        }
        if self.apply_lag_max == 0 {
            return Err("Apply lag max must be at least 1");
        }
        if self.consensus_timeout < self.ping_interval {
            return Err("Consensus timeout must be at least the ping interval");
        }

        Ok(())
    }

    pub fn election_timeout_min(&self) -> Duration {
        self.election_timeout
    }

    pub fn election_timeout_max(&self) -> Duration {
        self.election_timeout * 3 / 2
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.election_timeout
    }

    pub fn min_backoff(&self) -> Duration {
        self.ping_interval
    }

    pub fn max_backoff(&self) -> Duration {
        self.election_timeout
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let election_timeout = options.election_timeout.unwrap_or(Duration::from_millis(20_000));
        let values = RaftOptionsValidated {
            election_timeout,
            ping_interval: options.ping_interval.unwrap_or(Duration::from_millis(7_000)),
            log_retention_count: options.log_retention_count.unwrap_or(100),
            apply_lag_max: options.apply_lag_max.unwrap_or(500),
            consensus_timeout: options.consensus_timeout.unwrap_or(election_timeout),
        };

        values.validate()?;
        Ok(values)
    }
}
