use std::time::Duration;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Options recognized by the reconciler binary. Everything here has a
/// matching entry in the table in the design doc's external-interfaces
/// section; `network_name` is the only one that is fatal if unresolved.
#[derive(Debug, Clone, Parser)]
pub struct OperatorConfig {
    /// HCN network to program. Falls back to `KUBE_NETWORK` via `env`.
    #[arg(long, env = "KUBE_NETWORK")]
    pub network_name: String,

    #[arg(long, env = "WINPROXY_ENABLE_DSR", default_value = "true")]
    pub enable_dsr: bool,

    #[arg(long, env = "WINPROXY_SOURCE_VIP", default_value = "")]
    pub source_vip: String,

    #[arg(long, env = "WINPROXY_SYNC_PERIOD_SECS", default_value = "15", value_parser = parse_secs)]
    pub sync_period: Duration,

    #[arg(long, env = "WINPROXY_MIN_SYNC_PERIOD_SECS", default_value = "0", value_parser = parse_secs)]
    pub min_sync_period: Duration,

    /// Informational only; used in startup logging, nothing downstream acts on it.
    #[arg(long, env = "WINPROXY_CLUSTER_CIDR", default_value = "100.244.0.0/24")]
    pub cluster_cidr: String,

    /// Advisory node-IP hint; node-IP auto-detection itself is out of scope.
    #[arg(long, env = "WINPROXY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Reserved for SNAT integration; accepted but not yet acted on.
    #[arg(long, env = "WINPROXY_MASQUERADE_ALL", default_value = "false")]
    pub masquerade_all: bool,

    /// Reserved for SNAT integration; accepted but not yet acted on.
    #[arg(long, env = "WINPROXY_MASQUERADE_BIT", default_value = "14")]
    pub masquerade_bit: u8,

    #[arg(long, env = "WINPROXY_LOG_LEVEL", default_value = "INFO")]
    pub log_level: LevelFilter,
}

fn parse_secs(raw: &str) -> Result<Duration, std::num::ParseIntError> {
    raw.parse::<u64>().map(Duration::from_secs)
}
