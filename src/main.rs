#![warn(
    // Base lints.
    clippy::all,
    // Some pedantic lints.
    clippy::pedantic,
    // New lints which are cool.
    clippy::nursery,
)]
#![
    allow(
        // I don't care about this.
        clippy::module_name_repetitions,
        // Yo, the hell you should put
        // it in docs, if signature is clear as sky.
        clippy::missing_errors_doc
    )
]

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use winproxy_core::config::OperatorConfig;
use winproxy_core::error::{Error, Result};
use winproxy_core::hcn::HcnGateway;
use winproxy_core::reconciler::Reconciler;
use winproxy_core::sink::EventSink;
use winproxy_core::tracker::ChangeTracker;
use winproxy_core::translator::TranslateConfig;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let operator_config = OperatorConfig::parse();
    tracing_subscriber::fmt()
        .with_max_level(operator_config.log_level)
        .init();

    match run(operator_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

/// The one documented fatal startup path: everything past network
/// resolution runs inside the reconciler loop and never propagates here.
async fn run(operator_config: OperatorConfig) -> Result<()> {
    tracing::info!("starting winproxy-core v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        cluster_cidr = operator_config.cluster_cidr,
        bind_address = operator_config.bind_address,
        masquerade_all = operator_config.masquerade_all,
        masquerade_bit = operator_config.masquerade_bit,
        "informational config accepted, not yet acted on",
    );

    let gateway = resolve_gateway(&operator_config)?;

    let network = gateway
        .get_network_by_name(&operator_config.network_name)
        .await
        .map_err(|err| Error::Config(format!("failed to resolve HCN network: {err}")))?;
    tracing::info!(network = %operator_config.network_name, "resolved target network");

    let tracker = ChangeTracker::new();
    let _sink = EventSink::new(tracker.clone());

    let translate_config = TranslateConfig {
        enable_dsr: operator_config.enable_dsr,
        source_vip: parse_source_vip(&operator_config.source_vip),
    };

    let reconciler = Reconciler::new(
        gateway,
        tracker,
        network,
        translate_config,
        operator_config.sync_period,
        operator_config.min_sync_period,
    )
    .await;

    let cancel = tokio_util::sync::CancellationToken::new();
    let reconciler_task = tokio::spawn(reconciler.run(cancel.clone()));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown requested, finishing current reconciliation cycle");
    cancel.cancel();

    tokio::select! {
        _ = reconciler_task => {}
        () = wait_for_shutdown_signal() => {
            tracing::warn!("forced shutdown on second signal");
        }
    }

    Ok(())
}

/// There is no concrete Windows HCN binding in this crate — a downstream
/// crate supplies one by implementing [`HcnGateway`]. Building a binary
/// from this crate alone has nothing to construct, so this is the single
/// point a real deployment wires in that implementation.
fn resolve_gateway(_config: &OperatorConfig) -> Result<Arc<dyn HcnGateway>> {
    Err(Error::Config(
        "no HcnGateway binding is compiled into this build".to_string(),
    ))
}

fn parse_source_vip(raw: &str) -> Option<std::net::IpAddr> {
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(ip) => Some(ip),
        Err(_) => {
            tracing::warn!(source_vip = raw, "invalid source-vip, ignoring");
            None
        }
    }
}

async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
