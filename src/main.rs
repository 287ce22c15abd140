use anyhow::Context;
use rebase_snapshot::config::{load_address_file, Config};
use rebase_snapshot::engine::OverrideTable;
use rebase_snapshot::{ChainReader, RpcChainReader, RpcSettings, RunOrchestrator};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let addresses = load_address_file(&config.address_file).context("loading address list")?;
    let overrides = match &config.swap_overrides_file {
        Some(path) => OverrideTable::load(path).context("loading swap overrides")?,
        None => OverrideTable::default(),
    };

    let reader: Arc<dyn ChainReader> = Arc::new(
        RpcChainReader::new(
            config.rpc_url.clone(),
            RpcSettings {
                timeout: config.rpc_timeout,
                max_attempts: config.rpc_max_attempts,
                max_in_flight: config.rpc_max_in_flight,
                ..RpcSettings::default()
            },
        )
        .context("building RPC client")?,
    );

    let summary = RunOrchestrator::new(reader, config)
        .run(&addresses, overrides)
        .await
        .context("snapshot run failed")?;

    tracing::info!(
        run_id = %summary.run_id,
        factor = %summary.factor,
        files = summary.files.len(),
        "Snapshot run finished"
    );
    Ok(())
}
