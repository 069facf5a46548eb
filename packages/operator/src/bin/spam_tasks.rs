use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use operator::{args::CliArgs, config::Config, spammer::TaskSpammer, transaction::TransactionBuilder};
use utils::{
    config::{ConfigBuilder, ConfigExt},
    context::AppContext,
    evm_client::EvmClient,
    telemetry::setup_console_tracing,
};

fn main() {
    if let Err(err) = run() {
        tracing::error!("Task spammer stopped: {err:#}");
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    let config: Config = ConfigBuilder::new(args).build()?;

    setup_console_tracing(config.tracing_env_filter()?)?;

    let ctx = AppContext::new()?;

    ctrlc::set_handler({
        let ctx = ctx.clone();
        move || ctx.kill()
    })?;

    ctx.rt.block_on(async {
        let signer = config.signer()?;
        let client = EvmClient::new(config.endpoint()?).await?;
        let transactions =
            TransactionBuilder::connect(Arc::new(client), config.gas_limit()?, config.gas_price()?)
                .await?;

        tracing::info!(sender = %signer.address(), "Creating a task every {:?}", config.spam_interval());

        TaskSpammer::new(
            signer,
            transactions,
            config.service_manager()?,
            config.spam_interval(),
        )
        .run(ctx.clone())
        .await?;

        Ok::<_, anyhow::Error>(())
    })
}
