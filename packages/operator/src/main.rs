use clap::Parser;
use opentelemetry::global;
use operator::{args::CliArgs, config::Config};
use utils::{
    config::{ConfigBuilder, ConfigExt},
    context::AppContext,
    telemetry::{setup_console_tracing, setup_metrics, setup_tracing, ResponderMetrics},
};

const SERVICE_NAME: &str = "hello-world-operator";

fn main() {
    let args = CliArgs::parse();
    let config: Config = match ConfigBuilder::new(args).build() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load config: {err:#}");
            std::process::exit(1);
        }
    };

    let ctx = match AppContext::new() {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("Unable to start runtime: {err}");
            std::process::exit(1);
        }
    };

    // setup tracing
    let tracer_provider = match config.tracing_env_filter() {
        Ok(filters) => match config.jaeger.as_deref() {
            Some(collector) => ctx
                .rt
                .block_on(async { setup_tracing(collector, SERVICE_NAME, filters) })
                .map(Some),
            None => setup_console_tracing(filters).map(|_| None),
        },
        Err(err) => Err(err),
    };
    let tracer_provider = match tracer_provider {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("Unable to set up tracing: {err:#}");
            std::process::exit(1);
        }
    };

    let meter_provider = match config.prometheus.as_deref() {
        Some(collector) => match ctx
            .rt
            .block_on(async { setup_metrics(collector, SERVICE_NAME) })
        {
            Ok(provider) => Some(provider),
            Err(err) => {
                tracing::warn!("Metrics disabled: {err:#}");
                None
            }
        },
        None => None,
    };
    let metrics = ResponderMetrics::init(&global::meter("operator_metrics"));

    if let Err(err) = ctrlc::set_handler({
        let ctx = ctx.clone();
        move || {
            tracing::info!("Received shutdown signal");
            ctx.kill();
        }
    }) {
        tracing::warn!("Unable to install ctrl-c handler: {err}");
    }

    let result = ctx
        .rt
        .block_on(operator::run_operator(ctx.clone(), config, metrics));

    if let Some(provider) = meter_provider {
        if let Err(err) = provider.shutdown() {
            tracing::warn!("Metrics provider did not shut down cleanly: {err}");
        }
    }
    if let Some(provider) = tracer_provider {
        if let Err(err) = provider.shutdown() {
            eprintln!("Tracer provider did not shut down cleanly: {err}");
        }
    }

    if let Err(err) = result {
        tracing::error!("Operator stopped: {err}");
        std::process::exit(1);
    }
}
