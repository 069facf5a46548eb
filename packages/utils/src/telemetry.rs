use anyhow::Result;
use opentelemetry::{
    global,
    metrics::{Counter, Meter},
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::SdkMeterProvider,
    resource::Resource,
    trace::{self, Sampler, SdkTracerProvider},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Console logging only, used when no collector is configured
pub fn setup_console_tracing(filters: tracing_subscriber::EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false),
        )
        .with(filters)
        .try_init()?;

    Ok(())
}

/// Console logging plus OTLP span export to a jaeger-compatible collector
/// must be called from within a tokio runtime, the batch processor spawns onto it
pub fn setup_tracing(
    collector: &str,
    service_name: &str,
    filters: tracing_subscriber::EnvFilter,
) -> Result<SdkTracerProvider> {
    global::set_text_map_propagator(opentelemetry_jaeger_propagator::Propagator::new());
    let endpoint = format!("{}/v1/traces", collector);
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let batch_processor = trace::BatchSpanProcessor::builder(exporter).build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(batch_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(format!("{}-tracer", service_name));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(filters)
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .try_init()?;

    tracing::info!("Jaeger tracing enabled");
    Ok(provider)
}

pub fn setup_metrics(collector: &str, service_name: &str) -> Result<SdkMeterProvider> {
    let endpoint = format!("{}/api/v1/otlp/v1/metrics", collector);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .with_periodic_exporter(exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    tracing::info!("Metrics enabled and exporting to {}", collector);

    Ok(meter_provider)
}

/// Counters for the task responder loop
/// without a meter provider these are no-ops
#[derive(Clone, Debug)]
pub struct ResponderMetrics {
    pub tasks_received: Counter<u64>,
    pub responses_submitted: Counter<u64>,
    pub response_errors: Counter<u64>,
    pub tasks_skipped: Counter<u64>,
}

impl ResponderMetrics {
    pub const LABEL: &'static str = "responder";

    pub fn init(meter: &Meter) -> Self {
        Self {
            tasks_received: meter
                .u64_counter(format!("{}_tasks_received", Self::LABEL))
                .with_description("Number of task events delivered by the subscription")
                .build(),
            responses_submitted: meter
                .u64_counter(format!("{}_responses_submitted", Self::LABEL))
                .with_description("Number of response transactions accepted by the node")
                .build(),
            response_errors: meter
                .u64_counter(format!("{}_response_errors", Self::LABEL))
                .with_description("Number of failed response attempts, including retried ones")
                .build(),
            tasks_skipped: meter
                .u64_counter(format!("{}_tasks_skipped", Self::LABEL))
                .with_description("Number of tasks abandoned after exhausting retries")
                .build(),
        }
    }

    pub fn noop() -> Self {
        Self::init(&global::meter("noop"))
    }

    pub fn increment_tasks_received(&self) {
        self.tasks_received.add(1, &[]);
    }

    pub fn increment_responses_submitted(&self) {
        self.responses_submitted.add(1, &[]);
    }

    pub fn increment_response_errors(&self, kind: &'static str) {
        self.response_errors
            .add(1, &[KeyValue::new("kind", kind)]);
    }

    pub fn increment_tasks_skipped(&self) {
        self.tasks_skipped.add(1, &[]);
    }
}
