use anyhow::{Result, anyhow};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, Tracer},
};
use std::{env::var, time::Duration};
use tonic::{
    metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Parse `OTEL_EXPORTER_OTLP_HEADERS` ("k=v,k2=v2") into gRPC metadata.
fn headers_to_metadata(headers_str: &str) -> Result<MetadataMap> {
    let mut meta = MetadataMap::new();

    for pair in headers_str.split(',') {
        let mut parts = pair.splitn(2, '=');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let key_str = key.trim().to_ascii_lowercase();

        let key = MetadataKey::<Ascii>::from_bytes(key_str.as_bytes())
            .map_err(|e| anyhow!("invalid metadata key {key_str}: {e}"))?;
        let val: MetadataValue<_> = value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid metadata value for key {key_str}: {e}"))?;
        meta.insert(key, val);
    }

    Ok(meta)
}

fn normalize_endpoint(ep: String) -> String {
    if ep.starts_with("http://") || ep.starts_with("https://") {
        ep
    } else {
        // Default to https for gRPC if no scheme supplied
        format!("https://{}", ep.trim_end_matches('/'))
    }
}

fn init_tracer() -> Result<Tracer> {
    let default_ep = "http://localhost:4317";
    let endpoint = var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| default_ep.to_string());
    let endpoint = normalize_endpoint(endpoint);

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(Duration::from_secs(3));

    if let Some(host) = endpoint
        .strip_prefix("https://")
        .and_then(|s| s.split('/').next())
        .and_then(|h| h.split(':').next())
    {
        let tls = ClientTlsConfig::new()
            .domain_name(host.to_string())
            .with_native_roots();
        builder = builder.with_tls_config(tls);
    }

    if let Ok(headers) = var("OTEL_EXPORTER_OTLP_HEADERS") {
        builder = builder.with_metadata(headers_to_metadata(&headers)?);
    }

    let exporter = builder.build()?;

    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());

    let trace_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", instance_id),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(trace_provider.clone());

    global::set_tracer_provider(trace_provider.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Ok(trace_provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Initialize logging + (optional) tracing exporter
/// Tracing is enabled if `OTEL_EXPORTER_OTLP_ENDPOINT` is set (gRPC only).
///
/// # Errors
///
/// Returns an error if tracer or subscriber initialization fails
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let verbosity_level = verbosity_level.unwrap_or(Level::ERROR);

    let fmt_layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = init_tracer()?;
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        let subscriber = Registry::default()
            .with(fmt_layer)
            .with(otel_layer)
            .with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(fmt_layer).with(filter);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Gracefully shut down tracer provider (noop if not initialized)
pub fn shutdown_tracer() {
    if let Some(tp) = TRACER_PROVIDER.get() {
        debug!("shutting down tracer provider");
        let _ = tp.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_to_metadata_empty() {
        let metadata = headers_to_metadata("").unwrap_or_default();
        assert_eq!(metadata.len(), 0);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn headers_to_metadata_pairs() {
        let metadata = headers_to_metadata("authorization=Bearer token123,x-team=auth").unwrap();
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn headers_to_metadata_skips_malformed() {
        let metadata = headers_to_metadata("key1=value1,malformed").unwrap();
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn normalize_endpoint_keeps_scheme() {
        assert_eq!(
            normalize_endpoint("http://localhost:4317".to_string()),
            "http://localhost:4317"
        );
        assert_eq!(
            normalize_endpoint("https://otel.example.com:4317".to_string()),
            "https://otel.example.com:4317"
        );
    }

    #[test]
    fn normalize_endpoint_defaults_to_https() {
        assert_eq!(
            normalize_endpoint("otel.example.com:4317/".to_string()),
            "https://otel.example.com:4317"
        );
    }

    #[test]
    fn shutdown_tracer_without_provider() {
        shutdown_tracer();
    }
}
