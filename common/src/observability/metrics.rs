//! Prometheus exposition (Rust `prometheus` crate).
//!
//! One `MetricsContext` is intended per process. Instruments are not fixed:
//! callers register them by name at startup, after the playback
//! configuration is known, and keep the returned handles.

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Configuration for the built-in Prometheus scrape endpoint.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// Address to bind, e.g. `127.0.0.1:9464`.
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    // ---
    pub fn new(bind: SocketAddr) -> Self {
        // ---
        Self { bind }
    }
}

/// Resource attributes attached to every exported series as constant labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLabels {
    // ---
    /// Service name shown by the backend (`service_name` label).
    pub service_name: String,

    /// Application grouping (`application` label).
    pub application: String,
}

impl ResourceLabels {
    // ---
    pub fn new(service_name: impl Into<String>, application: impl Into<String>) -> Self {
        // ---
        Self {
            service_name: service_name.into(),
            application: application.into(),
        }
    }

    fn into_labels(self) -> HashMap<String, String> {
        // ---
        HashMap::from([
            ("service_name".to_string(), self.service_name),
            ("application".to_string(), self.application),
        ])
    }
}

impl Default for ResourceLabels {
    fn default() -> Self {
        // ---
        Self::new("otel-playback-service", "otel-playback-app")
    }
}

/// Prometheus registry wrapper with dynamic instrument registration.
///
/// Cloning is cheap: clones share the same underlying registry.
#[derive(Clone)]
pub struct MetricsContext {
    // ---
    registry: Registry,

    /// Resource attributes, attached to each instrument as const labels so
    /// the exposition sorts them with the instrument's own label pairs.
    const_labels: HashMap<String, String>,
}

impl MetricsContext {
    // ---
    /// Create a registry whose series all carry `resource` as constant labels.
    pub fn new(resource: ResourceLabels) -> Result<Self> {
        // ---
        Ok(Self {
            registry: Registry::new(),
            const_labels: resource.into_labels(),
        })
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        // ---
        Opts::new(name, help).const_labels(self.const_labels.clone())
    }

    /// Register a floating point gauge.
    pub fn register_gauge(&self, name: &str, help: &str) -> Result<Gauge> {
        // ---
        let gauge = Gauge::with_opts(self.opts(name, help))
            .with_context(|| format!("invalid gauge '{name}'"))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .with_context(|| format!("failed to register gauge '{name}'"))?;
        debug!(name, "registered gauge");
        Ok(gauge)
    }

    /// Register a monotonically increasing floating point counter.
    pub fn register_counter(&self, name: &str, help: &str) -> Result<Counter> {
        // ---
        let counter = Counter::with_opts(self.opts(name, help))
            .with_context(|| format!("invalid counter '{name}'"))?;
        self.registry
            .register(Box::new(counter.clone()))
            .with_context(|| format!("failed to register counter '{name}'"))?;
        debug!(name, "registered counter");
        Ok(counter)
    }

    /// Register a histogram with explicit bucket upper bounds.
    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        buckets: &[f64],
    ) -> Result<Histogram> {
        // ---
        let opts = HistogramOpts::from(self.opts(name, help)).buckets(buckets.to_vec());
        let histogram = Histogram::with_opts(opts)
            .with_context(|| format!("invalid histogram '{name}'"))?;
        self.registry
            .register(Box::new(histogram.clone()))
            .with_context(|| format!("failed to register histogram '{name}'"))?;
        debug!(name, ?buckets, "registered histogram");
        Ok(histogram)
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        // ---
        encode_registry(&self.registry)
    }

    /// Spawns a minimal HTTP server that serves `GET /metrics`.
    ///
    /// Callers decide whether to run it and own the returned handle.
    pub fn spawn_metrics_server(&self, cfg: MetricsServerConfig) -> JoinHandle<Result<()>> {
        // ---
        let registry = Arc::new(self.registry.clone());
        tokio::spawn(async move {
            // ---
            let make_svc = make_service_fn(move |_conn| {
                let registry = Arc::clone(&registry);
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req| {
                        let registry = Arc::clone(&registry);
                        async move { handle_metrics_request(req, registry).await }
                    }))
                }
            });

            let server = Server::try_bind(&cfg.bind)
                .with_context(|| format!("failed to bind metrics endpoint {}", cfg.bind))?
                .serve(make_svc);
            info!("Serving metrics on http://{}/metrics", cfg.bind);
            server.await.context("metrics server failed")?;
            Ok(())
        })
    }
}

fn encode_registry(registry: &Registry) -> Result<String> {
    // ---
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("failed to encode metrics")?;
    String::from_utf8(buffer).context("metrics output is not UTF-8")
}

async fn handle_metrics_request(
    req: Request<Body>,
    registry: Arc<Registry>,
) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match encode_registry(&registry) {
            Ok(text) => {
                let mut resp = Response::new(Body::from(text));
                resp.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                Ok(resp)
            }
            Err(e) => {
                let mut resp = Response::new(Body::from(format!("encode error: {e:#}")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(resp)
            }
        },
        _ => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn resource_labels_are_attached_to_series() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::new("svc", "app")).expect("registry");
        let gauge = ctx.register_gauge("temperature", "test gauge").expect("gauge");
        gauge.set(21.5);

        let text = ctx.render().expect("render");
        assert!(text.contains("temperature{application=\"app\",service_name=\"svc\"} 21.5"));
    }

    #[test]
    fn label_order_is_stable_across_renders() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::new("svc", "app")).expect("registry");
        ctx.register_gauge("depth", "gauge").expect("gauge").set(1.0);
        ctx.register_counter("cum_total", "counter").expect("counter").inc_by(2.0);
        ctx.register_histogram("cum_latency", "histogram", &[1.0])
            .expect("histogram")
            .observe(0.5);

        let first = ctx.render().expect("render");
        for _ in 0..20 {
            assert_eq!(ctx.render().expect("render"), first);
        }
        assert!(first.contains("cum_total{application=\"app\",service_name=\"svc\"} 2"));
        assert!(first.contains("cum_latency_count{application=\"app\",service_name=\"svc\"} 1"));
    }

    #[test]
    fn separate_contexts_render_identically() {
        // ---
        let render = || {
            let ctx = MetricsContext::new(ResourceLabels::new("svc", "app")).expect("registry");
            ctx.register_gauge("depth", "gauge").expect("gauge").set(3.0);
            ctx.render().expect("render")
        };
        let expected = render();
        for _ in 0..10 {
            assert_eq!(render(), expected);
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        ctx.register_counter("cum_requests", "first").expect("counter");
        assert!(ctx.register_counter("cum_requests", "second").is_err());
    }

    #[test]
    fn invalid_names_are_rejected() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        assert!(ctx.register_gauge("not a metric", "bad").is_err());
    }

    #[test]
    fn histogram_uses_explicit_buckets() {
        // ---
        let ctx = MetricsContext::new(ResourceLabels::default()).expect("registry");
        let histogram = ctx
            .register_histogram("cum_latency", "test histogram", &[1.0, 2.0, 5.0, 10.0])
            .expect("histogram");
        histogram.observe(3.0);

        let text = ctx.render().expect("render");
        assert!(text.contains("le=\"5\""));
        assert!(text.contains("cum_latency_count"));
    }
}
