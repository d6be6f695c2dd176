//! Application-specific context (state shared by handler functions).

use prometheus_client::{metrics::gauge::Gauge, registry::Registry as MetricsRegistry};
use std::collections::BTreeMap;

use crate::{any_client::AnyConnector, registry::Registry, session::ConnectTiming};

/// Context for a given server -- this contains all the information required
/// to serve a request.
pub struct Context {
    /// OpenAPI document served at `/`.
    pub schema: serde_json::Value,

    /// Every configured printer.
    pub registry: Registry<AnyConnector>,

    /// Poll interval and deadline for `connect`.
    pub timing: ConnectTiming,

    /// Expected `X-API-Key`; `None` disables the check.
    pub api_key: Option<String>,

    /// Origins that get CORS headers.
    pub allow_origins: Vec<String>,

    /// Prometheus exposition.
    pub metrics: Metrics,
}

impl Context {
    /// Create a context serving `registry`.
    pub fn new(
        schema: serde_json::Value,
        registry: Registry<AnyConnector>,
        timing: ConnectTiming,
        api_key: Option<String>,
        allow_origins: Vec<String>,
    ) -> Self {
        let metrics = Metrics::new(registry.iter().map(|session| session.name()));
        Self {
            schema,
            registry,
            timing,
            api_key,
            allow_origins,
            metrics,
        }
    }
}

/// Per-printer gauges, refreshed on every scrape.
pub struct Metrics {
    registry: MetricsRegistry,
    ready: BTreeMap<String, Gauge>,
}

impl Metrics {
    fn new<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        let mut registry = MetricsRegistry::default();
        let mut ready = BTreeMap::new();

        for name in names {
            let gauge = Gauge::default();
            registry
                .sub_registry_with_label(("printer".into(), name.to_owned().into()))
                .register("printer_ready", "1 when the printer session is ready", gauge.clone());
            ready.insert(name.to_owned(), gauge);
        }

        Self { registry, ready }
    }

    /// Record whether `printer` is ready.
    pub fn set_ready(&self, printer: &str, ready: bool) {
        if let Some(gauge) = self.ready.get(printer) {
            gauge.set(i64::from(ready));
        }
    }

    /// Render the registry in the text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        prometheus_client::encoding::text::encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
