//! Tracing setup for ojremote binaries.
//!
//! [`init_tracing`] installs an `EnvFilter` + fmt layer on stderr. With the
//! `telemetry` feature, an OpenTelemetry layer is stacked on the same
//! registry when the standard OTel environment variables ask for export:
//!
//! ```bash
//! # Minimal: enables OTLP export to localhost:4317
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run -p ojremote-demo
//!
//! # Full control
//! OTEL_SERVICE_NAME=ojremote-demo \
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://jaeger:4317 \
//! OTEL_TRACES_EXPORTER=otlp \
//! cargo run -p ojremote-demo --features telemetry
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to explicitly disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("tracing already initialised: {0}")]
    AlreadyInitialised(String),

    #[error("OTLP exporter: {0}")]
    Exporter(String),
}

/// Keeps export running. Hold it for the life of the process; dropping it
/// flushes pending spans.
#[must_use]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    _otel: Option<OtelGuard>,
}

/// Install the global subscriber.
///
/// `filter` wins over `RUST_LOG`; with neither, `default_filter` applies.
pub fn init_tracing(
    service_name: &str,
    filter: Option<&str>,
    default_filter: &str,
) -> Result<TelemetryGuard, TelemetryError> {
    let filter = match filter {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| TelemetryError::Filter(e.to_string()))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
    };

    #[cfg(feature = "telemetry")]
    let (otel, guard) = if otel_enabled() {
        let (layer, guard) = otel_layer(service_name)?;
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };
    #[cfg(not(feature = "telemetry"))]
    let _ = service_name;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    #[cfg(feature = "telemetry")]
    let registry = registry.with(otel);

    registry.try_init().map_err(|e| TelemetryError::AlreadyInitialised(e.to_string()))?;
    Ok(TelemetryGuard {
        #[cfg(feature = "telemetry")]
        _otel: guard,
    })
}

/// Check whether OTel export should be enabled.
///
/// Returns `true` when standard OTel env vars indicate export is desired:
/// - `OTEL_SDK_DISABLED` is NOT set to `"true"`
/// - AND at least one of:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///   - `OTEL_TRACES_EXPORTER` is set (and not `"none"`)
pub fn otel_enabled() -> bool {
    otel_enabled_with(|key| std::env::var(key).ok())
}

fn otel_enabled_with(var: impl Fn(&str) -> Option<String>) -> bool {
    // Explicit disable takes priority
    if var("OTEL_SDK_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }
    if var("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
        return true;
    }
    var("OTEL_TRACES_EXPORTER").is_some_and(|exporter| !exporter.eq_ignore_ascii_case("none"))
}

/// Sampling rate for a span, by name prefix.
///
/// | Prefix       | Rate | Rationale                                |
/// |--------------|------|------------------------------------------|
/// | `session.*`  | 100% | Proxy creation, one per remote object    |
/// | `tree.*`     | 100% | Node lifecycle                           |
/// | `invoke.*`   | 10%  | Every remote call                        |
/// | `notify.*`   |  1%  | Notification pump, very high volume      |
/// | other        | 10%  | Default for unclassified spans           |
pub fn sample_rate(span_name: &str) -> f64 {
    if span_name.starts_with("session") || span_name.starts_with("tree") {
        1.0
    } else if span_name.starts_with("notify") {
        0.01
    } else {
        0.1
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn enabled(vars: &[(&str, &str)]) -> bool {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        otel_enabled_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_otel_enabled_by_env() {
        assert!(!enabled(&[]));
        assert!(enabled(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317")]));
        assert!(enabled(&[("OTEL_TRACES_EXPORTER", "otlp")]));
        assert!(!enabled(&[("OTEL_TRACES_EXPORTER", "None")]));
        assert!(!enabled(&[
            ("OTEL_SDK_DISABLED", "TRUE"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
        ]));
    }

    #[test]
    fn test_sample_rate_by_prefix() {
        assert_eq!(sample_rate("session.describe"), 1.0);
        assert_eq!(sample_rate("tree.node"), 1.0);
        assert_eq!(sample_rate("invoke.call"), 0.1);
        assert_eq!(sample_rate("notify.pump"), 0.01);
        assert_eq!(sample_rate("main"), 0.1);
    }
}
