//! Prometheus metrics for the client session.
//!
//! Counters track connection churn, routing volume, command dispatch
//! outcomes, and fetch retry pressure. They are exposed on an HTTP endpoint
//! by [`crate::http`] when a metrics port is configured.

use std::sync::OnceLock;

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Global Prometheus registry for all metrics.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide metrics registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn counter(cell: &'static OnceLock<IntCounter>, name: &str, help: &str) -> &'static IntCounter {
    cell.get_or_init(|| {
        let counter =
            IntCounter::new(name, help).expect("metric name and help are statically valid");
        // Double registration cannot happen through OnceLock; any other
        // registry error just leaves the counter unexported.
        let _ = registry().register(Box::new(counter.clone()));
        counter
    })
}

static RECONNECTS: OnceLock<IntCounter> = OnceLock::new();
static MESSAGES_ROUTED: OnceLock<IntCounter> = OnceLock::new();
static MESSAGES_IGNORED: OnceLock<IntCounter> = OnceLock::new();
static BROADCASTS: OnceLock<IntCounter> = OnceLock::new();
static COMMANDS_DISPATCHED: OnceLock<IntCounter> = OnceLock::new();
static COMMANDS_FAILED: OnceLock<IntCounter> = OnceLock::new();
static FETCH_ATTEMPTS: OnceLock<IntCounter> = OnceLock::new();
static FETCH_RETRIES: OnceLock<IntCounter> = OnceLock::new();

/// Reconnect attempts scheduled after a lost connection.
pub fn reconnects() -> &'static IntCounter {
    counter(
        &RECONNECTS,
        "lodestar_reconnects_total",
        "Reconnect attempts scheduled after a lost connection.",
    )
}

/// Chat lines that entered the router.
pub fn messages_routed() -> &'static IntCounter {
    counter(
        &MESSAGES_ROUTED,
        "lodestar_messages_routed_total",
        "Chat lines processed by the message router.",
    )
}

/// Chat lines dropped by ignore filtering.
pub fn messages_ignored() -> &'static IntCounter {
    counter(
        &MESSAGES_IGNORED,
        "lodestar_messages_ignored_total",
        "Chat lines dropped because the sender matched an ignore mask.",
    )
}

/// Ambient events delivered to at least one observer.
pub fn broadcasts() -> &'static IntCounter {
    counter(
        &BROADCASTS,
        "lodestar_ambient_broadcasts_total",
        "Ambient events delivered to at least one observer.",
    )
}

/// Command invocations that completed successfully.
pub fn commands_dispatched() -> &'static IntCounter {
    counter(
        &COMMANDS_DISPATCHED,
        "lodestar_commands_dispatched_total",
        "Command invocations that completed successfully.",
    )
}

/// Command invocations that failed and were reported to the conversation.
pub fn commands_failed() -> &'static IntCounter {
    counter(
        &COMMANDS_FAILED,
        "lodestar_commands_failed_total",
        "Command invocations that failed.",
    )
}

/// Individual fetch attempts, including retries.
pub fn fetch_attempts() -> &'static IntCounter {
    counter(
        &FETCH_ATTEMPTS,
        "lodestar_fetch_attempts_total",
        "Individual fetch attempts, including retries.",
    )
}

/// Fetch attempts that were retried after a transient failure.
pub fn fetch_retries() -> &'static IntCounter {
    counter(
        &FETCH_RETRIES,
        "lodestar_fetch_retries_total",
        "Fetch attempts retried after a transient failure.",
    )
}

/// Touch every counter so the endpoint exports them from the start.
pub fn init() {
    reconnects();
    messages_routed();
    messages_ignored();
    broadcasts();
    commands_dispatched();
    commands_failed();
    fetch_attempts();
    fetch_retries();
}

/// Gather all metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry().gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_and_increment() {
        init();
        // Other tests share the process-wide counters; only claim our own
        // increment landed.
        let before = reconnects().get();
        reconnects().inc();
        assert!(reconnects().get() >= before + 1);
    }

    #[test]
    fn gather_exports_text_format() {
        init();
        messages_routed().inc();
        let text = gather_metrics();
        assert!(text.contains("lodestar_messages_routed_total"));
    }
}
