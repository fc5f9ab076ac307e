//! Gateway metric instruments

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

/// How a proxied tool call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallOutcome {
    Success,
    Error,
}

impl ToolCallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Instruments recording proxied tool calls
///
/// When no meter provider is installed the global meter is a no-op, so this
/// handle is always safe to construct and record against.
#[derive(Clone)]
pub struct ToolCallMetrics {
    calls: Counter<u64>,
    duration: Histogram<f64>,
}

impl ToolCallMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("canopy");
        let calls = meter
            .u64_counter("mcp_tool_calls_total")
            .with_description("Number of tool calls proxied to upstream MCP servers")
            .build();
        let duration = meter
            .f64_histogram("mcp_tool_call_duration_seconds")
            .with_description("Duration of proxied tool calls")
            .with_unit("s")
            .build();
        Self { calls, duration }
    }

    /// Record one proxied tool call
    pub fn record_tool_call(&self, server: &str, tool: &str, outcome: ToolCallOutcome, elapsed: Duration) {
        let attributes = [
            KeyValue::new("server", server.to_string()),
            KeyValue::new("tool", tool.to_string()),
            KeyValue::new("outcome", outcome.as_str()),
        ];
        self.calls.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64(), &attributes);
    }
}

impl Default for ToolCallMetrics {
    fn default() -> Self {
        Self::new()
    }
}
