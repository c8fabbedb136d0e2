//! Prometheus metrics for fix sessions
//!
//! Metrics live in the default registry so any part of the crate can record
//! into them. `render()` produces the text exposition format, printed by the
//! CLI with `--print-metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Completion requests sent, by model
    pub static ref COMPLETION_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "makeitpass_completion_requests_total",
        "Completion requests sent to the model endpoint",
        &["model"]
    )
    .expect("metric can be registered");

    /// Completion request latency, by model
    pub static ref COMPLETION_DURATION: HistogramVec = register_histogram_vec!(
        "makeitpass_completion_duration_seconds",
        "Latency of completion requests",
        &["model"],
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("metric can be registered");

    /// Tool calls executed, by tool and status ("ok" / "error")
    pub static ref TOOL_CALLS: IntCounterVec = register_int_counter_vec!(
        "makeitpass_tool_calls_total",
        "Tool calls dispatched on behalf of the model",
        &["tool", "status"]
    )
    .expect("metric can be registered");

    /// Tool rounds needed per fix attempt
    pub static ref TOOL_ROUNDS: Histogram = register_histogram!(
        "makeitpass_tool_rounds",
        "Tool rounds performed within one fix attempt",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0]
    )
    .expect("metric can be registered");

    /// Fix attempts, by outcome ("answered" / "failed")
    pub static ref FIX_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "makeitpass_fix_attempts_total",
        "Calls to apply_fix",
        &["outcome"]
    )
    .expect("metric can be registered");

    /// Runs of the target command, by result ("pass" / "fail")
    pub static ref COMMAND_RUNS: IntCounterVec = register_int_counter_vec!(
        "makeitpass_command_runs_total",
        "Executions of the target build/test command",
        &["result"]
    )
    .expect("metric can be registered");
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> String {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
