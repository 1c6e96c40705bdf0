use crate::agent::ExecutionResult;

/// Receives the record of every finished run.
///
/// Purely a reporting callback: the engine ignores whatever a sink does and
/// never depends on it for correctness.
pub trait MetricsSink: Send + Sync {
    fn record_execution(&self, result: &ExecutionResult);
}
