//! Stock [`MetricsSink`] implementations.

use crate::agent::{AgentStatus, ExecutionResult};
use crate::traits::MetricsSink;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

const MAX_SAMPLES_PER_AGENT: usize = 1000;

/// Logs each finished run as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_execution(&self, result: &ExecutionResult) {
        tracing::info!(
            agent_id = %result.agent_id,
            status = %result.status,
            duration_ms = result.duration_ms,
            prompt_tokens = result.token_usage.prompt_tokens,
            completion_tokens = result.token_usage.completion_tokens,
            tool_calls = result.tool_calls.len(),
            truncated = result.truncated,
            "Agent execution recorded"
        );
    }
}

#[derive(Debug, Clone)]
struct Sample {
    timestamp: DateTime<Utc>,
    status: AgentStatus,
    duration_ms: u64,
    total_tokens: u64,
    tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentMetricsSummary {
    pub agent_id: String,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub total_tokens: u64,
    pub last_7_days_executions: usize,
    pub last_execution: Option<DateTime<Utc>>,
    pub tool_calls: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemMetricsSummary {
    pub total_agents: usize,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub success_rate: f64,
}

/// Keeps the most recent runs per agent in memory and summarizes them.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    samples: Mutex<HashMap<String, VecDeque<Sample>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, agent_id: &str) -> Option<AgentMetricsSummary> {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let runs = samples.get(agent_id).filter(|r| !r.is_empty())?;

        let total = runs.len();
        let successful = runs.iter().filter(|s| s.status == AgentStatus::Completed).count();
        let failed = runs.iter().filter(|s| s.status == AgentStatus::Failed).count();
        let week_ago = Utc::now() - Duration::days(7);

        let mut tool_calls = BTreeMap::new();
        for name in runs.iter().flat_map(|s| s.tools.iter()) {
            *tool_calls.entry(name.clone()).or_insert(0) += 1;
        }

        Some(AgentMetricsSummary {
            agent_id: agent_id.to_string(),
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate: successful as f64 / total as f64,
            average_duration_ms: runs.iter().map(|s| s.duration_ms as f64).sum::<f64>()
                / total as f64,
            total_tokens: runs.iter().map(|s| s.total_tokens).sum(),
            last_7_days_executions: runs.iter().filter(|s| s.timestamp >= week_ago).count(),
            last_execution: runs.back().map(|s| s.timestamp),
            tool_calls,
        })
    }

    pub fn system(&self) -> SystemMetricsSummary {
        let guard = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let samples = &*guard;
        let all = || samples.values().flat_map(|r| r.iter());

        let total = all().count();
        let successful = all().filter(|s| s.status == AgentStatus::Completed).count();
        let failed = all().filter(|s| s.status == AgentStatus::Failed).count();

        SystemMetricsSummary {
            total_agents: samples.len(),
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_execution(&self, result: &ExecutionResult) {
        let sample = Sample {
            timestamp: result.started_at,
            status: result.status,
            duration_ms: result.duration_ms,
            total_tokens: result.token_usage.total(),
            tools: result.tool_calls.iter().map(|c| c.tool_name.clone()).collect(),
        };

        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let runs = samples.entry(result.agent_id.clone()).or_default();
        runs.push_back(sample);
        while runs.len() > MAX_SAMPLES_PER_AGENT {
            runs.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolCallRecord;
    use crate::traits::TokenUsage;

    fn result(agent: &str, status: AgentStatus, duration_ms: u64, tools: &[&str]) -> ExecutionResult {
        ExecutionResult {
            agent_id: agent.to_string(),
            session_id: "s".to_string(),
            response: String::new(),
            status,
            started_at: Utc::now(),
            duration_ms,
            tool_calls: tools
                .iter()
                .map(|t| ToolCallRecord {
                    call_id: "c".into(),
                    tool_name: t.to_string(),
                    arguments: serde_json::json!({}),
                    result: String::new(),
                    is_error: false,
                    timestamp: Utc::now(),
                })
                .collect(),
            iteration_count: 1,
            truncated: false,
            token_usage: TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 3,
            },
            messages: vec![],
            error: None,
            failure: None,
        }
    }

    #[test]
    fn summarizes_per_agent() {
        let metrics = InMemoryMetrics::new();
        metrics.record_execution(&result("a", AgentStatus::Completed, 100, &["calculate"]));
        metrics.record_execution(&result(
            "a",
            AgentStatus::Failed,
            300,
            &["calculate", "web_search"],
        ));

        let summary = metrics.summary("a").unwrap();
        assert_eq!(summary.total_executions, 2);
        assert_eq!(summary.successful_executions, 1);
        assert_eq!(summary.failed_executions, 1);
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.average_duration_ms, 200.0);
        assert_eq!(summary.total_tokens, 20);
        assert_eq!(summary.last_7_days_executions, 2);
        assert_eq!(summary.tool_calls.get("calculate"), Some(&2));
        assert_eq!(summary.tool_calls.get("web_search"), Some(&1));
        assert!(metrics.summary("b").is_none());
    }

    #[test]
    fn system_summary_spans_agents() {
        let metrics = InMemoryMetrics::new();
        assert_eq!(metrics.system().success_rate, 0.0);

        metrics.record_execution(&result("a", AgentStatus::Completed, 1, &[]));
        metrics.record_execution(&result("b", AgentStatus::Completed, 1, &[]));
        metrics.record_execution(&result("b", AgentStatus::Failed, 1, &[]));

        let system = metrics.system();
        assert_eq!(system.total_agents, 2);
        assert_eq!(system.total_executions, 3);
        assert_eq!(system.failed_executions, 1);
    }

    #[test]
    fn keeps_a_bounded_history() {
        let metrics = InMemoryMetrics::new();
        for _ in 0..(MAX_SAMPLES_PER_AGENT + 5) {
            metrics.record_execution(&result("a", AgentStatus::Completed, 1, &[]));
        }
        assert_eq!(metrics.summary("a").unwrap().total_executions, MAX_SAMPLES_PER_AGENT);
    }
}
