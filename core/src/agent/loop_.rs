use crate::agent::context::build_system_prompt;
use crate::agent::registry::{AgentEntry, AgentRegistry, AgentStatus};
use crate::agent::{ExecutionResult, FailureKind};
use crate::conversation::{ConversationTurn, RunState, ToolCallRecord};
use crate::error::ModelInvocationError;
use crate::traits::{MetricsSink, ToolCall};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const NO_RESPONSE: &str = "No response generated";

enum Outcome {
    Answered(String),
    BudgetExhausted(String),
    ModelFailed(ModelInvocationError),
}

/// Drives one run of an agent: model call, tool calls, repeat, until the
/// model answers without requesting tools, fails, or the budget runs out.
pub struct AgentLoop {
    registry: Arc<AgentRegistry>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl AgentLoop {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Run an agent against one input message. Always returns a result;
    /// failures are reported through its status.
    pub async fn execute(
        &self,
        agent_id: &str,
        input: &str,
        session_id: Option<String>,
        context: BTreeMap<String, serde_json::Value>,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut state = RunState::new(input, session_id, context);

        let Some(agent) = self.registry.entry(agent_id) else {
            warn!(agent_id, "Execution requested for unknown agent");
            let message = format!("Agent {} not found", agent_id);
            return ExecutionResult {
                agent_id: agent_id.to_string(),
                session_id: state.session_id,
                response: format!("Error executing agent: {}", message),
                status: AgentStatus::Failed,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
                tool_calls: vec![],
                iteration_count: 0,
                truncated: false,
                token_usage: Default::default(),
                messages: state.turns,
                error: Some(message),
                failure: Some(FailureKind::AgentNotFound),
            };
        };

        agent.mark_running();
        info!(
            agent_id,
            session_id = %state.session_id,
            max_iterations = agent.config.max_iterations,
            "Starting agent run"
        );

        let outcome = self.run(&agent, &mut state).await;

        let (status, response, truncated, error, failure) = match outcome {
            Outcome::Answered(text) => (AgentStatus::Completed, text, false, None, None),
            Outcome::BudgetExhausted(text) => (AgentStatus::Completed, text, true, None, None),
            Outcome::ModelFailed(e) => (
                AgentStatus::Failed,
                format!("Error executing agent: {}", e),
                false,
                Some(e.to_string()),
                Some(FailureKind::ModelInvocation),
            ),
        };

        agent.mark_finished(status);
        let duration_ms = clock.elapsed().as_millis() as u64;

        info!(
            agent_id,
            session_id = %state.session_id,
            status = %status,
            iterations = state.iteration,
            tool_calls = state.tool_calls.len(),
            truncated,
            elapsed_ms = duration_ms,
            "Agent run finished"
        );

        let result = ExecutionResult {
            agent_id: agent_id.to_string(),
            session_id: state.session_id,
            response,
            status,
            started_at,
            duration_ms,
            tool_calls: state.tool_calls,
            iteration_count: state.iteration,
            truncated,
            token_usage: state.usage,
            messages: state.turns,
            error,
            failure,
        };

        if let Some(sink) = &self.metrics {
            sink.record_execution(&result);
        }

        result
    }

    async fn run(&self, agent: &AgentEntry, state: &mut RunState) -> Outcome {
        let specs = agent.tools.get_specs();
        // Without tools the model gets exactly one turn.
        let budget = if specs.is_empty() {
            1
        } else {
            agent.config.max_iterations
        };
        let system = build_system_prompt(&agent.system_instruction, state);

        while state.iteration < budget {
            debug!(
                agent_id = %agent.id,
                iteration = state.iteration + 1,
                turns = state.turns.len(),
                "Invoking model"
            );

            let reply = match agent.gateway.invoke(&system, &state.turns, &specs).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(agent_id = %agent.id, iteration = state.iteration + 1, error = %e, "Model invocation failed");
                    return Outcome::ModelFailed(e);
                }
            };
            state.usage.accumulate(&reply.usage);
            state.iteration += 1;

            if specs.is_empty() || reply.tool_calls.is_empty() {
                state
                    .turns
                    .push(ConversationTurn::assistant(reply.content.clone(), vec![]));
                return Outcome::Answered(reply.content);
            }

            let calls = reply.tool_calls;
            state
                .turns
                .push(ConversationTurn::assistant(reply.content, calls.clone()));

            for call in &calls {
                self.run_tool_call(agent, state, call).await;
            }
        }

        let last = state
            .last_assistant_content()
            .unwrap_or(NO_RESPONSE)
            .to_string();

        warn!(agent_id = %agent.id, budget, "Iteration budget exhausted");
        Outcome::BudgetExhausted(last)
    }

    async fn run_tool_call(&self, agent: &AgentEntry, state: &mut RunState, call: &ToolCall) {
        let started = Instant::now();

        let (arguments, result) = match agent.tools.prepare_arguments(&call.name, &call.arguments) {
            Ok(args) => (args.clone(), agent.tools.execute(&call.name, args).await),
            Err(e) => {
                let raw = serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()));
                (raw, Err(e))
            }
        };

        let (content, is_error) = match result {
            Ok(output) => (output, false),
            Err(e) => {
                warn!(agent_id = %agent.id, tool = %call.name, error = %e, "Tool call failed");
                (e.to_string(), true)
            }
        };

        debug!(
            agent_id = %agent.id,
            tool = %call.name,
            is_error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );

        state.turns.push(ConversationTurn::tool_result(
            call.id.clone(),
            call.name.clone(),
            content.clone(),
            is_error,
        ));
        state.tool_calls.push(ToolCallRecord {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments,
            result: content,
            is_error,
            timestamp: Utc::now(),
        });
    }
}
