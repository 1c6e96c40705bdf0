use crate::agent::AgentConfig;
use crate::conversation::RunState;
use std::fmt::Write;

const GUIDELINES: &[&str] = &[
    "Follow the instructions carefully",
    "Use tools when appropriate to help answer questions",
    "Provide clear and helpful responses",
    "If you need to use a tool, call it and wait for the result before continuing",
];

/// Renders the text the model sees ahead of the conversation: the agent's
/// fixed system instruction, plus a per-run runtime section.
pub struct ContextBuilder<'a> {
    config: &'a AgentConfig,
    tool_names: Vec<String>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(config: &'a AgentConfig) -> Self {
        Self {
            config,
            tool_names: vec![],
        }
    }

    pub fn with_tool_names(mut self, tool_names: Vec<String>) -> Self {
        self.tool_names = tool_names;
        self
    }

    /// Rendered once when the agent is built.
    pub fn build_system_instruction(&self) -> String {
        let config = self.config;
        let mut out = format!("You are {}. {}", config.name, config.description)
            .trim_end()
            .to_string();
        out.push_str("\n\n");

        if !config.instructions.trim().is_empty() {
            out.push_str(config.instructions.trim());
            out.push_str("\n\n");
        }

        let tools = if self.tool_names.is_empty() {
            "No tools available".to_string()
        } else {
            self.tool_names.join(", ")
        };
        let _ = writeln!(out, "You have access to the following tools: {}", tools);

        out.push_str("\nImportant guidelines:\n");
        for line in GUIDELINES {
            let _ = writeln!(out, "- {}", line);
        }
        let _ = writeln!(out, "- Maximum iterations allowed: {}", config.max_iterations);

        out
    }
}

/// Per-run section appended to the system instruction.
pub fn runtime_context(state: &RunState) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");

    let mut out = format!(
        "## Runtime Context\n\n### Current Time\n{}\n\n### Session\n{}",
        timestamp, state.session_id
    );

    if !state.context.is_empty() {
        out.push_str("\n\n### Caller Context\n");
        for (key, value) in &state.context {
            match value {
                serde_json::Value::String(s) => {
                    let _ = writeln!(out, "- {}: {}", key, s);
                }
                other => {
                    let _ = writeln!(out, "- {}: {}", key, other);
                }
            }
        }
    }

    out
}

pub fn build_system_prompt(system_instruction: &str, state: &RunState) -> String {
    format!(
        "{}\n\n---\n\n{}",
        system_instruction.trim_end(),
        runtime_context(state)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelConfig, ModelProvider};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn config() -> AgentConfig {
        AgentConfig::new("Math Tutor", ModelConfig::new(ModelProvider::OpenAI, "gpt-4"))
            .with_description("Helps with arithmetic.")
            .with_instructions("Show your work.")
            .with_max_iterations(4)
    }

    #[test]
    fn instruction_interpolates_config() {
        let config = config();
        let text = ContextBuilder::new(&config)
            .with_tool_names(vec!["calculate".into(), "get_current_time".into()])
            .build_system_instruction();

        assert!(text.starts_with("You are Math Tutor. Helps with arithmetic."));
        assert!(text.contains("Show your work."));
        assert!(text.contains("following tools: calculate, get_current_time"));
        assert!(text.contains("- Maximum iterations allowed: 4"));
    }

    #[test]
    fn instruction_without_tools() {
        let config = config();
        let text = ContextBuilder::new(&config).build_system_instruction();
        assert!(text.contains("following tools: No tools available"));
    }

    #[test]
    fn runtime_section_lists_session_and_context() {
        let mut context = BTreeMap::new();
        context.insert("user".to_string(), json!("ada"));
        context.insert("tier".to_string(), json!(2));
        let state = RunState::new("hi", Some("sess-1".into()), context);

        let prompt = build_system_prompt("You are X.", &state);
        assert!(prompt.starts_with("You are X.\n\n---\n\n## Runtime Context"));
        assert!(prompt.contains("### Session\nsess-1"));
        assert!(prompt.contains("- tier: 2"));
        assert!(prompt.contains("- user: ada"));
    }
}
