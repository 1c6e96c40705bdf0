use crate::agent::{AgentConfig, ContextBuilder};
use crate::error::{Error, Result};
use crate::providers::{ModelGateway, ProviderFactory};
use crate::tools::ToolRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

pub type AgentId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a stored agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    pub config: AgentConfig,
    pub tools: Vec<String>,
    pub system_instruction: String,
    pub status: AgentStatus,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RunTracking {
    status: AgentStatus,
    execution_count: u64,
    last_executed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// A built agent. Everything but the run-tracking fields is fixed at build
/// time; those sit behind the entry's own lock.
pub struct AgentEntry {
    pub id: AgentId,
    pub config: AgentConfig,
    pub tools: ToolRegistry,
    pub gateway: ModelGateway,
    pub system_instruction: String,
    pub created_at: DateTime<Utc>,
    tracking: Mutex<RunTracking>,
}

impl AgentEntry {
    fn tracking(&self) -> std::sync::MutexGuard<'_, RunTracking> {
        self.tracking.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> AgentStatus {
        self.tracking().status
    }

    pub(crate) fn mark_running(&self) {
        let mut tracking = self.tracking();
        tracking.status = AgentStatus::Running;
        tracking.updated_at = Utc::now();
    }

    pub(crate) fn mark_finished(&self, status: AgentStatus) {
        let now = Utc::now();
        let mut tracking = self.tracking();
        tracking.status = status;
        tracking.execution_count += 1;
        tracking.last_executed_at = Some(now);
        tracking.updated_at = now;
    }

    pub fn snapshot(&self) -> Agent {
        let tracking = self.tracking().clone();
        Agent {
            id: self.id.clone(),
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            config: self.config.clone(),
            tools: self.tools.get_specs().into_iter().map(|s| s.name).collect(),
            system_instruction: self.system_instruction.clone(),
            status: tracking.status,
            execution_count: tracking.execution_count,
            last_executed_at: tracking.last_executed_at,
            created_at: self.created_at,
            updated_at: tracking.updated_at,
        }
    }
}

/// In-memory table of built agents, shared by every run.
pub struct AgentRegistry {
    tools: Arc<ToolRegistry>,
    providers: Arc<dyn ProviderFactory>,
    agents: RwLock<HashMap<AgentId, Arc<AgentEntry>>>,
}

impl AgentRegistry {
    pub fn new(tools: Arc<ToolRegistry>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            tools,
            providers,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Validate a configuration, resolve its tools and store the agent.
    /// Nothing is stored when validation fails.
    pub fn build(&self, config: AgentConfig) -> Result<AgentId> {
        config.validate()?;

        let (tools, dropped) = self.tools.scoped(&config.tools);
        for name in &dropped {
            warn!(agent = %config.name, tool = %name, "Dropping tool with no registered capability");
        }

        let tool_names: Vec<String> = tools.get_specs().into_iter().map(|s| s.name).collect();
        let system_instruction = ContextBuilder::new(&config)
            .with_tool_names(tool_names.clone())
            .build_system_instruction();

        let gateway = ModelGateway::new(self.providers.create(&config.model), config.model.clone())
            .with_retry(self.providers.retry_policy())
            .with_streaming(config.streaming);

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let entry = AgentEntry {
            id: id.clone(),
            config,
            tools,
            gateway,
            system_instruction,
            created_at: now,
            tracking: Mutex::new(RunTracking {
                status: AgentStatus::Created,
                execution_count: 0,
                last_executed_at: None,
                updated_at: now,
            }),
        };

        info!(
            agent_id = %id,
            agent = %entry.config.name,
            provider = entry.config.model.provider.as_str(),
            model = %entry.config.model.model_name,
            tools = ?tool_names,
            "Built agent"
        );

        self.agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::new(entry));

        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Agent> {
        self.entry(id)
            .map(|entry| entry.snapshot())
            .ok_or_else(|| Error::NotFound {
                agent_id: id.to_string(),
            })
    }

    /// Shared handle for a run. The caller drops it when the run returns.
    pub(crate) fn entry(&self, id: &str) -> Option<Arc<AgentEntry>> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// All agents, oldest first.
    pub fn list(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self
            .agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|entry| entry.snapshot())
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        agents
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self
            .agents
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            info!(agent_id = %id, "Deleted agent");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelConfig, ModelProvider, ToolDeclaration};
    use crate::error::ValidationError;
    use crate::providers::{ScriptedProvider, ScriptedProviderFactory};

    fn registry() -> (AgentRegistry, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let tools = Arc::new(ToolRegistry::with_builtins(tmp.path()));
        let factory = Arc::new(ScriptedProviderFactory::new(Arc::new(ScriptedProvider::new())));
        (AgentRegistry::new(tools, factory), tmp)
    }

    fn config() -> AgentConfig {
        AgentConfig::new("calc", ModelConfig::new(ModelProvider::OpenAI, "gpt-4"))
            .with_tool(ToolDeclaration::new("calculate"))
    }

    #[test]
    fn build_then_get() {
        let (registry, _tmp) = registry();
        let id = registry.build(config()).unwrap();

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.name, "calc");
        assert_eq!(agent.status, AgentStatus::Created);
        assert_eq!(agent.execution_count, 0);
        assert_eq!(agent.tools, vec!["calculate".to_string()]);
        assert!(agent.system_instruction.contains("following tools: calculate"));
    }

    #[test]
    fn unsupported_model_is_rejected_and_not_stored() {
        let (registry, _tmp) = registry();
        let config = AgentConfig::new("bad", ModelConfig::new(ModelProvider::OpenAI, "gpt-9"));

        let err = registry.build(config).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnsupportedModel { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_tools_are_dropped_not_fatal() {
        let (registry, _tmp) = registry();
        let id = registry
            .build(config().with_tool(ToolDeclaration::new("teleport")))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().tools, vec!["calculate".to_string()]);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let (registry, _tmp) = registry();
        assert!(matches!(
            registry.get("missing"),
            Err(Error::NotFound { agent_id }) if agent_id == "missing"
        ));
    }

    #[test]
    fn delete_removes_entry_once() {
        let (registry, _tmp) = registry();
        let id = registry.build(config()).unwrap();
        assert!(registry.delete(&id));
        assert!(!registry.delete(&id));
        assert!(registry.get(&id).is_err());
    }

    #[test]
    fn list_returns_every_agent() {
        let (registry, _tmp) = registry();
        let a = registry.build(config()).unwrap();
        let b = registry.build(config()).unwrap();
        let ids: Vec<String> = registry.list().into_iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[test]
    fn finishing_a_run_updates_tracking() {
        let (registry, _tmp) = registry();
        let id = registry.build(config()).unwrap();
        let entry = registry.entry(&id).unwrap();

        entry.mark_running();
        assert_eq!(entry.status(), AgentStatus::Running);
        entry.mark_finished(AgentStatus::Failed);

        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.status, AgentStatus::Failed);
        assert_eq!(agent.execution_count, 1);
        assert!(agent.last_executed_at.is_some());
    }
}
