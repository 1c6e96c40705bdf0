use crate::agent::ToolDeclaration;
use crate::error::ToolExecutionError;
use crate::tools::validation::{parse_arguments, validate_arguments};
use crate::traits::{Tool, ToolSpec};
use std::sync::{Arc, RwLock};

#[derive(Clone)]
struct RegisteredTool {
    spec: ToolSpec,
    capability: Arc<dyn Tool>,
    builtin: bool,
}

/// Name → capability table. Built once at startup; agents get their own
/// scoped copy at build time holding only the tools they declared.
pub struct ToolRegistry {
    tools: RwLock<Vec<RegisteredTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Registry preloaded with the built-in capability set.
    pub fn with_builtins(workspace: impl AsRef<std::path::Path>) -> Self {
        let registry = Self::new();
        for tool in crate::tools::builtin_tools(workspace) {
            registry.insert(tool.spec(), tool, true);
        }
        registry
    }

    /// Add a custom capability. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.insert(tool.spec(), tool, false);
    }

    fn insert(&self, spec: ToolSpec, capability: Arc<dyn Tool>, builtin: bool) {
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        let entry = RegisteredTool {
            spec,
            capability,
            builtin,
        };
        match tools.iter_mut().find(|t| t.spec.name == entry.spec.name) {
            Some(existing) => *existing = entry,
            None => tools.push(entry),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.find(name).map(|t| t.capability)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn find(&self, name: &str) -> Option<RegisteredTool> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools.iter().find(|t| t.spec.name == name).cloned()
    }

    /// Built-in tools in registration order.
    pub fn list_available(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools
            .iter()
            .filter(|t| t.builtin)
            .map(|t| t.spec.clone())
            .collect()
    }

    /// Every registered tool, as exposed to the model.
    pub fn get_specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve an agent's declarations into a registry of its own.
    ///
    /// Declarations naming an unknown capability are left out and returned in
    /// the second element so the caller can warn about them.
    pub fn scoped(&self, declarations: &[ToolDeclaration]) -> (ToolRegistry, Vec<String>) {
        let scoped = ToolRegistry::new();
        let mut dropped = Vec::new();

        for decl in declarations {
            let Some(registered) = self.find(decl.capability_name()) else {
                dropped.push(decl.name.clone());
                continue;
            };

            let description = if decl.description.trim().is_empty() {
                registered.spec.description.clone()
            } else {
                decl.description.clone()
            };
            let spec = ToolSpec {
                name: decl.name.clone(),
                description,
                parameters_schema: decl
                    .parameters_schema()
                    .unwrap_or_else(|| registered.spec.parameters_schema.clone()),
            };
            scoped.insert(spec, registered.capability, registered.builtin);
        }

        (scoped, dropped)
    }

    /// Decode the raw argument text of a call against the tool's schema.
    pub fn prepare_arguments(
        &self,
        name: &str,
        raw: &str,
    ) -> Result<serde_json::Value, ToolExecutionError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolExecutionError::NotFound(name.to_string()))?;

        parse_arguments(raw, &tool.spec.parameters_schema).map_err(|reason| {
            ToolExecutionError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })
    }

    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<String, ToolExecutionError> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolExecutionError::NotFound(name.to_string()))?;

        validate_arguments(&args, &tool.spec.parameters_schema).map_err(|reason| {
            ToolExecutionError::InvalidArguments {
                tool: name.to_string(),
                reason,
            }
        })?;

        match tool.capability.execute(args).await {
            Ok(result) if result.success => Ok(result.output),
            Ok(result) => Err(ToolExecutionError::Failed {
                tool: name.to_string(),
                message: result
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            Err(e) => Err(ToolExecutionError::Failed {
                tool: name.to_string(),
                message: format!("Execution failed: {}", e),
            }),
        }
    }
}
