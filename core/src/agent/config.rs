use crate::error::{Error, ValidationError};
use crate::providers::catalog;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

pub const MIN_ITERATIONS: usize = 1;
pub const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAI,
    Bedrock,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Bedrock => "bedrock",
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "bedrock" => Ok(Self::Bedrock),
            other => Err(ValidationError::UnsupportedProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

fn default_temperature() -> f64 {
    0.7
}

impl ModelConfig {
    pub fn new(provider: ModelProvider, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            model_name: model_name.into(),
            temperature: default_temperature(),
            max_tokens: None,
            top_p: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sampling bounds plus membership in the supported-model table.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::OutOfRange {
                field: "temperature",
                value: self.temperature.to_string(),
                range: "[0, 2]",
            });
        }
        if let Some(top_p) = self.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            return Err(ValidationError::OutOfRange {
                field: "top_p",
                value: top_p.to_string(),
                range: "[0, 1]",
            });
        }
        if self.max_tokens == Some(0) {
            return Err(ValidationError::OutOfRange {
                field: "max_tokens",
                value: "0".to_string(),
                range: ">= 1",
            });
        }
        catalog::validate_model(self.provider, &self.model_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Registered capability backing this tool. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            capability: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    pub fn capability_name(&self) -> &str {
        self.capability.as_deref().unwrap_or(&self.name)
    }

    /// JSON schema for the declared parameters, or `None` when the
    /// declaration leaves the schema to the capability.
    pub fn parameters_schema(&self) -> Option<serde_json::Value> {
        if self.parameters.is_empty() {
            return None;
        }

        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.parameters {
            let mut property = json!({
                "type": spec.param_type.as_str(),
                "description": spec.description,
            });
            if let Some(default) = &spec.default {
                property["default"] = default.clone();
            }
            properties.insert(name.clone(), property);
            if spec.required {
                required.push(name.clone());
            }
        }

        Some(json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_true")]
    pub memory_enabled: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_max_iterations() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            model,
            tools: Vec::new(),
            max_iterations: default_max_iterations(),
            memory_enabled: true,
            streaming: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_tool(mut self, tool: ToolDeclaration) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(ValidationError::OutOfRange {
                field: "max_iterations",
                value: self.max_iterations.to_string(),
                range: "[1, 100]",
            });
        }

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(ValidationError::DuplicateTool(tool.name.clone()));
            }
        }

        self.model.validate()
    }

    /// Load a config file, picking the format from the extension
    /// (`.toml`, `.yaml`/`.yml`, anything else is read as JSON).
    pub fn from_path(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let config = match extension.as_deref() {
            Some("toml") => toml::from_str(&content).map_err(|e| parse_error("TOML", path, e))?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_error("YAML", path, e))?
            }
            _ => serde_json::from_str(&content).map_err(|e| parse_error("JSON", path, e))?,
        };

        Ok(config)
    }
}

fn parse_error(format: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Config(format!(
        "Failed to parse {} from {}: {}",
        format,
        path.display(),
        e
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base() -> AgentConfig {
        AgentConfig::new("helper", ModelConfig::new(ModelProvider::OpenAI, "gpt-4"))
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_iteration_budget_outside_bounds() {
        assert!(matches!(
            base().with_max_iterations(0).validate(),
            Err(ValidationError::OutOfRange { field: "max_iterations", .. })
        ));
        assert!(base().with_max_iterations(101).validate().is_err());
        assert!(base().with_max_iterations(100).validate().is_ok());
    }

    #[test]
    fn rejects_temperature_and_top_p_out_of_range() {
        let mut config = base();
        config.model.temperature = 2.5;
        assert!(config.validate().is_err());

        let mut config = base();
        config.model.top_p = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_tool_names() {
        let config = base()
            .with_tool(ToolDeclaration::new("calculate"))
            .with_tool(ToolDeclaration::new("calculate"));
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateTool("calculate".into()))
        );
    }

    #[test]
    fn rejects_unknown_model() {
        let config = AgentConfig::new("x", ModelConfig::new(ModelProvider::OpenAI, "gpt-9"));
        assert!(matches!(
            config.validate(),
            Err(ValidationError::UnsupportedModel { .. })
        ));
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ModelProvider>(), Ok(ModelProvider::OpenAI));
        assert!("azure".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn declaration_schema_marks_required_parameters() {
        let decl = ToolDeclaration::new("web_search")
            .with_parameter(
                "query",
                ParameterSpec {
                    param_type: ParamType::String,
                    description: "Search query".into(),
                    required: true,
                    default: None,
                },
            )
            .with_parameter(
                "num_results",
                ParameterSpec {
                    param_type: ParamType::Integer,
                    description: "How many".into(),
                    required: false,
                    default: Some(json!(5)),
                },
            );

        let schema = decl.parameters_schema().unwrap();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["num_results"]["default"], json!(5));
        assert!(ToolDeclaration::new("get_current_time").parameters_schema().is_none());
    }

    #[test]
    fn loads_toml_config_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
name = "calc"
instructions = "Use the calculator."

[model]
provider = "openai"
model_name = "gpt-3.5-turbo"

[[tools]]
name = "calculate"
"#,
        )
        .unwrap();

        let config = AgentConfig::from_path(&path).unwrap();
        assert_eq!(config.name, "calc");
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.model.temperature, 0.7);
        assert!(config.memory_enabled);
        assert!(!config.streaming);
        assert_eq!(config.tools[0].capability_name(), "calculate");
    }

    #[test]
    fn loads_yaml_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.yaml");
        std::fs::write(
            &path,
            "name: researcher\nmodel:\n  provider: bedrock\n  model_name: anthropic.claude-v2\nmax_iterations: 3\n",
        )
        .unwrap();

        let config = AgentConfig::from_path(&path).unwrap();
        assert_eq!(config.model.provider, ModelProvider::Bedrock);
        assert_eq!(config.max_iterations, 3);
    }

    #[test]
    fn unreadable_or_malformed_files_are_typed_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = AgentConfig::from_path(&tmp.path().join("none.json")).unwrap_err();
        assert!(matches!(missing, Error::Io(_)));

        let path = tmp.path().join("agent.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AgentConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("Failed to parse JSON")));
    }
}
