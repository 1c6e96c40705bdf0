use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("agent {agent_id} not found")]
    NotFound { agent_id: String },

    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] ModelInvocationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected agent configuration. Raised at build time only; a stored agent
/// has always passed these checks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported model '{model}' for provider '{provider}'. Supported models: {}", supported.join(", "))]
    UnsupportedModel {
        provider: String,
        model: String,
        supported: Vec<String>,
    },

    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: &'static str,
    },

    #[error("agent name must not be empty")]
    EmptyName,

    #[error("tool '{0}' is declared more than once")]
    DuplicateTool(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelInvocationError {
    #[error("{provider} API error {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("missing credentials: {0}")]
    Credentials(String),

    #[error("{0}")]
    Provider(String),
}

impl ModelInvocationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Network(_) | Self::Timeout => true,
            Self::Malformed(_) | Self::Credentials(_) | Self::Provider(_) => false,
        }
    }
}

impl From<reqwest::Error> for ModelInvocationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Failure of a single tool call. Never ends a run: the engine folds the
/// message into a tool-result turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolExecutionError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}
