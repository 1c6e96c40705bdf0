use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod calculate;
pub mod current_time;
pub mod file_read;
pub mod file_write;
pub mod http_request;
pub mod registry;
pub mod shell;
pub mod validation;
pub mod web_search;

pub use calculate::CalculateTool;
pub use current_time::CurrentTimeTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use http_request::HttpRequestTool;
pub use registry::ToolRegistry;
pub use shell::ShellTool;
pub use web_search::WebSearchTool;

use crate::traits::Tool;

/// The built-in capability set, in the order it is listed to callers.
pub fn builtin_tools(workspace: impl AsRef<Path>) -> Vec<Arc<dyn Tool>> {
    let workspace = workspace.as_ref();
    vec![
        Arc::new(CurrentTimeTool),
        Arc::new(CalculateTool),
        Arc::new(WebSearchTool),
        Arc::new(FileReadTool::new(workspace)),
        Arc::new(FileWriteTool::new(workspace)),
        Arc::new(ShellTool::new(workspace)),
        Arc::new(HttpRequestTool::new()),
    ]
}

pub fn extract_string_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))
        .map(|s| s.to_string())
}

pub fn extract_string_arg_opt(args: &Value, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

pub fn extract_usize_arg_opt(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Relative paths live under the workspace; absolute paths are used as given.
pub(crate) fn resolve_path(workspace: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}
