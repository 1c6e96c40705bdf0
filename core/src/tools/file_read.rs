use crate::tools::{extract_string_arg, resolve_path};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;

pub struct FileReadTool {
    workspace: std::path::PathBuf,
}

impl FileReadTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read content from a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let path = extract_string_arg(&args, "file_path")?;
        let full_path = resolve_path(&self.workspace, &path);

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) => Ok(ToolResult::error(format!("Error reading file: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let result = FileReadTool::new(tmp.path())
            .execute(json!({ "file_path": "nope.txt" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Error reading file"));
    }

    #[tokio::test]
    async fn reads_absolute_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("abs.txt");
        std::fs::write(&path, "absolute").unwrap();

        let result = FileReadTool::new("/nonexistent-workspace")
            .execute(json!({ "file_path": path.to_str().unwrap() }))
            .await
            .unwrap();
        assert_eq!(result.output, "absolute");
    }
}
