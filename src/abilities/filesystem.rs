//! 任务沙箱文件系统与文件能力
//!
//! Workspace 绑定根目录，每个任务使用 `<root>/<task_id>/`；路径只允许普通组件（禁止绝对路径与 ../ 逃逸）。
//! 读写前再按真实路径（canonicalize）复核一次，经符号链接指向任务目录之外的路径同样拒绝。
//! WriteFile / ReadFile / ListFiles 基于 Workspace 提供文件读写能力。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::abilities::{Ability, AbilityArgs, AbilityParameter, ParamKind};
use crate::core::AgentError;

/// 任务级沙箱文件系统
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// 解析任务内相对路径，拒绝逃逸
    pub fn file_path(&self, task_id: &str, path: &str) -> Result<PathBuf, AgentError> {
        let task_dir = self.task_dir(task_id)?;
        let relative = Path::new(path);
        let mut resolved = task_dir;
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(AgentError::PathEscape(path.to_string())),
            }
        }
        Ok(resolved)
    }

    pub fn task_dir(&self, task_id: &str) -> Result<PathBuf, AgentError> {
        let mut components = Path::new(task_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(task_id)),
            _ => Err(AgentError::PathEscape(task_id.to_string())),
        }
    }

    /// 解析路径并按真实路径复核：最近的已存在祖先必须位于任务目录之内
    pub async fn resolve(&self, task_id: &str, path: &str) -> Result<PathBuf, AgentError> {
        let task_dir = self.task_dir(task_id)?;
        let full = self.file_path(task_id, path)?;
        let real_task_dir = match tokio::fs::canonicalize(&task_dir).await {
            Ok(dir) => dir,
            // 任务目录尚不存在，其下也不可能有符号链接
            Err(_) => return Ok(full),
        };

        let mut existing = full.as_path();
        // symlink_metadata 不跟随链接：悬空链接也算已存在，随后 canonicalize 失败即拒绝
        while tokio::fs::symlink_metadata(existing).await.is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let real = tokio::fs::canonicalize(existing)
            .await
            .map_err(|e| AgentError::AbilityFailed(format!("Resolve failed: {}", e)))?;
        if real.starts_with(&real_task_dir) {
            Ok(full)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub async fn write(&self, task_id: &str, path: &str, content: &str) -> Result<PathBuf, AgentError> {
        let full = self.resolve(task_id, path).await?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::AbilityFailed(format!("Create dir failed: {}", e)))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| AgentError::AbilityFailed(format!("Write failed: {}", e)))?;
        Ok(full)
    }

    pub async fn read(&self, task_id: &str, path: &str) -> Result<String, AgentError> {
        let full = self.resolve(task_id, path).await?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| AgentError::AbilityFailed(format!("Read failed: {}", e)))
    }

    pub async fn list(&self, task_id: &str, path: &str) -> Result<Vec<String>, AgentError> {
        let base = self.resolve(task_id, path).await?;
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut dir = tokio::fs::read_dir(&base)
            .await
            .map_err(|e| AgentError::AbilityFailed(format!("List failed: {}", e)))?;
        let mut entries = Vec::new();
        while let Some(e) = dir
            .next_entry()
            .await
            .map_err(|e| AgentError::AbilityFailed(e.to_string()))?
        {
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = e.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(entries)
    }
}

fn str_arg<'a>(args: &'a AbilityArgs, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// WriteFile：写入（覆盖）任务工作区中的文件
pub struct WriteFileAbility {
    workspace: Workspace,
}

impl WriteFileAbility {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Ability for WriteFileAbility {
    fn name(&self) -> &str {
        "WriteFile"
    }

    fn description(&self) -> &str {
        "Write text to a file in the task workspace, replacing any existing content"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![
            AbilityParameter::required("filename", ParamKind::String, "file path relative to the workspace"),
            AbilityParameter::required("content", ParamKind::String, "text to write"),
        ]
    }

    async fn execute(&self, task_id: &str, args: AbilityArgs) -> Result<Value, String> {
        let filename = str_arg(&args, "filename");
        let content = str_arg(&args, "content");
        tracing::info!(task_id = %task_id, filename = %filename, bytes = content.len(), "write file");
        self.workspace
            .write(task_id, filename, content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Value::String(format!("Written to {}", filename)))
    }
}

/// ReadFile：读取任务工作区中的文件
pub struct ReadFileAbility {
    workspace: Workspace,
}

impl ReadFileAbility {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Ability for ReadFileAbility {
    fn name(&self) -> &str {
        "ReadFile"
    }

    fn description(&self) -> &str {
        "Read the text content of a file in the task workspace"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![AbilityParameter::required(
            "filename",
            ParamKind::String,
            "file path relative to the workspace",
        )]
    }

    async fn execute(&self, task_id: &str, args: AbilityArgs) -> Result<Value, String> {
        let filename = str_arg(&args, "filename");
        tracing::info!(task_id = %task_id, filename = %filename, "read file");
        let data = self
            .workspace
            .read(task_id, filename)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Value::String(data))
    }
}

/// ListFiles：列出任务工作区目录
pub struct ListFilesAbility {
    workspace: Workspace,
}

impl ListFilesAbility {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Ability for ListFilesAbility {
    fn name(&self) -> &str {
        "ListFiles"
    }

    fn description(&self) -> &str {
        "List files in a directory of the task workspace"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![AbilityParameter::optional(
            "path",
            ParamKind::String,
            "directory relative to the workspace, default '.'",
        )]
    }

    async fn execute(&self, task_id: &str, args: AbilityArgs) -> Result<Value, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let entries = self
            .workspace
            .list(task_id, path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Value::String(entries.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> AbilityArgs {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let out = WriteFileAbility::new(ws.clone())
            .execute("t1", args(json!({"filename": "output.txt", "content": "Washington"})))
            .await
            .unwrap();
        assert_eq!(out, json!("Written to output.txt"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("t1").join("output.txt")).unwrap(),
            "Washington"
        );

        let read = ReadFileAbility::new(ws)
            .execute("t1", args(json!({"filename": "output.txt"})))
            .await
            .unwrap();
        assert_eq!(read, json!("Washington"));
    }

    #[tokio::test]
    async fn test_tasks_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write("a", "x.txt", "a").await.unwrap();
        assert!(ws.read("b", "x.txt").await.is_err());
    }

    #[test]
    fn test_path_escape_rejected() {
        let ws = Workspace::new("/tmp/ws");
        assert!(matches!(ws.file_path("t", "../other/x"), Err(AgentError::PathEscape(_))));
        assert!(matches!(ws.file_path("t", "/etc/passwd"), Err(AgentError::PathEscape(_))));
        assert!(matches!(ws.task_dir("../t"), Err(AgentError::PathEscape(_))));
        assert!(matches!(ws.task_dir(""), Err(AgentError::PathEscape(_))));
        assert_eq!(
            ws.file_path("t", "./sub/x.txt").unwrap(),
            PathBuf::from("/tmp/ws/t/sub/x.txt")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let ws = Workspace::new(dir.path());
        ws.write("t", "keep.txt", "k").await.unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("t").join("link")).unwrap();

        assert!(matches!(ws.read("t", "link/secret.txt").await, Err(AgentError::PathEscape(_))));
        assert!(matches!(ws.write("t", "link/new.txt", "x").await, Err(AgentError::PathEscape(_))));
        assert!(matches!(ws.list("t", "link").await, Err(AgentError::PathEscape(_))));
        assert!(!outside.path().join("new.txt").exists());
        assert_eq!(ws.read("t", "keep.txt").await.unwrap(), "k");
    }

    #[tokio::test]
    async fn test_list_files() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write("t", "b.txt", "").await.unwrap();
        ws.write("t", "sub/a.txt", "").await.unwrap();
        let out = ListFilesAbility::new(ws.clone())
            .execute("t", AbilityArgs::new())
            .await
            .unwrap();
        assert_eq!(out, json!("b.txt\nsub/"));
        assert_eq!(ws.list("empty", ".").await.unwrap(), Vec::<String>::new());
    }
}
