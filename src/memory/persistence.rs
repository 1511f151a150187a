//! 对话归档持久化
//!
//! 任务完成后把归档的对话写入 `<dir>/<task_id>.json`，也可重新加载。

use std::path::{Path, PathBuf};

use crate::memory::Message;

/// 简单的文件持久化：每个任务一个 JSON 文件
#[derive(Debug, Clone)]
pub struct ConversationPersistence {
    dir: PathBuf,
}

impl ConversationPersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    /// 从 JSON 文件加载对话；文件不存在时返回空 Vec
    pub fn load(&self, task_id: &str) -> anyhow::Result<Vec<Message>> {
        let path = self.path_for(task_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 写入 JSON 文件；目录不存在时自动创建
    pub fn save(&self, task_id: &str, messages: &[Message]) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(task_id);
        std::fs::write(&path, serde_json::to_string_pretty(messages)?)?;
        Ok(path)
    }
}
