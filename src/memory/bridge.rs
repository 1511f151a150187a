//! 记忆桥：编排器与长期记忆后端之间的容错层
//!
//! record / recall 的任何后端失败都只记录日志：record 跳过，recall 退化为空序列。

use std::sync::Arc;

use crate::core::AgentError;
use crate::memory::{MemoryBackend, Metadata, Role};

#[derive(Clone)]
pub struct MemoryBridge {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryBridge {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn enabled(&self) -> bool {
        self.backend.enabled()
    }

    /// 写入一条记录；失败时返回 false
    pub async fn record(&self, task_id: &str, document: &str, role: Role) -> bool {
        let metadata = Metadata::from([("role".to_string(), role.as_str().to_string())]);
        match self.backend.add(task_id, document, metadata).await {
            Ok(()) => true,
            Err(e) => {
                let err = AgentError::MemoryBackend(e);
                tracing::warn!(task_id = %task_id, "memory record skipped: {}", err);
                false
            }
        }
    }

    /// 召回与 query 相关、角色为 role_filter 的文档（最相关在前，最多 top_k 条）
    pub async fn recall(
        &self,
        task_id: &str,
        query: &str,
        role_filter: Role,
        top_k: usize,
    ) -> Vec<String> {
        if top_k == 0 {
            return Vec::new();
        }
        let filters = Metadata::from([("role".to_string(), role_filter.as_str().to_string())]);
        match self.backend.query(task_id, query, &filters, top_k).await {
            Ok(result) => result
                .documents
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .filter(|d| !d.trim().is_empty())
                .take(top_k)
                .collect(),
            Err(e) => {
                let err = AgentError::MemoryBackend(e);
                tracing::warn!(task_id = %task_id, "no related memory found: {}", err);
                Vec::new()
            }
        }
    }
}
