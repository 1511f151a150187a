//! 长期记忆后端：按任务划分的文档存储与相似度检索
//!
//! add(task_id, document, metadata) 与 query(task_id, text, filters, n)；
//! 当前实现为 InMemoryMemoryBackend（关键词重叠），后续可接向量库。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

/// 记录元数据，至少包含 "role"
pub type Metadata = HashMap<String, String>;

/// 一次查询的结果：每个查询文本对应一组按相关度排序的文档
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<Vec<String>>,
}

/// 长期记忆后端 trait
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn add(&self, task_id: &str, document: &str, metadata: Metadata) -> Result<(), String>;

    /// 检索与 query 最相关的 n 条文档（仅限 metadata 满足 filters 的记录）
    async fn query(
        &self,
        task_id: &str,
        query: &str,
        filters: &Metadata,
        n_results: usize,
    ) -> Result<QueryResult, String>;

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopMemoryBackend;

#[async_trait]
impl MemoryBackend for NoopMemoryBackend {
    async fn add(&self, _task_id: &str, _document: &str, _metadata: Metadata) -> Result<(), String> {
        Ok(())
    }

    async fn query(
        &self,
        _task_id: &str,
        _query: &str,
        _filters: &Metadata,
        _n_results: usize,
    ) -> Result<QueryResult, String> {
        Ok(QueryResult::default())
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
struct StoredDocument {
    document: String,
    metadata: Metadata,
    tokens: HashSet<String>,
}

/// 简单内存实现：按关键词重叠检索（无真实向量）
#[derive(Clone)]
pub struct InMemoryMemoryBackend {
    store: Arc<RwLock<HashMap<String, Vec<StoredDocument>>>>,
    max_entries_per_task: usize,
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

impl InMemoryMemoryBackend {
    pub fn new(max_entries_per_task: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_task,
        }
    }

    pub fn len(&self, task_id: &str) -> usize {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InMemoryMemoryBackend {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl MemoryBackend for InMemoryMemoryBackend {
    async fn add(&self, task_id: &str, document: &str, metadata: Metadata) -> Result<(), String> {
        let document = document.trim();
        if document.is_empty() {
            return Ok(());
        }
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let docs = store.entry(task_id.to_string()).or_default();
        docs.push(StoredDocument {
            document: document.to_string(),
            tokens: tokenize_lower(document),
            metadata,
        });
        let n = docs.len();
        if n > self.max_entries_per_task {
            docs.drain(0..n - self.max_entries_per_task);
        }
        Ok(())
    }

    async fn query(
        &self,
        task_id: &str,
        query: &str,
        filters: &Metadata,
        n_results: usize,
    ) -> Result<QueryResult, String> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() || n_results == 0 {
            return Ok(QueryResult {
                documents: vec![Vec::new()],
            });
        }
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, &str)> = store
            .get(task_id)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filters.iter().all(|(k, v)| d.metadata.get(k) == Some(v)))
                    .map(|d| (query_tokens.intersection(&d.tokens).count(), d.document.as_str()))
                    .filter(|(score, _)| *score > 0)
                    .collect()
            })
            .unwrap_or_default();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        let ranked = scored
            .into_iter()
            .take(n_results)
            .map(|(_, d)| d.to_string())
            .collect();
        Ok(QueryResult {
            documents: vec![ranked],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(r: &str) -> Metadata {
        Metadata::from([("role".to_string(), r.to_string())])
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap_and_filters_role() {
        let backend = InMemoryMemoryBackend::default();
        backend.add("t", "write washington to a file", role("user")).await.unwrap();
        backend.add("t", "washington file written", role("assistant")).await.unwrap();
        backend.add("t", "unrelated weather", role("assistant")).await.unwrap();

        let res = backend
            .query("t", "washington file", &role("assistant"), 5)
            .await
            .unwrap();
        assert_eq!(res.documents, vec![vec!["washington file written".to_string()]]);
    }

    #[tokio::test]
    async fn test_tasks_are_partitioned() {
        let backend = InMemoryMemoryBackend::default();
        backend.add("a", "secret plan alpha", role("user")).await.unwrap();
        let res = backend.query("b", "secret plan", &Metadata::new(), 3).await.unwrap();
        assert!(res.documents[0].is_empty());
    }

    #[tokio::test]
    async fn test_max_entries_prunes_oldest() {
        let backend = InMemoryMemoryBackend::new(2);
        for doc in ["one apple", "two apple", "three apple"] {
            backend.add("t", doc, role("user")).await.unwrap();
        }
        assert_eq!(backend.len("t"), 2);
        let res = backend.query("t", "one", &Metadata::new(), 3).await.unwrap();
        assert!(res.documents[0].is_empty());
    }

    #[tokio::test]
    async fn test_noop_backend() {
        let backend = NoopMemoryBackend;
        assert!(!backend.enabled());
        backend.add("t", "x", Metadata::new()).await.unwrap();
        let res = backend.query("t", "x", &Metadata::new(), 1).await.unwrap();
        assert!(res.documents.is_empty());
    }
}
