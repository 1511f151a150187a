//! 对话存储：按任务划分的有序消息日志
//!
//! append 时去重（role + content + function_name 完全相同则忽略），读取时不再处理；
//! 未知任务返回空序列。任务结束时 take 把对话移出活跃表；未写盘的对话用 keep_archived 留在内存归档中，
//! 由调用方 take_archived 取走。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// 单条消息；function 角色携带 function_name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            function_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            function_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            function_name: None,
        }
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            function_name: Some(name.into()),
        }
    }
}

type Conversations = HashMap<String, Vec<Message>>;

/// 对话存储：首次 append 时创建，任务完成时归档
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    active: Arc<RwLock<Conversations>>,
    archived: Arc<RwLock<Conversations>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加消息；已存在结构相同的消息时返回 false
    pub fn append(&self, task_id: &str, message: Message) -> bool {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let conversation = active.entry(task_id.to_string()).or_default();
        if conversation.contains(&message) {
            return false;
        }
        conversation.push(message);
        true
    }

    /// 任务的完整有序对话；未知任务返回空 Vec
    pub fn get(&self, task_id: &str) -> Vec<Message> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, task_id: &str) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 移出活跃表，返回该任务的对话
    pub fn take(&self, task_id: &str) -> Vec<Message> {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id)
            .unwrap_or_default()
    }

    /// 保留到内存归档（无磁盘归档或写盘失败时使用）
    pub fn keep_archived(&self, task_id: &str, messages: Vec<Message>) {
        self.archived
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string(), messages);
    }

    pub fn archived(&self, task_id: &str) -> Option<Vec<Message>> {
        self.archived
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// 取走内存归档，之后不再占用内存
    pub fn take_archived(&self, task_id: &str) -> Option<Vec<Message>> {
        self.archived
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id)
    }

    pub fn archived_count(&self) -> usize {
        self.archived
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
