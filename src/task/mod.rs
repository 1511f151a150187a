//! 任务与 Step 数据模型，以及持久化协作方接口（TaskStore）

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use store::{InMemoryTaskStore, TaskStore};

/// 调用方提交的任务：创建后对引擎只读
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub input: String,
    pub additional_input: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Step 状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Created,
    Running,
    Completed,
    Failed,
}

/// 一次执行周期的记录；output / is_last 在周期结束时一次性写入
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub task_id: String,
    pub input: Option<String>,
    pub additional_input: Option<Value>,
    pub output: Option<String>,
    pub is_last: bool,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
}

/// 创建任务请求
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    pub input: String,
    #[serde(default)]
    pub additional_input: Option<Value>,
}

impl TaskRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            additional_input: None,
        }
    }
}

/// 执行 Step 请求
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub additional_input: Option<Value>,
}

/// update_step 的变更内容
#[derive(Clone, Debug, PartialEq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub output: Option<String>,
    pub is_last: Option<bool>,
}

impl StepUpdate {
    pub fn status(status: StepStatus) -> Self {
        Self {
            status,
            output: None,
            is_last: None,
        }
    }
}
