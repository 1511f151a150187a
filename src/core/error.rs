//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：可恢复错误只影响当前 Step（写入 Step 输出、is_last=false），
//! 不可恢复错误（持久化不可用、任务不存在、模板缺失）中止本次调用，但绝不影响其它任务。

use thiserror::Error;

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 持久化层创建任务失败，不会产生任何 Step
    #[error("Task creation failed: {0}")]
    TaskCreation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 专家画像推断失败（回退到通用 persona）
    #[error("Profile resolution failed: {0}")]
    ProfileResolution(String),

    #[error("Memory backend error: {0}")]
    MemoryBackend(String),

    /// 模型回复不是合法 JSON（Decode）或缺少必需字段（Shape）
    #[error("Malformed response: {detail}")]
    MalformedResponse { kind: MalformedKind, detail: String },

    #[error("Unknown ability: {0}")]
    UnknownAbility(String),

    #[error("Invalid arguments for {ability}: {reason}")]
    InvalidArguments { ability: String, reason: String },

    #[error("Ability execution failed: {0}")]
    AbilityFailed(String),

    #[error("Ability timeout: {0}")]
    AbilityTimeout(String),

    #[error("Model timeout after {0}s")]
    ModelTimeout(u64),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),
}

impl AgentError {
    /// 是否为 Step 级可恢复错误（Step 以失败输出完成，任务保持打开）
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AgentError::TaskCreation(_)
                | AgentError::TaskNotFound(_)
                | AgentError::Persistence(_)
                | AgentError::Prompt(_)
                | AgentError::Config(_)
        )
    }
}

/// 回复格式错误的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// 无法解码为 JSON 对象
    Decode,
    /// JSON 合法但不符合回复格式
    Shape,
}

impl AgentError {
    pub fn malformed(kind: MalformedKind, detail: impl Into<String>) -> Self {
        AgentError::MalformedResponse {
            kind,
            detail: detail.into(),
        }
    }
}

/// 截断到 max_chars 个字符，超出部分以 "..." 结尾
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 把失败描述写入 Step 输出，Step 照常结束（is_last=false）
    ReportToStep(String),
    /// 中止本次调用，错误返回给调用方
    Abort,
}
