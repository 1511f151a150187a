//! 能力执行器
//!
//! 持有 AbilityRegistry、单次调用超时与空结果占位文本；execute 先绑定参数再在超时内执行，
//! 结果转为展示文本；每次调用输出结构化审计日志（JSON）。没有重试逻辑。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::abilities::AbilityRegistry;
use crate::core::{preview, AgentError};

/// 能力执行器：对每次调用施加超时，并将结果映射为文本或 AgentError
pub struct AbilityExecutor {
    registry: AbilityRegistry,
    timeout: Duration,
    empty_placeholder: String,
}

impl AbilityExecutor {
    pub fn new(registry: AbilityRegistry, timeout_secs: u64, empty_placeholder: impl Into<String>) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            empty_placeholder: empty_placeholder.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    /// 执行指定能力：未知能力 / 参数错误 / 执行失败 / 超时均返回对应 AgentError；输出 JSON 审计日志
    pub async fn execute(&self, task_id: &str, name: &str, args: Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = preview(&args.to_string(), 200);

        let result = match self.registry.bind(name, args) {
            Ok((ability, args)) => match timeout(self.timeout, ability.execute(task_id, args)).await {
                Ok(Ok(value)) => Ok(render_result(&value, &self.empty_placeholder)),
                Ok(Err(e)) => Err(AgentError::AbilityFailed(format!("{name}: {e}"))),
                Err(_) => Err(AgentError::AbilityTimeout(name.to_string())),
            },
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::AbilityTimeout(_)) => "timeout",
            Err(AgentError::UnknownAbility(_)) | Err(AgentError::InvalidArguments { .. }) => {
                "rejected"
            }
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "ability_audit",
            "task_id": task_id,
            "ability": name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "ability");

        result
    }

    pub fn ability_names(&self) -> Vec<String> {
        self.registry.names()
    }
}

/// 能力结果转展示文本：字符串原样输出，空值（null、空串、空数组、空对象）输出占位文本，其它按 JSON 输出
pub fn render_result(value: &Value, empty_placeholder: &str) -> String {
    match value {
        Value::Null => empty_placeholder.to_string(),
        Value::String(s) if s.is_empty() => empty_placeholder.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(a) if a.is_empty() => empty_placeholder.to_string(),
        Value::Object(o) if o.is_empty() => empty_placeholder.to_string(),
        other => other.to_string(),
    }
}
