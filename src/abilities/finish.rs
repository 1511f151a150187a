//! Finish 能力：模型用它声明任务已完成，返回完成原因

use async_trait::async_trait;
use serde_json::Value;

use crate::abilities::{Ability, AbilityArgs, AbilityParameter, ParamKind};

pub struct FinishAbility;

#[async_trait]
impl Ability for FinishAbility {
    fn name(&self) -> &str {
        "Finish"
    }

    fn description(&self) -> &str {
        "Declare the task finished; use together with last_step = true"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![AbilityParameter::optional(
            "reason",
            ParamKind::String,
            "short summary of why the task is complete",
        )]
    }

    async fn execute(&self, task_id: &str, args: AbilityArgs) -> Result<Value, String> {
        let reason = args
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        tracing::info!(task_id = %task_id, reason = %reason, "finish requested");
        Ok(Value::String(reason))
    }
}
