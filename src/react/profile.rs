//! 专家画像推断
//!
//! 任务创建时调用一次模型（profile-format 模板、低温度），把回复解析为 ExpertProfile。
//! 回复可以是 `{"name", "expertise"?, "role"?}` JSON，也可以是一行专家类型名称；空回复或无法解析返回 ProfileResolution。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::PersonaSection;
use crate::core::AgentError;
use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::prompt::{PromptEngine, PROFILE_FORMAT};
use crate::task::Task;

/// 纯文本标签的最大长度（字符）
const MAX_LABEL_CHARS: usize = 80;

/// 专家画像：提示词中的 persona
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub name: String,
    pub expertise: String,
    pub role: String,
}

impl From<&PersonaSection> for ExpertProfile {
    fn from(p: &PersonaSection) -> Self {
        Self {
            name: p.name.clone(),
            expertise: p.expertise.clone(),
            role: p.role.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ProfileReply {
    name: String,
    #[serde(default)]
    expertise: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// 画像推断器：持有 LLM、模板引擎、推断用模型参数与超时
pub struct ProfileResolver {
    llm: Arc<dyn LlmClient>,
    prompts: PromptEngine,
    options: CompletionOptions,
    timeout: Duration,
}

impl ProfileResolver {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: PromptEngine,
        options: CompletionOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            prompts,
            options,
            timeout,
        }
    }

    /// 为任务推断专家画像；任何失败都返回 ProfileResolution，由调用方回退到默认 persona
    pub async fn resolve(&self, task: &Task) -> Result<ExpertProfile, AgentError> {
        let prompt = self
            .prompts
            .load_prompt(PROFILE_FORMAT, &[("task", task.input.as_str())])
            .map_err(|e| AgentError::ProfileResolution(e.to_string()))?;
        let messages = [Message::user(prompt)];

        let completion = match timeout(self.timeout, self.llm.complete(&messages, &self.options)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => return Err(AgentError::ProfileResolution(e)),
            Err(_) => {
                return Err(AgentError::ProfileResolution(format!(
                    "model timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };
        let content = completion
            .first_content()
            .ok_or_else(|| AgentError::ProfileResolution("empty completion".to_string()))?;

        let profile = parse_profile(content)?;
        tracing::info!(task_id = %task.task_id, profile = %profile.name, "expert profile resolved");
        Ok(profile)
    }
}

/// 解析画像回复：JSON 对象或单行标签
pub fn parse_profile(text: &str) -> Result<ExpertProfile, AgentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AgentError::ProfileResolution("empty completion".to_string()));
    }

    if trimmed.starts_with('{') {
        let reply: ProfileReply = serde_json::from_str(trimmed)
            .map_err(|e| AgentError::ProfileResolution(format!("{}: {}", e, trimmed)))?;
        let name = reply.name.trim().to_string();
        if name.is_empty() {
            return Err(AgentError::ProfileResolution("empty profile name".to_string()));
        }
        let or_name = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| name.clone())
        };
        return Ok(ExpertProfile {
            expertise: or_name(reply.expertise),
            role: or_name(reply.role),
            name,
        });
    }

    let label = trimmed
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '.')
        .trim();
    if label.is_empty() {
        return Err(AgentError::ProfileResolution("empty profile label".to_string()));
    }
    if label.chars().count() > MAX_LABEL_CHARS {
        return Err(AgentError::ProfileResolution(format!(
            "profile label too long ({} chars)",
            label.chars().count()
        )));
    }
    Ok(ExpertProfile {
        name: label.to_string(),
        expertise: label.to_string(),
        role: label.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use chrono::Utc;

    fn task(input: &str) -> Task {
        Task {
            task_id: "t1".to_string(),
            input: input.to_string(),
            additional_input: None,
            created_at: Utc::now(),
        }
    }

    fn resolver(llm: Arc<ScriptedLlmClient>) -> ProfileResolver {
        ProfileResolver::new(
            llm,
            PromptEngine::new(),
            CompletionOptions::new("gpt-4").with_temperature(0.0),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_parse_label() {
        let p = parse_profile("  \"Historian\".\nextra text").unwrap();
        assert_eq!(p.name, "Historian");
        assert_eq!(p.role, "Historian");
    }

    #[test]
    fn test_parse_json() {
        let p = parse_profile(r#"{"name": "Ada", "expertise": "file systems"}"#).unwrap();
        assert_eq!(p.name, "Ada");
        assert_eq!(p.expertise, "file systems");
        assert_eq!(p.role, "Ada");
    }

    #[test]
    fn test_parse_failures() {
        assert!(parse_profile("   ").is_err());
        assert!(parse_profile("{\"name\": ").is_err());
        assert!(parse_profile(r#"{"name": ""}"#).is_err());
        assert!(parse_profile(&"x".repeat(200)).is_err());
    }

    #[tokio::test]
    async fn test_resolve_uses_profile_prompt() {
        let llm = Arc::new(ScriptedLlmClient::new(["Technical Writer"]));
        let profile = resolver(llm.clone()).resolve(&task("write docs")).await.unwrap();
        assert_eq!(profile.name, "Technical Writer");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0][0].content.contains("write docs"));
        assert_eq!(llm.request_options()[0].temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_resolve_error_is_profile_failure() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let err = resolver(llm).resolve(&task("x")).await.unwrap_err();
        assert!(matches!(err, AgentError::ProfileResolution(_)));
    }
}
