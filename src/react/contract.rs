//! 模型回复契约
//!
//! 回复必须是 `{"ability": {"name", "args"?}, "thoughts": {"speak"?, "last_step"?, ...}}` 形式的 JSON 对象。
//! parse_reply 对任意文本要么返回 ModelReply，要么返回 AgentError::MalformedResponse，从不 panic。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::core::{preview, AgentError, MalformedKind};

/// 错误信息中回复原文的最大长度（字符）
const REPLY_PREVIEW_CHARS: usize = 200;

/// 解析后的能力调用
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityInvocation {
    pub name: String,
    /// 始终为 JSON 对象（缺省时为空对象）；内容由注册表校验
    pub args: Value,
}

impl AbilityInvocation {
    pub fn has_args(&self) -> bool {
        self.args.as_object().map(|m| !m.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thoughts {
    pub speak: Option<String>,
    /// 缺省为 false：缺失的标记绝不视为完成
    pub last_step: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub ability: AbilityInvocation,
    pub thoughts: Thoughts,
    /// 原始回复文本（写入记忆）
    pub raw: String,
}

/// 回复格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ResponseFormat {
    ability: AbilityFormat,
    thoughts: ThoughtsFormat,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct AbilityFormat {
    /// 能力名，必须是已列出的能力之一
    name: String,
    /// 关键字参数
    args: Option<HashMap<String, Value>>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct ThoughtsFormat {
    text: Option<String>,
    reasoning: Option<String>,
    plan: Option<String>,
    criticism: Option<String>,
    /// 对用户说的话，作为本步输出
    speak: Option<String>,
    /// 本步完成整个任务时为 true
    last_step: Option<bool>,
}

/// 返回回复格式的 JSON Schema 字符串，拼入 system prompt
pub fn response_schema_json() -> String {
    let schema = schema_for!(ResponseFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 解析模型回复
pub fn parse_reply(text: &str) -> Result<ModelReply, AgentError> {
    let object = decode_object(text)?;
    let malformed = |what: &str| {
        AgentError::malformed(
            MalformedKind::Shape,
            format!("{what}: {}", preview(text.trim(), REPLY_PREVIEW_CHARS)),
        )
    };

    let ability = match object.get("ability") {
        Some(Value::Object(a)) => a,
        _ => return Err(malformed("missing ability object")),
    };
    let name = match ability.get("name") {
        Some(Value::String(n)) if !n.trim().is_empty() => n.trim().to_string(),
        _ => return Err(malformed("missing ability.name")),
    };
    let args = match ability.get("args") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(other) => other.clone(),
    };

    let thoughts = match object.get("thoughts") {
        Some(Value::Object(t)) => Thoughts {
            speak: match t.get("speak") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            },
            last_step: parse_flag(t.get("last_step")),
        },
        _ => Thoughts::default(),
    };

    Ok(ModelReply {
        ability: AbilityInvocation { name, args },
        thoughts,
        raw: text.to_string(),
    })
}

/// 依次尝试：整段文本、```json 代码块、首个 `{` 到最后一个 `}`
fn decode_object(text: &str) -> Result<Map<String, Value>, AgentError> {
    let trimmed = text.trim();
    let mut candidates = vec![trimmed];
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        candidates.push(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    let mut last_err = String::from("empty reply");
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => last_err = format!("expected a JSON object, got {}", kind(&other)),
            Err(e) => last_err = e.to_string(),
        }
    }
    Err(AgentError::malformed(
        MalformedKind::Decode,
        format!("{} ({})", preview(trimmed, REPLY_PREVIEW_CHARS), last_err),
    ))
}

fn parse_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_reply() {
        let text = r#"{"ability":{"name":"WriteFile","args":{"filename":"output.txt","content":"Washington"}},"thoughts":{"speak":"done","last_step":true}}"#;
        let reply = parse_reply(text).unwrap();
        assert_eq!(reply.ability.name, "WriteFile");
        assert_eq!(reply.ability.args["filename"], json!("output.txt"));
        assert!(reply.ability.has_args());
        assert_eq!(reply.thoughts.speak.as_deref(), Some("done"));
        assert!(reply.thoughts.last_step);
        assert_eq!(reply.raw, text);
    }

    #[test]
    fn test_missing_last_step_defaults_false() {
        let reply = parse_reply(r#"{"ability":{"name":"Finish"},"thoughts":{"speak":"hi"}}"#).unwrap();
        assert!(!reply.thoughts.last_step);
        assert_eq!(reply.ability.args, json!({}));
        assert!(!reply.ability.has_args());

        let reply = parse_reply(r#"{"ability":{"name":"Finish","args":null}}"#).unwrap();
        assert_eq!(reply.thoughts, Thoughts::default());
    }

    #[test]
    fn test_string_flag() {
        let reply =
            parse_reply(r#"{"ability":{"name":"Finish"},"thoughts":{"last_step":"True"}}"#).unwrap();
        assert!(reply.thoughts.last_step);
    }

    #[test]
    fn test_fenced_and_wrapped_json() {
        let fenced = "Sure:\n```json\n{\"ability\":{\"name\":\"ListFiles\"}}\n```";
        assert_eq!(parse_reply(fenced).unwrap().ability.name, "ListFiles");
        let wrapped = "Here you go {\"ability\":{\"name\":\"ReadFile\",\"args\":{\"filename\":\"a\"}}} thanks";
        assert_eq!(parse_reply(wrapped).unwrap().ability.name, "ReadFile");
    }

    fn malformed_kind(text: &str) -> Option<MalformedKind> {
        match parse_reply(text) {
            Err(AgentError::MalformedResponse { kind, .. }) => Some(kind),
            _ => None,
        }
    }

    #[test]
    fn test_malformed_inputs() {
        for text in ["not json", "", "[1, 2]", "42", "{", "} {"] {
            assert_eq!(malformed_kind(text), Some(MalformedKind::Decode), "{text:?}");
        }
        for text in [
            r#"{"thoughts":{"speak":"x"}}"#,
            r#"{"ability":"WriteFile"}"#,
            r#"{"ability":{"name":""}}"#,
            r#"{"ability":{"name":7}}"#,
        ] {
            assert_eq!(malformed_kind(text), Some(MalformedKind::Shape), "{text:?}");
        }
    }

    #[test]
    fn test_malformed_detail_is_truncated() {
        let long = format!("not json {}", "x".repeat(5000));
        match parse_reply(&long) {
            Err(AgentError::MalformedResponse { detail, .. }) => {
                assert!(detail.chars().count() < 400, "{}", detail.len());
                assert!(detail.starts_with("not json xxx"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_object_args_are_kept_for_binding() {
        let reply = parse_reply(r#"{"ability":{"name":"Add","args":[1,2]}}"#).unwrap();
        assert_eq!(reply.ability.args, json!([1, 2]));
        assert!(!reply.ability.has_args());
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = response_schema_json();
        assert!(schema.contains("ability"));
        assert!(schema.contains("last_step"));
    }
}
