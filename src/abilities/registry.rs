//! 能力注册表
//!
//! 所有能力实现 Ability trait（name / description / parameters / execute），由 AbilityRegistry 按名注册与查找；
//! 调用前按声明的参数做关键字绑定校验，位置参数、多余参数、缺失必填参数、类型不符都返回 InvalidArguments。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 关键字参数表
pub type AbilityArgs = Map<String, Value>;

/// 参数类型（仅标量）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 能力参数声明
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AbilityParameter {
    pub name: String,
    pub description: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl AbilityParameter {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// 能力 trait：名称、描述（供 LLM 理解）、参数声明、异步执行
#[async_trait]
pub trait Ability: Send + Sync {
    /// 能力名称（模型回复中 ability.name 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<AbilityParameter> {
        Vec::new()
    }

    /// 执行能力；args 已通过参数校验
    async fn execute(&self, task_id: &str, args: AbilityArgs) -> Result<Value, String>;
}

/// 能力注册表：按名称有序存储，保证提示词中的能力列表每步一致
#[derive(Default, Clone)]
pub struct AbilityRegistry {
    abilities: BTreeMap<String, Arc<dyn Ability>>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ability: impl Ability + 'static) {
        let name = ability.name().to_string();
        self.abilities.insert(name, Arc::new(ability));
    }

    /// 合并另一个注册表，同名能力以 other 为准
    pub fn extend(&mut self, other: &AbilityRegistry) {
        for (name, ability) in &other.abilities {
            self.abilities.insert(name.clone(), ability.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Ability>> {
        self.abilities.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.abilities.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }

    /// 生成提示词中的能力列表：`- Name(arg: type, opt?: type): description`
    pub fn list_abilities_for_prompt(&self) -> String {
        self.abilities
            .values()
            .map(|ability| {
                let params = ability
                    .parameters()
                    .iter()
                    .map(|p| {
                        let marker = if p.required { "" } else { "?" };
                        format!("{}{}: {}", p.name, marker, p.kind.as_str())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}({}): {}", ability.name(), params, ability.description())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 查找能力并把 args 绑定为关键字参数
    pub fn bind(&self, name: &str, args: Value) -> Result<(Arc<dyn Ability>, AbilityArgs), AgentError> {
        let ability = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownAbility(name.to_string()))?;
        let invalid = |reason: String| AgentError::InvalidArguments {
            ability: name.to_string(),
            reason,
        };

        let args = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(invalid(format!(
                    "arguments must be keyword arguments in a JSON object, got {}",
                    value_kind(&other)
                )))
            }
        };

        let params = ability.parameters();
        if let Some(unexpected) = args.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
            return Err(invalid(format!("unexpected keyword argument '{unexpected}'")));
        }
        // null 等同于未传
        let args: AbilityArgs = args.into_iter().filter(|(_, v)| !v.is_null()).collect();
        for p in &params {
            match args.get(&p.name) {
                None if p.required => {
                    return Err(invalid(format!(
                        "missing required keyword argument '{}'",
                        p.name
                    )))
                }
                Some(value) if !p.kind.matches(value) => {
                    return Err(invalid(format!(
                        "argument '{}' expects {}, got {}",
                        p.name,
                        p.kind.as_str(),
                        value_kind(value)
                    )))
                }
                _ => {}
            }
        }
        Ok((ability, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Add;

    #[async_trait]
    impl Ability for Add {
        fn name(&self) -> &str {
            "Add"
        }

        fn description(&self) -> &str {
            "Add two integers"
        }

        fn parameters(&self) -> Vec<AbilityParameter> {
            vec![
                AbilityParameter::required("a", ParamKind::Integer, "left"),
                AbilityParameter::required("b", ParamKind::Integer, "right"),
                AbilityParameter::optional("label", ParamKind::String, "label"),
            ]
        }

        async fn execute(&self, _task_id: &str, args: AbilityArgs) -> Result<Value, String> {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(json!(a + b))
        }
    }

    fn registry() -> AbilityRegistry {
        let mut r = AbilityRegistry::new();
        r.register(Add);
        r
    }

    #[tokio::test]
    async fn test_bind_keyword_args_then_execute() {
        let (ability, args) = registry().bind("Add", json!({"a": 2, "b": 3})).unwrap();
        assert_eq!(ability.execute("t", args).await.unwrap(), json!(5));
    }

    #[test]
    fn test_unknown_ability() {
        let err = registry().bind("Sub", json!({})).err().unwrap();
        assert_eq!(err, AgentError::UnknownAbility("Sub".to_string()));
    }

    #[test]
    fn test_positional_args_rejected() {
        let err = registry().bind("Add", json!([2, 3])).err().unwrap();
        match err {
            AgentError::InvalidArguments { ability, reason } => {
                assert_eq!(ability, "Add");
                assert!(reason.contains("keyword"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_binding_errors() {
        let r = registry();
        let reason = |args: Value| match r.bind("Add", args).err().unwrap() {
            AgentError::InvalidArguments { reason, .. } => reason,
            other => panic!("unexpected {other:?}"),
        };
        assert!(reason(json!({"a": 1})).contains("missing required keyword argument 'b'"));
        assert!(reason(json!({"a": 1, "b": 2, "c": 3})).contains("unexpected keyword argument 'c'"));
        assert!(reason(json!({"a": "1", "b": 2})).contains("expects integer, got string"));
        assert!(reason(json!({"a": 1.5, "b": 2})).contains("got number"));
    }

    #[test]
    fn test_null_optional_is_dropped() {
        let (_, args) = registry()
            .bind("Add", json!({"a": 1, "b": 2, "label": null}))
            .unwrap();
        assert!(!args.contains_key("label"));
        assert!(registry().bind("Add", Value::Null).is_err());
    }

    #[test]
    fn test_prompt_listing() {
        let listing = registry().list_abilities_for_prompt();
        assert_eq!(listing, "- Add(a: integer, b: integer, label?: string): Add two integers");
    }
}
