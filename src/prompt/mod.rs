//! Prompt 模板引擎
//!
//! 内置 system-format-last / ontology-format / task-format / past-convo / profile-format 五个模板，
//! 可由 `[prompts] dir` 下同名 `<template>.txt` 覆盖；`{name}` 占位符按参数替换，未知占位符原样保留。

mod templates;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::AgentError;

pub const SYSTEM_FORMAT_LAST: &str = "system-format-last";
pub const ONTOLOGY_FORMAT: &str = "ontology-format";
pub const TASK_FORMAT: &str = "task-format";
pub const PAST_CONVO: &str = "past-convo";
pub const PROFILE_FORMAT: &str = "profile-format";

/// 模板引擎：按名称加载模板并渲染参数
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<String, String>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let templates = [
            (SYSTEM_FORMAT_LAST, templates::SYSTEM_FORMAT_LAST),
            (ONTOLOGY_FORMAT, templates::ONTOLOGY_FORMAT),
            (TASK_FORMAT, templates::TASK_FORMAT),
            (PAST_CONVO, templates::PAST_CONVO),
            (PROFILE_FORMAT, templates::PROFILE_FORMAT),
        ]
        .into_iter()
        .map(|(name, body)| (name.to_string(), body.to_string()))
        .collect();
        Self { templates }
    }

    /// 用目录中的 `<template>.txt` 覆盖同名内置模板（也可新增模板）
    pub fn with_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::warn!(dir = %dir.display(), "prompt directory not readable, using built-in templates");
            return self;
        };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(body) => {
                    tracing::info!(template = %name, "prompt template override loaded");
                    self.templates.insert(name.to_string(), body);
                }
                Err(e) => tracing::warn!(path = %path.display(), "prompt template unreadable: {}", e),
            }
        }
        self
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// 渲染模板；模板不存在时返回 AgentError::Prompt
    pub fn load_prompt(&self, name: &str, params: &[(&str, &str)]) -> Result<String, AgentError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| AgentError::Prompt(format!("unknown template '{name}'")))?;
        let params: HashMap<&str, &str> = params.iter().copied().collect();
        Ok(render(template, &params))
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 单遍替换 `{key}`：参数值中的花括号不会被再次展开
fn render(template: &str, params: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if is_placeholder(&after[..end]) => {
                let key = &after[..end];
                match params.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
