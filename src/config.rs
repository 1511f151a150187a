//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPWISE__*` 覆盖（双下划线表示嵌套，如 `STEPWISE__LLM__MODEL=gpt-4`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub prompts: PromptsSection,
}

/// [app] 段：应用名、工作目录、归档目录、CLI 最大步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 任务工作区根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 任务完成后对话归档目录（JSON），未设置则只保留在内存
    pub archive_dir: Option<PathBuf>,
    pub max_steps: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: None,
            archive_dir: None,
            max_steps: 10,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 专家画像推断使用的模型，未设置时与 model 相同
    pub profile_model: Option<String>,
    pub profile_temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            base_url: None,
            profile_model: None,
            profile_temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agent] 段：记忆开关、召回条数、空结果占位、专家画像
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub memory_enabled: bool,
    pub recall_top_k: usize,
    /// 能力返回空结果时写入对话与 Step 的占位文本
    pub empty_result_placeholder: String,
    pub profile_enabled: bool,
    pub fallback_persona: PersonaSection,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            recall_top_k: 1,
            empty_result_placeholder: "None".to_string(),
            profile_enabled: true,
            fallback_persona: PersonaSection::default(),
        }
    }
}

/// [agent.fallback_persona] 段：画像缺失时使用的通用 persona
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaSection {
    pub name: String,
    pub expertise: String,
    pub role: String,
}

impl Default for PersonaSection {
    fn default() -> Self {
        Self {
            name: "General Assistant".to_string(),
            expertise: "general problem solving".to_string(),
            role: "complete the task step by step using the available abilities".to_string(),
        }
    }
}

/// [tools] 段：单次能力调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [prompts] 段：模板覆盖目录
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptsSection {
    pub dir: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 STEPWISE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEPWISE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPWISE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
