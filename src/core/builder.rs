//! 引擎构建器：统一的 StepOrchestrator 初始化逻辑
//!
//! CLI 与测试共用同一套装配：默认能力、LLM 后端、任务存储、记忆后端、画像推断与对话归档。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::abilities::{
    Ability, AbilityExecutor, AbilityRegistry, FinishAbility, ListFilesAbility, ReadFileAbility,
    WriteFileAbility, Workspace,
};
use crate::config::AppConfig;
use crate::core::{EngineSettings, StepOrchestrator};
use crate::llm::{create_llm_from_config, CompletionOptions, LlmClient};
use crate::memory::{ConversationPersistence, InMemoryMemoryBackend, MemoryBackend, MemoryBridge};
use crate::prompt::PromptEngine;
use crate::react::ProfileResolver;
use crate::task::{InMemoryTaskStore, TaskStore};

/// 内存记忆后端每个任务保留的最大记录数
const DEFAULT_MEMORY_ENTRIES: usize = 1000;

/// 引擎构建器：未显式注入的组件按配置创建默认实现
pub struct EngineBuilder {
    config: AppConfig,
    workspace: PathBuf,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn TaskStore>>,
    memory: Option<Arc<dyn MemoryBackend>>,
    extra_abilities: AbilityRegistry,
    default_abilities: bool,
    enable_profiles: bool,
}

impl EngineBuilder {
    pub fn new(config: AppConfig, workspace: PathBuf) -> Self {
        let enable_profiles = config.agent.profile_enabled;
        Self {
            config,
            workspace,
            llm: None,
            store: None,
            memory: None,
            extra_abilities: AbilityRegistry::new(),
            default_abilities: true,
            enable_profiles,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_memory_backend(mut self, backend: Arc<dyn MemoryBackend>) -> Self {
        self.memory = Some(backend);
        self
    }

    /// 追加能力（同名时覆盖默认能力）
    pub fn with_ability(mut self, ability: impl Ability + 'static) -> Self {
        self.extra_abilities.register(ability);
        self
    }

    /// 是否注册默认的文件与 Finish 能力
    pub fn with_default_abilities(mut self, enable: bool) -> Self {
        self.default_abilities = enable;
        self
    }

    /// 是否在任务创建时推断专家画像
    pub fn with_profiles(mut self, enable: bool) -> Self {
        self.enable_profiles = enable;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 构建能力注册表：默认能力 + 追加能力
    pub fn build_registry(&self) -> AbilityRegistry {
        let mut registry = AbilityRegistry::new();
        if self.default_abilities {
            let workspace = Workspace::new(&self.workspace);
            registry.register(WriteFileAbility::new(workspace.clone()));
            registry.register(ReadFileAbility::new(workspace.clone()));
            registry.register(ListFilesAbility::new(workspace));
            registry.register(FinishAbility);
        }
        registry.extend(&self.extra_abilities);
        registry
    }

    pub fn build_prompts(&self) -> PromptEngine {
        let prompts = PromptEngine::new();
        match &self.config.prompts.dir {
            Some(dir) => prompts.with_dir(dir),
            None => prompts,
        }
    }

    pub fn build(self) -> StepOrchestrator {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let store = self
            .store
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let prompts = self.build_prompts();
        let executor = AbilityExecutor::new(
            self.build_registry(),
            self.config.tools.tool_timeout_secs,
            self.config.agent.empty_result_placeholder.clone(),
        );

        let memory = if self.config.agent.memory_enabled {
            let backend = self
                .memory
                .clone()
                .unwrap_or_else(|| Arc::new(InMemoryMemoryBackend::new(DEFAULT_MEMORY_ENTRIES)));
            Some(MemoryBridge::new(backend))
        } else {
            None
        };

        let profiles = self.enable_profiles.then(|| {
            let model = self
                .config
                .llm
                .profile_model
                .clone()
                .unwrap_or_else(|| self.config.llm.model.clone());
            ProfileResolver::new(
                llm.clone(),
                prompts.clone(),
                CompletionOptions::new(model).with_temperature(self.config.llm.profile_temperature),
                Duration::from_secs(self.config.llm.timeouts.request),
            )
        });

        let archive = self
            .config
            .app
            .archive_dir
            .as_ref()
            .map(ConversationPersistence::new);

        let mut settings = EngineSettings::from_config(&self.config);
        settings.profile_enabled = self.enable_profiles;

        tracing::info!(
            model = %settings.model,
            abilities = ?executor.ability_names(),
            memory = memory.is_some(),
            profiles = profiles.is_some(),
            "engine built"
        );

        StepOrchestrator::new(store, llm, prompts, executor, memory, profiles, archive, settings)
    }
}

/// 便捷函数：从默认路径加载配置并创建 EngineBuilder
pub fn create_engine_builder(config_path: Option<PathBuf>) -> anyhow::Result<EngineBuilder> {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let workspace = match config.app.workspace_root.clone() {
        Some(root) => root,
        None => std::env::current_dir()?.join("workspace"),
    };
    std::fs::create_dir_all(&workspace)?;
    let workspace = workspace.canonicalize().unwrap_or(workspace);

    Ok(EngineBuilder::new(config, workspace))
}
