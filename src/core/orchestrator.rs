//! Step 编排器：单步主控流程
//!
//! create_task 创建任务并推断一次专家画像；execute_step 在任务锁内跑完一个
//! CREATED → PROMPTING → AWAITING_MODEL → PARSING → DISPATCHING → RECORDING → DONE 周期。
//! 是否结束任务只由模型回复的 thoughts.last_step 决定。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::timeout;

use crate::abilities::AbilityExecutor;
use crate::config::AppConfig;
use crate::core::{preview, AgentError, RecoveryAction, RecoveryEngine, StepCycle, StepPhase, TaskLocks};
use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::{ConversationPersistence, ConversationStore, MemoryBridge, Message, Role};
use crate::prompt::{PromptEngine, ONTOLOGY_FORMAT, PAST_CONVO, SYSTEM_FORMAT_LAST, TASK_FORMAT};
use crate::react::{parse_reply, response_schema_json, ExpertProfile, ProfileResolver};
use crate::task::{Step, StepRequest, StepStatus, StepUpdate, Task, TaskRequest, TaskStore};

/// 引擎选项（原先分散在多个 agent 变体中的差异统一为配置）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub memory_enabled: bool,
    /// 每步召回的相关记录数，默认只取最相关的一条
    pub recall_top_k: usize,
    pub empty_result_placeholder: String,
    pub model_timeout: Duration,
    pub fallback_persona: ExpertProfile,
    pub profile_enabled: bool,
}

impl EngineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            memory_enabled: cfg.agent.memory_enabled,
            recall_top_k: cfg.agent.recall_top_k,
            empty_result_placeholder: cfg.agent.empty_result_placeholder.clone(),
            model_timeout: Duration::from_secs(cfg.llm.timeouts.request),
            fallback_persona: ExpertProfile::from(&cfg.agent.fallback_persona),
            profile_enabled: cfg.agent.profile_enabled,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 一个成功周期的结果
struct StepOutcome {
    output: String,
    is_last: bool,
}

/// Step 编排器：把对话存储、回复契约、能力调度、记忆桥和画像串成单步流程
pub struct StepOrchestrator {
    store: Arc<dyn TaskStore>,
    llm: Arc<dyn LlmClient>,
    prompts: PromptEngine,
    executor: AbilityExecutor,
    conversations: ConversationStore,
    memory: Option<MemoryBridge>,
    profiles: Option<ProfileResolver>,
    personas: RwLock<HashMap<String, ExpertProfile>>,
    locks: TaskLocks,
    recovery: RecoveryEngine,
    archive: Option<ConversationPersistence>,
    schema: String,
    settings: EngineSettings,
}

impl StepOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TaskStore>,
        llm: Arc<dyn LlmClient>,
        prompts: PromptEngine,
        executor: AbilityExecutor,
        memory: Option<MemoryBridge>,
        profiles: Option<ProfileResolver>,
        archive: Option<ConversationPersistence>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            executor,
            conversations: ConversationStore::new(),
            memory,
            profiles,
            personas: RwLock::new(HashMap::new()),
            locks: TaskLocks::new(),
            recovery: RecoveryEngine::new(),
            archive,
            schema: response_schema_json(),
            settings,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ability_names(&self) -> Vec<String> {
        self.executor.ability_names()
    }

    /// 任务的专家画像（推断失败或已结束时为 None）
    pub fn profile(&self, task_id: &str) -> Option<ExpertProfile> {
        self.personas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    /// 提示词中使用的 persona：画像缺失时用默认 persona
    pub fn persona(&self, task_id: &str) -> ExpertProfile {
        self.profile(task_id)
            .unwrap_or_else(|| self.settings.fallback_persona.clone())
    }

    /// 创建任务并推断专家画像；画像失败不影响任务创建
    pub async fn create_task(&self, request: TaskRequest) -> Result<Task, AgentError> {
        let task = self
            .store
            .create_task(&request.input, request.additional_input)
            .await
            .map_err(|e| {
                tracing::error!("task creation failed: {}", e);
                AgentError::TaskCreation(e)
            })?;
        tracing::info!(
            task_id = %task.task_id,
            "📦 Task created: {}",
            preview(&task.input, 40)
        );

        if let (true, Some(resolver)) = (self.settings.profile_enabled, &self.profiles) {
            match resolver.resolve(&task).await {
                Ok(profile) => {
                    self.personas
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(task.task_id.clone(), profile);
                }
                Err(e) => tracing::warn!(
                    task_id = %task.task_id,
                    fallback = %self.settings.fallback_persona.name,
                    "{}, using fallback persona",
                    e
                ),
            }
        }
        Ok(task)
    }

    /// 执行一个 Step；可恢复错误以失败输出结束 Step（is_last=false），不会返回 Err。
    /// Step 创建之后的不可恢复错误：尽力把 Step 标记为 failed 后返回 Err，任务锁随之释放
    pub async fn execute_step(&self, task_id: &str, request: StepRequest) -> Result<Step, AgentError> {
        let task = match self.store.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return Err(AgentError::TaskNotFound(task_id.to_string())),
            Err(e) => return Err(AgentError::Persistence(e)),
        };

        let guard = self.locks.acquire(task_id).await;
        let step = self
            .store
            .create_step(
                task_id,
                request.input.as_deref(),
                request.additional_input,
                false,
            )
            .await
            .map_err(AgentError::Persistence)?;

        let step = match self.drive_step(&task, &step.step_id).await {
            Ok(step) => step,
            Err(err) => {
                tracing::error!(task_id = %task_id, step_id = %step.step_id, "step aborted: {}", err);
                let update = StepUpdate {
                    status: StepStatus::Failed,
                    output: Some(err.to_string()),
                    is_last: Some(false),
                };
                if let Err(e) = self.store.update_step(task_id, &step.step_id, update).await {
                    tracing::warn!(task_id = %task_id, "step status not persisted: {}", e);
                }
                return Err(err);
            }
        };

        if step.is_last {
            self.finish_task(task_id);
            drop(guard);
            self.locks.forget(task_id);
        }
        Ok(step)
    }

    /// RUNNING → 周期 → COMPLETED / FAILED；可恢复错误在此转为失败输出
    async fn drive_step(&self, task: &Task, step_id: &str) -> Result<Step, AgentError> {
        let task_id = task.task_id.as_str();
        let mut cycle = StepCycle::new();
        cycle.advance(StepPhase::Prompting);
        self.store
            .update_step(task_id, step_id, StepUpdate::status(StepStatus::Running))
            .await
            .map_err(AgentError::Persistence)?;

        let (status, outcome) = match self.run_cycle(task, &mut cycle).await {
            Ok(outcome) => (StepStatus::Completed, outcome),
            Err(err) if err.is_recoverable() && cycle.phase().can_transition_to(StepPhase::Failed) => {
                tracing::error!(task_id = %task_id, step_id = %step_id, "step failed: {}", err);
                cycle.fail(err);
                cycle.advance(StepPhase::Done);
                let output = match cycle.failure().map(|e| (e, self.recovery.handle(e))) {
                    Some((_, RecoveryAction::ReportToStep(msg))) => msg,
                    Some((e, RecoveryAction::Abort)) => e.to_string(),
                    None => String::new(),
                };
                (
                    StepStatus::Failed,
                    StepOutcome {
                        output,
                        is_last: false,
                    },
                )
            }
            Err(err) => return Err(err),
        };

        let update = StepUpdate {
            status,
            output: Some(outcome.output),
            is_last: Some(outcome.is_last),
        };
        let step = self
            .store
            .update_step(task_id, step_id, update)
            .await
            .map_err(AgentError::Persistence)?;

        tracing::debug!(
            task_id = %task_id,
            trace = ?cycle.trace(),
            "chat log\n{:#?}",
            self.conversations.get(task_id)
        );
        Ok(step)
    }

    async fn run_cycle(&self, task: &Task, cycle: &mut StepCycle) -> Result<StepOutcome, AgentError> {
        let task_id = task.task_id.as_str();

        let system_prompt = self
            .prompts
            .load_prompt(SYSTEM_FORMAT_LAST, &[("schema", self.schema.as_str())])?;
        self.conversations.append(task_id, Message::system(system_prompt));

        let task_prompt = self.task_prompt(task)?;
        self.conversations
            .append(task_id, Message::user(task_prompt.clone()));

        // 召回内容只进入本次请求，不写入对话
        let mut recalled = Vec::new();
        if let Some(memory) = self.active_memory() {
            let related = memory
                .recall(task_id, &task_prompt, Role::Assistant, self.settings.recall_top_k)
                .await;
            for document in related {
                let past = self
                    .prompts
                    .load_prompt(PAST_CONVO, &[("document", document.as_str())])?;
                recalled.push(Message::user(past));
            }
        }

        cycle.advance(StepPhase::AwaitingModel);
        let messages = with_recalled(self.conversations.get(task_id), &task_prompt, recalled);
        let options = CompletionOptions::new(self.settings.model.clone());
        let completion = match timeout(
            self.settings.model_timeout,
            self.llm.complete(&messages, &options),
        )
        .await
        {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => return Err(AgentError::Llm(e)),
            Err(_) => return Err(AgentError::ModelTimeout(self.settings.model_timeout.as_secs())),
        };
        let content = completion
            .first_content()
            .ok_or_else(|| AgentError::Llm("completion has no choices".to_string()))?;

        cycle.advance(StepPhase::Parsing);
        let reply = parse_reply(content)?;

        cycle.advance(StepPhase::Dispatching);
        tracing::info!(task_id = %task_id, ability = %reply.ability.name, "🔨 Running ability");
        let result = self
            .executor
            .execute(task_id, &reply.ability.name, reply.ability.args.clone())
            .await?;

        cycle.advance(StepPhase::Recording);
        let content = if reply.ability.has_args() {
            format!("[Arguments {}]: {}", reply.ability.args, result)
        } else {
            result.clone()
        };
        self.conversations
            .append(task_id, Message::function(reply.ability.name.clone(), content));

        if let Some(memory) = self.active_memory() {
            memory.record(task_id, &task_prompt, Role::User).await;
            memory.record(task_id, &reply.raw, Role::Assistant).await;
        }

        let output = match reply.thoughts.speak {
            Some(speak) if !speak.trim().is_empty() => speak,
            _ => result,
        };
        cycle.advance(StepPhase::Done);
        Ok(StepOutcome {
            output,
            is_last: reply.thoughts.last_step,
        })
    }

    /// 能力为空时退化为只含角色与任务的 task-format
    fn task_prompt(&self, task: &Task) -> Result<String, AgentError> {
        let persona = self.persona(&task.task_id);
        if self.executor.registry().is_empty() {
            return self.prompts.load_prompt(
                TASK_FORMAT,
                &[("role_expert", persona.name.as_str()), ("task", task.input.as_str())],
            );
        }
        let abilities = self.executor.registry().list_abilities_for_prompt();
        self.prompts.load_prompt(
            ONTOLOGY_FORMAT,
            &[
                ("name", persona.name.as_str()),
                ("expertise", persona.expertise.as_str()),
                ("role", persona.role.as_str()),
                ("task", task.input.as_str()),
                ("abilities", abilities.as_str()),
            ],
        )
    }

    fn active_memory(&self) -> Option<&MemoryBridge> {
        self.memory
            .as_ref()
            .filter(|m| self.settings.memory_enabled && m.enabled())
    }

    /// 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 任务结束：对话移出活跃表，写盘成功即释放，否则留在内存归档；同时释放画像
    fn finish_task(&self, task_id: &str) {
        let messages = self.conversations.take(task_id);
        let count = messages.len();
        let saved = match &self.archive {
            Some(archive) => match archive.save(task_id, &messages) {
                Ok(path) => {
                    tracing::info!(task_id = %task_id, path = %path.display(), "conversation archived");
                    true
                }
                Err(e) => {
                    tracing::warn!(task_id = %task_id, "conversation archive failed: {}", e);
                    false
                }
            },
            None => false,
        };
        if !saved {
            self.conversations.keep_archived(task_id, messages);
        }
        self.personas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        tracing::info!(task_id = %task_id, messages = count, "✅ Task finished");
    }
}

/// 把召回消息插到本步任务提示之前；找不到任务提示时追加在末尾
fn with_recalled(mut messages: Vec<Message>, task_prompt: &str, recalled: Vec<Message>) -> Vec<Message> {
    if recalled.is_empty() {
        return messages;
    }
    let at = messages
        .iter()
        .position(|m| m.role == Role::User && m.content == task_prompt)
        .unwrap_or(messages.len());
    let tail = messages.split_off(at);
    messages.extend(recalled);
    messages.extend(tail);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recalled_messages_precede_task_prompt() {
        let log = vec![
            Message::system("format"),
            Message::user("TASK"),
            Message::function("ListFiles", "a.txt"),
        ];
        let merged = with_recalled(log.clone(), "TASK", vec![Message::user("PAST")]);
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["format", "PAST", "TASK", "a.txt"]);

        assert_eq!(with_recalled(log.clone(), "TASK", Vec::new()), log);
        let tail = with_recalled(log, "other", vec![Message::user("PAST")]);
        assert_eq!(tail.last().map(|m| m.content.as_str()), Some("PAST"));
    }

    #[test]
    fn test_settings_from_config() {
        let mut cfg = AppConfig::default();
        cfg.llm.model = "gpt-3.5-turbo".to_string();
        cfg.agent.empty_result_placeholder = "Success".to_string();
        let settings = EngineSettings::from_config(&cfg);
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert_eq!(settings.empty_result_placeholder, "Success");
        assert_eq!(settings.model_timeout, Duration::from_secs(60));
        assert_eq!(settings.fallback_persona.name, "General Assistant");
    }
}
