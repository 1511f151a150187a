//! 任务持久化接口与内存实现
//!
//! 引擎只通过 TaskStore 读写 Task / Step；InMemoryTaskStore 供 CLI 与测试使用。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Step, StepStatus, StepUpdate, Task};

/// 持久化协作方：创建/读取任务，创建/更新 Step
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, input: &str, additional_input: Option<Value>)
        -> Result<Task, String>;

    /// 任务不存在时返回 Ok(None)
    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, String>;

    async fn create_step(
        &self,
        task_id: &str,
        input: Option<&str>,
        additional_input: Option<Value>,
        is_last: bool,
    ) -> Result<Step, String>;

    async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        update: StepUpdate,
    ) -> Result<Step, String>;

    async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, String>;
}

/// 内存任务存储
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    steps: RwLock<HashMap<String, Vec<Step>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        input: &str,
        additional_input: Option<Value>,
    ) -> Result<Task, String> {
        let task = Task {
            task_id: uuid::Uuid::new_v4().to_string(),
            input: input.to_string(),
            additional_input,
            created_at: Utc::now(),
        };
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, String> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn create_step(
        &self,
        task_id: &str,
        input: Option<&str>,
        additional_input: Option<Value>,
        is_last: bool,
    ) -> Result<Step, String> {
        if !self.tasks.read().await.contains_key(task_id) {
            return Err(format!("Unknown task: {task_id}"));
        }
        let step = Step {
            step_id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            input: input.map(String::from),
            additional_input,
            output: None,
            is_last,
            status: StepStatus::Created,
            created_at: Utc::now(),
        };
        self.steps
            .write()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push(step.clone());
        Ok(step)
    }

    async fn update_step(
        &self,
        task_id: &str,
        step_id: &str,
        update: StepUpdate,
    ) -> Result<Step, String> {
        let mut steps = self.steps.write().await;
        let step = steps
            .get_mut(task_id)
            .and_then(|list| list.iter_mut().find(|s| s.step_id == step_id))
            .ok_or_else(|| format!("Unknown step {step_id} for task {task_id}"))?;
        step.status = update.status;
        if let Some(output) = update.output {
            step.output = Some(output);
        }
        if let Some(is_last) = update.is_last {
            step.is_last = is_last;
        }
        Ok(step.clone())
    }

    async fn list_steps(&self, task_id: &str) -> Result<Vec<Step>, String> {
        Ok(self
            .steps
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_task() {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task("write a poem", Some(serde_json::json!({"lang": "en"})))
            .await
            .unwrap();
        let fetched = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched, task);
        assert!(store.get_task("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_step_lifecycle() {
        let store = InMemoryTaskStore::new();
        let task = store.create_task("x", None).await.unwrap();
        let step = store
            .create_step(&task.task_id, Some("go"), None, false)
            .await
            .unwrap();
        assert_eq!(step.status, StepStatus::Created);

        let updated = store
            .update_step(
                &task.task_id,
                &step.step_id,
                StepUpdate {
                    status: StepStatus::Completed,
                    output: Some("done".to_string()),
                    is_last: Some(true),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, StepStatus::Completed);
        assert_eq!(updated.output.as_deref(), Some("done"));
        assert!(updated.is_last);

        let steps = store.list_steps(&task.task_id).await.unwrap();
        assert_eq!(steps, vec![updated]);
    }

    #[tokio::test]
    async fn test_step_for_unknown_task_fails() {
        let store = InMemoryTaskStore::new();
        assert!(store.create_step("nope", None, None, false).await.is_err());
        assert!(store
            .update_step("nope", "s", StepUpdate::status(StepStatus::Running))
            .await
            .is_err());
    }
}
