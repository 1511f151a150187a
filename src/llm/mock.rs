//! Mock / Scripted LLM 客户端（用于本地运行与测试，无需 API）
//!
//! MockLlmClient 总是回复调用 Finish 能力并结束任务；
//! ScriptedLlmClient 按队列依次返回预设回复，并记录每次请求的消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatCompletion, CompletionOptions, LlmClient};
use crate::memory::{Message, Role};

/// Mock 客户端：以 Finish 结束任务，speak 回显最后一条 User 消息的首行
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<ChatCompletion, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or("(no input)");

        let reply = serde_json::json!({
            "thoughts": {
                "text": "mock model has no reasoning",
                "speak": format!("Echo from Mock: {}", last_user.trim()),
                "last_step": true,
            },
            "ability": {
                "name": "Finish",
                "args": { "reason": "mock run" },
            },
        });
        Ok(ChatCompletion::from_content(reply.to_string()))
    }
}

/// 预设回复客户端：队列耗尽后返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<(Vec<Message>, CompletionOptions)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// 每次调用前等待 delay（模拟慢模型）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_error(&self, err: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(err.into()));
    }

    /// 所有已收到请求的消息序列
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn request_options(&self) -> Vec<CompletionOptions> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// 同时在途调用数的峰值
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<ChatCompletion, String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((messages.to_vec(), options.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match next {
            Some(Ok(content)) => Ok(ChatCompletion::from_content(content)),
            Some(Err(e)) => Err(e),
            None => Err("no scripted reply left".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replies_with_finish() {
        let client = MockLlmClient;
        let out = client
            .complete(&[Message::user("say hi\nmore")], &CompletionOptions::new("mock"))
            .await
            .unwrap();
        let reply: serde_json::Value = serde_json::from_str(out.first_content().unwrap()).unwrap();
        assert_eq!(reply["ability"]["name"], "Finish");
        assert_eq!(reply["thoughts"]["last_step"], true);
        assert_eq!(reply["thoughts"]["speak"], "Echo from Mock: say hi");
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let client = ScriptedLlmClient::new(["a", "b"]);
        client.push_error("rate limited");
        let opts = CompletionOptions::new("m");
        assert_eq!(
            client.complete(&[], &opts).await.unwrap().first_content(),
            Some("a")
        );
        assert_eq!(
            client.complete(&[], &opts).await.unwrap().first_content(),
            Some("b")
        );
        assert_eq!(client.complete(&[], &opts).await.unwrap_err(), "rate limited");
        assert!(client.complete(&[], &opts).await.is_err());
        assert_eq!(client.requests().len(), 4);
        assert_eq!(client.peak_in_flight(), 1);
    }
}
