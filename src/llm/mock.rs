//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 可预置脚本化回复队列；队列耗尽后回显最后一条 User 消息，便于本地跑通整条图。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{EventStream, LlmClient, StreamEvent};
use crate::prompt::{Message, Role};

/// Mock 客户端：按脚本出队，否则回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlm {
    scripted: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置脚本化回复（按顺序出队）
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            scripted: Mutex::new(responses.into_iter().map(String::from).collect()),
        }
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.scripted
            .lock()
            .expect("mock lock poisoned")
            .push_back(response.into());
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, messages: &[Message]) -> Result<Message, String> {
        if let Some(next) = self.scripted.lock().expect("mock lock poisoned").pop_front() {
            return Ok(Message::assistant(next));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Message::assistant(format!("Echo from Mock: {last_user}")))
    }

    async fn complete_stream(&self, messages: &[Message]) -> Result<EventStream, String> {
        let reply = self.complete(messages).await?;
        Ok(Box::pin(stream::iter(vec![
            Ok(StreamEvent::Fragment(reply.content)),
            Ok(StreamEvent::Done),
        ])))
    }
}
