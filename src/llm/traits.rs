//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式，返回 Assistant 消息）、
//! complete_stream（流式，片段流以显式 Done 标记收尾，Done 不是片段）。
//! 实现方不得修改传入的消息序列。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::prompt::Message;

/// 流式输出事件：文本片段，或与片段类型不同的结束标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Done,
}

/// 流式完成返回的事件流
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, String>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回一条 Assistant 消息
    async fn complete(&self, messages: &[Message]) -> Result<Message, String>;

    /// 流式完成；默认实现退化为一次 complete + 单片段 + Done
    async fn complete_stream(&self, messages: &[Message]) -> Result<EventStream, String> {
        let reply = self.complete(messages).await?;
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok(StreamEvent::Fragment(reply.content)),
            Ok(StreamEvent::Done),
        ])))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
