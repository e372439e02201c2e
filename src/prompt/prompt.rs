//! Prompt：有序消息序列与对外通告的工具描述
//!
//! 插入顺序有意义且不会被重排；所有变更都必须经由持有的写会话进行。

use crate::prompt::{Message, Role};
use crate::tools::ToolDescriptor;

/// 一次 Agent 运行的会话状态：消息序列 + 当前通告给 LLM 的工具列表
#[derive(Clone, Debug, Default)]
pub struct Prompt {
    messages: Vec<Message>,
    tools: Vec<ToolDescriptor>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(content: impl Into<String>) -> Self {
        let mut p = Self::new();
        p.push(Message::system(content));
        p
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn extend(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 整体替换消息序列（压缩提交、Clear 策略使用）
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// 重置为仅保留最初的 system 前缀消息（Clear 策略）
    pub fn reset_to_system(&mut self) {
        let system: Vec<Message> = self
            .messages
            .iter()
            .take_while(|m| m.role == Role::System)
            .cloned()
            .collect();
        self.messages = system;
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn set_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.tools = tools;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
