//! 消息类型
//!
//! 角色标签含 ToolCall / ToolResult（供边条件路由），origin 标记记忆来源消息（压缩时保留）。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，外加工具调用/结果两类）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    ToolCall,
    ToolResult,
}

/// 消息来源：普通对话或记忆注入（压缩的 preserve_memory 规则只看此标记）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageOrigin {
    #[default]
    Normal,
    Memory,
}

/// 从 Assistant 输出解析出的单个工具调用请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 单条消息；追加进 Prompt 后不再修改
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub origin: MessageOrigin,
    /// role 为 ToolCall 时的调用列表
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
    /// role 为 ToolResult 时产生结果的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool_call(content: impl Into<String>, invocations: Vec<ToolInvocation>) -> Self {
        Self {
            role: Role::ToolCall,
            content: content.into(),
            origin: MessageOrigin::Normal,
            invocations,
            tool: None,
        }
    }

    pub fn tool_result(tool: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult,
            content: content.into(),
            origin: MessageOrigin::Normal,
            invocations: Vec::new(),
            tool: Some(tool.into()),
        }
    }

    /// 标记为记忆注入来源（链式）
    pub fn from_memory(mut self) -> Self {
        self.origin = MessageOrigin::Memory;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.origin == MessageOrigin::Memory
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            origin: MessageOrigin::Normal,
            invocations: Vec::new(),
            tool: None,
        }
    }
}
