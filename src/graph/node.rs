//! 图节点
//!
//! 节点操作是显式的标签变体 {Transform, LlmRequest, ToolExecute, Compress, Subgraph}，
//! 统一以 NodeValue 作为输入/输出在边上流动，引擎按变体分派执行。

use std::fmt;
use std::sync::Arc;

use crate::compress::CompressionStrategy;
use crate::core::EngineError;
use crate::graph::Graph;
use crate::prompt::{Message, ToolInvocation};
use crate::tools::ToolOutput;

pub type NodeId = String;

/// 在边上流动的统一值
#[derive(Debug, Clone)]
pub enum NodeValue {
    Unit,
    Text(String),
    Message(Message),
    Messages(Vec<Message>),
    ToolCalls(Vec<ToolInvocation>),
    ToolResults(Vec<ToolOutput>),
    Json(serde_json::Value),
    /// 被 Error 监听器处理过的节点失败；边条件可据此路由恢复路径
    Failure(String),
}

impl NodeValue {
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeValue::Failure(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeValue::Unit => "unit",
            NodeValue::Text(_) => "text",
            NodeValue::Message(_) => "message",
            NodeValue::Messages(_) => "messages",
            NodeValue::ToolCalls(_) => "tool-calls",
            NodeValue::ToolResults(_) => "tool-results",
            NodeValue::Json(_) => "json",
            NodeValue::Failure(_) => "failure",
        }
    }

    /// 事件/日志用预览（截断）
    pub fn preview(&self) -> String {
        let raw = match self {
            NodeValue::Unit => String::new(),
            NodeValue::Text(s) => s.clone(),
            NodeValue::Message(m) => m.content.clone(),
            NodeValue::Messages(ms) => format!("{} messages", ms.len()),
            NodeValue::ToolCalls(cs) => format!("{} tool calls", cs.len()),
            NodeValue::ToolResults(rs) => format!("{} tool results", rs.len()),
            NodeValue::Json(v) => v.to_string(),
            NodeValue::Failure(e) => format!("failure: {e}"),
        };
        if raw.len() > 200 {
            format!("{}...", raw.chars().take(200).collect::<String>())
        } else {
            raw
        }
    }
}

/// Transform 节点的操作：纯函数，错误由作者用 EngineError 表达
pub type TransformFn = Arc<dyn Fn(NodeValue) -> Result<NodeValue, EngineError> + Send + Sync>;

/// 节点操作变体
#[derive(Clone)]
pub enum NodeKind {
    /// 纯变换
    Transform(TransformFn),
    /// 快照 Prompt 调用 LLM，解析出工具调用则输出 ToolCalls，否则输出 Message
    LlmRequest,
    /// 执行输入中的工具调用（多于一个时并发扇出）；tools 声明本节点会用到的工具名，
    /// 供 Static 阶段在构造期校验
    ToolExecute { tools: Vec<String> },
    /// 以指定策略压缩 Prompt 历史
    Compress(CompressionStrategy),
    /// 递归执行嵌套图，其终值即本节点输出
    Subgraph(Box<Graph>),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Transform(_) => write!(f, "Transform"),
            NodeKind::LlmRequest => write!(f, "LlmRequest"),
            NodeKind::ToolExecute { tools } => write!(f, "ToolExecute({tools:?})"),
            NodeKind::Compress(s) => write!(f, "Compress({s:?})"),
            NodeKind::Subgraph(_) => write!(f, "Subgraph"),
        }
    }
}

/// 图节点：标识 + 操作；归属声明它的图
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Transform 节点的简写
    pub fn transform(
        id: impl Into<NodeId>,
        f: impl Fn(NodeValue) -> Result<NodeValue, EngineError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(id, NodeKind::Transform(Arc::new(f)))
    }

    pub fn llm_request(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::LlmRequest)
    }

    pub fn tool_execute(id: impl Into<NodeId>, tools: Vec<&str>) -> Self {
        Self::new(
            id,
            NodeKind::ToolExecute {
                tools: tools.into_iter().map(String::from).collect(),
            },
        )
    }

    pub fn compress(id: impl Into<NodeId>, strategy: CompressionStrategy) -> Self {
        Self::new(id, NodeKind::Compress(strategy))
    }

    pub fn subgraph(id: impl Into<NodeId>, graph: Graph) -> Self {
        Self::new(id, NodeKind::Subgraph(Box::new(graph)))
    }

    /// 从 Message 中取出 ToolInvocation 的透传辅助（ToolCall 消息 -> ToolCalls 值）
    pub fn as_tool_calls(value: &NodeValue) -> Option<Vec<ToolInvocation>> {
        match value {
            NodeValue::ToolCalls(calls) if !calls.is_empty() => Some(calls.clone()),
            NodeValue::Message(m) if !m.invocations.is_empty() => Some(m.invocations.clone()),
            _ => None,
        }
    }
}
