//! 图边
//!
//! 边按声明顺序求值，第一条条件为真的边被选中；条件是 (上下文, 输出) 的纯函数。
//! 循环合法且引擎不设上限，步数约束由条件自己表达（RunContext 提供访问计数）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::graph::node::{NodeId, NodeValue};
use crate::prompt::Role;

/// 一次图运行的遍历上下文：总步数与各节点已执行次数
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub step: usize,
    visits: HashMap<NodeId, usize>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit_count(&self, node: &str) -> usize {
        self.visits.get(node).copied().unwrap_or(0)
    }

    pub(crate) fn record(&mut self, node: &str) {
        self.step += 1;
        *self.visits.entry(node.to_string()).or_insert(0) += 1;
    }
}

/// 自定义条件谓词
pub type EdgePredicate = Arc<dyn Fn(&RunContext, &NodeValue) -> bool + Send + Sync>;

/// 输出变换（恒等缺省）
pub type EdgeTransform = Arc<dyn Fn(NodeValue) -> NodeValue + Send + Sync>;

/// 边条件；OnAssistantMessage 与 OnToolCall 对带工具调用的助手输出是重叠的，
/// 先声明者先匹配
#[derive(Clone)]
pub enum EdgeCondition {
    Always,
    /// 输出含至少一个工具调用
    OnToolCall,
    /// 输出是助手消息（含带工具调用的）
    OnAssistantMessage,
    /// 输出是工具结果
    OnToolResult,
    /// 输出是被处理过的失败
    OnFailure,
    Custom(EdgePredicate),
}

impl EdgeCondition {
    pub fn matches(&self, ctx: &RunContext, output: &NodeValue) -> bool {
        match self {
            EdgeCondition::Always => true,
            EdgeCondition::OnToolCall => match output {
                NodeValue::ToolCalls(calls) => !calls.is_empty(),
                NodeValue::Message(m) => !m.invocations.is_empty(),
                _ => false,
            },
            EdgeCondition::OnAssistantMessage => match output {
                NodeValue::ToolCalls(_) => true,
                NodeValue::Message(m) => matches!(m.role, Role::Assistant | Role::ToolCall),
                _ => false,
            },
            EdgeCondition::OnToolResult => matches!(output, NodeValue::ToolResults(_)),
            EdgeCondition::OnFailure => output.is_failure(),
            EdgeCondition::Custom(pred) => pred(ctx, output),
        }
    }
}

impl fmt::Debug for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeCondition::Always => "Always",
            EdgeCondition::OnToolCall => "OnToolCall",
            EdgeCondition::OnAssistantMessage => "OnAssistantMessage",
            EdgeCondition::OnToolResult => "OnToolResult",
            EdgeCondition::OnFailure => "OnFailure",
            EdgeCondition::Custom(_) => "Custom",
        };
        write!(f, "{name}")
    }
}

/// 条件转移：目标节点 + 条件 + 可选输出变换
#[derive(Clone)]
pub struct Edge {
    pub to: NodeId,
    pub condition: EdgeCondition,
    pub transform: Option<EdgeTransform>,
}

impl Edge {
    pub fn new(to: impl Into<NodeId>, condition: EdgeCondition) -> Self {
        Self {
            to: to.into(),
            condition,
            transform: None,
        }
    }

    pub fn with_transform(
        mut self,
        f: impl Fn(NodeValue) -> NodeValue + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// 应用输出变换（无变换时恒等）
    pub fn apply(&self, output: NodeValue) -> NodeValue {
        match &self.transform {
            Some(f) => f(output),
            None => output,
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("to", &self.to)
            .field("condition", &self.condition)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Message, ToolInvocation};

    #[test]
    fn test_tool_call_and_assistant_conditions_overlap() {
        let ctx = RunContext::new();
        let with_calls = NodeValue::ToolCalls(vec![ToolInvocation::new(
            "echo",
            serde_json::json!({"text": "hi"}),
        )]);
        let plain = NodeValue::Message(Message::assistant("hello"));

        assert!(EdgeCondition::OnToolCall.matches(&ctx, &with_calls));
        assert!(EdgeCondition::OnAssistantMessage.matches(&ctx, &with_calls));
        assert!(!EdgeCondition::OnToolCall.matches(&ctx, &plain));
        assert!(EdgeCondition::OnAssistantMessage.matches(&ctx, &plain));
    }

    #[test]
    fn test_custom_condition_sees_visit_counts() {
        let mut ctx = RunContext::new();
        let cond = EdgeCondition::Custom(Arc::new(|ctx, _| ctx.visit_count("n") < 2));
        assert!(cond.matches(&ctx, &NodeValue::Unit));
        ctx.record("n");
        ctx.record("n");
        assert!(!cond.matches(&ctx, &NodeValue::Unit));
    }

    #[test]
    fn test_edge_transform_defaults_to_identity() {
        let edge = Edge::new("next", EdgeCondition::Always);
        assert!(matches!(edge.apply(NodeValue::Text("x".into())), NodeValue::Text(s) if s == "x"));

        let upper = Edge::new("next", EdgeCondition::Always).with_transform(|v| match v {
            NodeValue::Text(s) => NodeValue::Text(s.to_uppercase()),
            other => other,
        });
        assert!(matches!(upper.apply(NodeValue::Text("x".into())), NodeValue::Text(s) if s == "X"));
    }
}
