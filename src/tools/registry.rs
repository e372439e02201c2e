//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolRegistry 按名注册与查找，
//! ToolDispatcher 在调用前做参数校验并加超时。描述符列表用于向 LLM 通告可用工具。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个参数规格：名称、说明、是否必填
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// 工具描述符：LLM 通告与运行时参数校验共用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数规格、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于调用中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数规格；默认无参数
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 由 Tool 实现导出描述符
pub fn describe(tool: &dyn Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters(),
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / tool_names / descriptors
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 当前注册的全部描述符（Dynamic 阶段直接通告这份列表）
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| describe(t.as_ref())).collect()
    }

    /// 按名称挑选描述符（Static 阶段）；缺失的名字返回 Err
    pub fn descriptors_for(&self, names: &[String]) -> Result<Vec<ToolDescriptor>, String> {
        names
            .iter()
            .map(|n| {
                self.tools
                    .get(n)
                    .map(|t| describe(t.as_ref()))
                    .ok_or_else(|| format!("unknown tool: {n}"))
            })
            .collect()
    }

    /// 动态生成工具 schema JSON，拼入 system prompt 供 LLM 生成正确调用
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<serde_json::Value> = self
            .tools
            .values()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_describe() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        assert!(reg.contains("echo"));
        let descs = reg.descriptors();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].parameters[0].name, "text");
    }

    #[test]
    fn test_descriptors_for_unknown_name_fails() {
        let reg = ToolRegistry::new();
        assert!(reg.descriptors_for(&["missing".to_string()]).is_err());
    }
}
