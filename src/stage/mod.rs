//! 阶段与策略
//!
//! Strategy = 有序 Stage 列表 + 历史转移策略 {Persist, Compress, Clear}。
//! Static 阶段的工具覆盖在 build 时校验（fail fast），运行期不再检查图引用的工具是否声明。

pub mod orchestrator;

pub use orchestrator::StageOrchestrator;

use crate::core::EngineError;
use crate::graph::Graph;
use crate::tools::ToolRegistry;

/// 阶段的工具可用性模式
#[derive(Debug, Clone)]
pub enum ToolMode {
    /// 固定工具集：构造期校验、运行期不增长
    Static(Vec<String>),
    /// 活动注册表当下暴露什么就通告什么
    Dynamic,
}

/// 一个命名阶段：工具模式 + 一张图
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub tool_mode: ToolMode,
    pub graph: Graph,
}

/// 阶段间历史转移策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// 原样携带 Prompt 进入下一阶段
    Persist,
    /// 两阶段之间恰好插入一次压缩（首阶段前、末阶段后不插）
    Compress,
    /// 重置 Prompt 为原始 system 消息
    Clear,
}

/// 有序阶段序列 + 历史策略
#[derive(Debug, Clone)]
pub struct Strategy {
    stages: Vec<Stage>,
    policy: HistoryPolicy,
}

impl Strategy {
    pub fn builder(policy: HistoryPolicy) -> StrategyBuilder {
        StrategyBuilder {
            policy,
            stages: Vec::new(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }
}

/// 策略构造器；build 时做 Static 工具覆盖校验
pub struct StrategyBuilder {
    policy: HistoryPolicy,
    stages: Vec<Stage>,
}

impl StrategyBuilder {
    pub fn stage(mut self, name: impl Into<String>, tool_mode: ToolMode, graph: Graph) -> Self {
        self.stages.push(Stage {
            name: name.into(),
            tool_mode,
            graph,
        });
        self
    }

    pub fn build(self, registry: &ToolRegistry) -> Result<Strategy, EngineError> {
        if self.stages.is_empty() {
            return Err(EngineError::Config(
                "strategy requires at least one stage".to_string(),
            ));
        }
        for stage in &self.stages {
            if let ToolMode::Static(declared) = &stage.tool_mode {
                for name in declared {
                    if !registry.contains(name) {
                        return Err(EngineError::Config(format!(
                            "stage '{}' declares unknown tool '{name}'",
                            stage.name
                        )));
                    }
                }
                for referenced in stage.graph.referenced_tools() {
                    if !declared.contains(&referenced) {
                        return Err(EngineError::Config(format!(
                            "stage '{}' graph references tool '{referenced}' outside its static tool set",
                            stage.name
                        )));
                    }
                }
            }
        }
        Ok(Strategy {
            policy: self.policy,
            stages: self.stages,
        })
    }
}

/// 执行计划项：跑某个阶段，或执行一次阶段间转移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanItem {
    RunStage(usize),
    Transition,
}

/// 纯列表变换：[s1..sn] -> [s1, X, s2, ..., X, sn]；X 不出现在首阶段前、末阶段后。
/// Persist 无转移动作，计划只含阶段本身。
pub fn execution_plan(stage_count: usize, policy: HistoryPolicy) -> Vec<PlanItem> {
    let mut plan = Vec::new();
    for i in 0..stage_count {
        if i > 0 && policy != HistoryPolicy::Persist {
            plan.push(PlanItem::Transition);
        }
        plan.push(PlanItem::RunStage(i));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeCondition, Node};
    use crate::tools::EchoTool;

    fn tool_graph(tools: Vec<&str>) -> Graph {
        Graph::builder("t", "done")
            .node(Node::tool_execute("t", tools))
            .node(Node::transform("done", Ok))
            .connect("t", "done", EdgeCondition::Always)
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_interleaves_transitions() {
        let plan = execution_plan(3, HistoryPolicy::Compress);
        assert_eq!(
            plan,
            vec![
                PlanItem::RunStage(0),
                PlanItem::Transition,
                PlanItem::RunStage(1),
                PlanItem::Transition,
                PlanItem::RunStage(2),
            ]
        );
    }

    #[test]
    fn test_plan_persist_has_no_transitions() {
        let plan = execution_plan(3, HistoryPolicy::Persist);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| matches!(p, PlanItem::RunStage(_))));
    }

    #[test]
    fn test_plan_single_stage_has_no_transition() {
        assert_eq!(
            execution_plan(1, HistoryPolicy::Compress),
            vec![PlanItem::RunStage(0)]
        );
        assert!(execution_plan(0, HistoryPolicy::Clear).is_empty());
    }

    #[test]
    fn test_static_stage_tool_coverage_validated_at_build() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        // 图引用了未声明的工具
        let err = Strategy::builder(HistoryPolicy::Persist)
            .stage(
                "a",
                ToolMode::Static(vec!["echo".to_string()]),
                tool_graph(vec!["echo", "grep"]),
            )
            .build(&registry)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        // 声明了注册表没有的工具
        let err = Strategy::builder(HistoryPolicy::Persist)
            .stage(
                "a",
                ToolMode::Static(vec!["ghost".to_string()]),
                tool_graph(vec![]),
            )
            .build(&registry)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        // 合法组合
        assert!(Strategy::builder(HistoryPolicy::Persist)
            .stage(
                "a",
                ToolMode::Static(vec!["echo".to_string()]),
                tool_graph(vec!["echo"]),
            )
            .build(&registry)
            .is_ok());
    }

    #[test]
    fn test_dynamic_stage_skips_tool_validation() {
        let registry = ToolRegistry::new();
        assert!(Strategy::builder(HistoryPolicy::Compress)
            .stage("a", ToolMode::Dynamic, tool_graph(vec!["anything"]))
            .build(&registry)
            .is_ok());
    }

    #[test]
    fn test_empty_strategy_rejected() {
        let registry = ToolRegistry::new();
        assert!(Strategy::builder(HistoryPolicy::Persist)
            .build(&registry)
            .is_err());
    }
}
