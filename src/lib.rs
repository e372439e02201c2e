//! Hive - Rust 智能体编排引擎
//!
//! 模块划分：
//! - **compress**: 历史压缩（整段 / 末 N 条 / 分块 / 事实检索四种策略）
//! - **config**: 引擎配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **events**: 生命周期事件管线（Error 监听器可拦截节点失败）
//! - **graph**: 有向图执行引擎（节点、有序条件边、子图递归）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: Concept/Fact/Subject/Scope 与记忆提供方
//! - **prompt**: 消息、Prompt、单写者会话存取、持久化
//! - **stage**: 阶段、策略与阶段编排器（历史转移）
//! - **structured**: 结构化输出事件流与行分类器
//! - **tools**: 工具注册表与并发调度器

pub mod compress;
pub mod config;
pub mod core;
pub mod events;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod stage;
pub mod structured;
pub mod tools;

pub use crate::compress::{CompressionStrategy, Compressor};
pub use crate::core::EngineError;
pub use crate::graph::{Graph, GraphEngine, NodeValue};
pub use crate::stage::{HistoryPolicy, StageOrchestrator, Strategy, ToolMode};
