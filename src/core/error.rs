//! 引擎错误类型
//!
//! 与事件管线配合：节点/工具失败先交给 Error 监听器表决，未被处理的错误以终态结果返回调用方。

use thiserror::Error;

/// 引擎运行过程中可能出现的错误（图遍历、工具、压缩、会话、超时等）
#[derive(Error, Debug)]
pub enum EngineError {
    /// 非 finish 节点没有任何出边条件匹配，或图构造不合法（不可达节点、悬空边）
    #[error("Graph traversal error: {0}")]
    GraphTraversal(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// 参数未通过工具声明的参数规格校验，工具本体未被执行
    #[error("Args validation error for tool '{tool}': {reason}")]
    ArgsValidation { tool: String, reason: String },

    #[error("Tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// 压缩计算失败；Prompt 保持原样，不存在部分替换
    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// 写会话独占不变量被破坏（如非阻塞获取时已有持有者）
    #[error("Session conflict: {0}")]
    SessionConflict(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
