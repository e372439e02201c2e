//! 事件管线
//!
//! 生命周期点 {Init, BeforeToolCall, AfterToolCall, Result, Error}；监听器按注册顺序同步调用，
//! 单个监听器的失败记日志后隔离，不影响后续监听器。只有 Error 监听器影响控制流：
//! 任一返回 true 即视为错误已处理，运行继续；全部 false（或无监听器）时错误按终态上抛。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::EngineError;

/// 可序列化的运行事件（供前端/日志消费）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 一次图运行开始
    Init { run_id: String },
    /// 即将调用工具
    BeforeToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    AfterToolCall {
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 运行产出终值
    Result { preview: String },
    /// 错误
    Error { text: String },
}

/// 监听器 trait：普通点返回 Result 以便隔离失败；on_error 返回「是否已处理」
#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    async fn on_init(&self, _run_id: &str) -> Result<(), String> {
        Ok(())
    }

    async fn on_before_tool_call(
        &self,
        _tool: &str,
        _args: &serde_json::Value,
    ) -> Result<(), String> {
        Ok(())
    }

    async fn on_after_tool_call(
        &self,
        _tool: &str,
        _ok: bool,
        _preview: &str,
    ) -> Result<(), String> {
        Ok(())
    }

    async fn on_result(&self, _preview: &str) -> Result<(), String> {
        Ok(())
    }

    /// 返回 true 表示错误已被处理，运行可以继续
    async fn on_error(&self, _error: &EngineError) -> bool {
        false
    }
}

/// 事件管线：有序监听器列表
#[derive(Default, Clone)]
pub struct EventPipeline {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub async fn emit_init(&self, run_id: &str) {
        for l in &self.listeners {
            if let Err(e) = l.on_init(run_id).await {
                tracing::warn!(listener = l.name(), error = %e, "listener failed on init");
            }
        }
    }

    pub async fn emit_before_tool_call(&self, tool: &str, args: &serde_json::Value) {
        for l in &self.listeners {
            if let Err(e) = l.on_before_tool_call(tool, args).await {
                tracing::warn!(listener = l.name(), error = %e, "listener failed on before_tool_call");
            }
        }
    }

    pub async fn emit_after_tool_call(&self, tool: &str, ok: bool, preview: &str) {
        for l in &self.listeners {
            if let Err(e) = l.on_after_tool_call(tool, ok, preview).await {
                tracing::warn!(listener = l.name(), error = %e, "listener failed on after_tool_call");
            }
        }
    }

    pub async fn emit_result(&self, preview: &str) {
        for l in &self.listeners {
            if let Err(e) = l.on_result(preview).await {
                tracing::warn!(listener = l.name(), error = %e, "listener failed on result");
            }
        }
    }

    /// 所有 Error 监听器都会被调用；任一返回 true 即视为已处理
    pub async fn offer_error(&self, error: &EngineError) -> bool {
        let mut handled = false;
        for l in &self.listeners {
            if l.on_error(error).await {
                handled = true;
            }
        }
        handled
    }
}

/// 将事件转发到 mpsc 通道的监听器（Web/SSE 等前端用）
pub struct ChannelListener {
    tx: tokio::sync::mpsc::UnboundedSender<RunEvent>,
}

impl ChannelListener {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventListener for ChannelListener {
    fn name(&self) -> &str {
        "channel"
    }

    async fn on_init(&self, run_id: &str) -> Result<(), String> {
        let _ = self.tx.send(RunEvent::Init {
            run_id: run_id.to_string(),
        });
        Ok(())
    }

    async fn on_before_tool_call(
        &self,
        tool: &str,
        args: &serde_json::Value,
    ) -> Result<(), String> {
        let _ = self.tx.send(RunEvent::BeforeToolCall {
            tool: tool.to_string(),
            args: args.clone(),
        });
        Ok(())
    }

    async fn on_after_tool_call(&self, tool: &str, ok: bool, preview: &str) -> Result<(), String> {
        let _ = self.tx.send(RunEvent::AfterToolCall {
            tool: tool.to_string(),
            ok,
            preview: preview.to_string(),
        });
        Ok(())
    }

    async fn on_result(&self, preview: &str) -> Result<(), String> {
        let _ = self.tx.send(RunEvent::Result {
            preview: preview.to_string(),
        });
        Ok(())
    }

    async fn on_error(&self, error: &EngineError) -> bool {
        let _ = self.tx.send(RunEvent::Error {
            text: error.to_string(),
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: String,
        fail: bool,
        handles_errors: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_init(&self, _run_id: &str) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("listener exploded".to_string());
            }
            Ok(())
        }

        async fn on_error(&self, _error: &EngineError) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.handles_errors
        }
    }

    fn recorder(name: &str, fail: bool, handles: bool) -> (Arc<Recorder>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Recorder {
                name: name.to_string(),
                fail,
                handles_errors: handles,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_listener_failure_is_isolated() {
        let mut pipeline = EventPipeline::new();
        let (failing, c1) = recorder("failing", true, false);
        let (healthy, c2) = recorder("healthy", false, false);
        pipeline.register(failing);
        pipeline.register(healthy);

        pipeline.emit_init("run-1").await;
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_handled_when_any_listener_votes_true() {
        let mut pipeline = EventPipeline::new();
        let (ignoring, _) = recorder("ignoring", false, false);
        let (handling, _) = recorder("handling", false, true);
        pipeline.register(ignoring);
        pipeline.register(handling);

        assert!(pipeline.offer_error(&EngineError::Cancelled).await);
    }

    #[tokio::test]
    async fn test_error_unhandled_without_listeners() {
        let pipeline = EventPipeline::new();
        assert!(!pipeline.offer_error(&EngineError::Cancelled).await);
    }

    #[tokio::test]
    async fn test_all_error_listeners_run_even_after_handled() {
        let mut pipeline = EventPipeline::new();
        let (first, c1) = recorder("first", false, true);
        let (second, c2) = recorder("second", false, false);
        pipeline.register(first);
        pipeline.register(second);

        assert!(pipeline.offer_error(&EngineError::Cancelled).await);
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
    }
}
