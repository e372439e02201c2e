//! 工具调度器
//!
//! execute 按「实例引用优先于按名查找」解析工具，先做参数校验再进入工具本体，
//! 超时与失败分别映射为 Timeout / ToolExecution；每次调用输出结构化审计日志（JSON）。
//! execute_many 并发派发全部调用（Semaphore 限流），join 后按提交顺序返回结果，
//! 单个失败不取消兄弟调用；fail_fast 变体在首个失败处短路。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{join_all, try_join_all};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::core::EngineError;
use crate::tools::{Tool, ToolRegistry};

/// 被调工具的引用：携带实例时直接使用，否则按名在注册表中解析
#[derive(Clone)]
pub enum ToolRef {
    Instance(Arc<dyn Tool>),
    Name(String),
}

impl std::fmt::Debug for ToolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolRef::Instance(t) => write!(f, "Instance({})", t.name()),
            ToolRef::Name(n) => write!(f, "Name({n})"),
        }
    }
}

/// 一次工具调用请求
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: ToolRef,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn by_name(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: ToolRef::Name(name.into()),
            args,
        }
    }

    pub fn with_instance(tool: Arc<dyn Tool>, args: serde_json::Value) -> Self {
        Self {
            tool: ToolRef::Instance(tool),
            args,
        }
    }

    fn tool_name(&self) -> &str {
        match &self.tool {
            ToolRef::Instance(t) => t.name(),
            ToolRef::Name(n) => n,
        }
    }
}

/// 单次调用的结果
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool: String,
    pub content: String,
}

/// 工具调度器：解析、校验、限时执行；克隆共享注册表与限流器
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    fan_out: Arc<Semaphore>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64, max_concurrent: usize) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            fan_out: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 解析：实例引用优先；按名未命中返回 ToolNotFound
    fn resolve(&self, call: &ToolCall) -> Result<Arc<dyn Tool>, EngineError> {
        match &call.tool {
            ToolRef::Instance(t) => Ok(Arc::clone(t)),
            ToolRef::Name(n) => self
                .registry
                .get(n)
                .ok_or_else(|| EngineError::ToolNotFound(n.clone())),
        }
    }

    /// 按声明的参数规格校验 args；不通过时工具本体不会被执行
    fn validate_args(tool: &dyn Tool, args: &serde_json::Value) -> Result<(), EngineError> {
        let params = tool.parameters();
        if params.is_empty() {
            return Ok(());
        }
        let obj = args.as_object().ok_or_else(|| EngineError::ArgsValidation {
            tool: tool.name().to_string(),
            reason: format!("expected JSON object, got {args}"),
        })?;
        for p in params.iter().filter(|p| p.required) {
            if !obj.contains_key(&p.name) {
                return Err(EngineError::ArgsValidation {
                    tool: tool.name().to_string(),
                    reason: format!("missing required parameter '{}'", p.name),
                });
            }
        }
        Ok(())
    }

    /// 执行单个调用；输出 JSON 审计日志
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, EngineError> {
        let tool = self.resolve(call)?;
        Self::validate_args(tool.as_ref(), &call.args)?;

        let _permit = self
            .fan_out
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(call.args.clone())).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool.name(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(ToolOutput {
                tool: tool.name().to_string(),
                content,
            }),
            Ok(Err(e)) => Err(EngineError::ToolExecution {
                tool: tool.name().to_string(),
                reason: e,
            }),
            Err(_) => Err(EngineError::Timeout(format!("tool {}", tool.name()))),
        }
    }

    /// 并发派发全部调用，join 后按提交顺序返回；失败按位置收集，不影响兄弟调用
    pub async fn execute_many(&self, calls: Vec<ToolCall>) -> Vec<Result<ToolOutput, EngineError>> {
        let handles: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let dispatcher = self.clone();
                tokio::spawn(async move { dispatcher.execute(&call).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(res) => res,
                Err(e) => Err(EngineError::ToolExecution {
                    tool: "<fan-out>".to_string(),
                    reason: format!("worker task failed: {e}"),
                }),
            })
            .collect()
    }

    /// fail-fast 变体：首个失败即返回 Err，未开始的兄弟调用被丢弃
    pub async fn execute_many_fail_fast(
        &self,
        calls: Vec<ToolCall>,
    ) -> Result<Vec<ToolOutput>, EngineError> {
        try_join_all(calls.iter().map(|call| self.execute(call))).await
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, ParamSpec};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录执行次数并按配置延迟/失败的测试工具
    struct CountingTool {
        name: String,
        delay_ms: u64,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl CountingTool {
        fn new(name: &str, delay_ms: u64, fail: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name: name.to_string(),
                    delay_ms,
                    fail,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "counting tool"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("idx", "submission index")]
        }

        async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err("simulated failure".to_string());
            }
            Ok(format!("idx={}", args["idx"]))
        }
    }

    fn dispatcher_with(tools: Vec<Arc<dyn Tool>>) -> ToolDispatcher {
        let mut reg = ToolRegistry::new();
        for t in tools {
            reg.register_arc(t);
        }
        ToolDispatcher::new(Arc::new(reg), 5, 8)
    }

    #[tokio::test]
    async fn test_unknown_name_is_tool_not_found() {
        let d = dispatcher_with(vec![]);
        let err = d
            .execute(&ToolCall::by_name("missing", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_required_arg_never_enters_body() {
        let (tool, calls) = CountingTool::new("counter", 0, false);
        let d = dispatcher_with(vec![Arc::new(tool)]);
        let err = d
            .execute(&ToolCall::by_name("counter", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ArgsValidation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_instance_reference_beats_name_lookup() {
        // 注册表中有同名 echo；携带实例引用时应直接用实例
        let (shadow, calls) = CountingTool::new("echo", 0, false);
        let d = dispatcher_with(vec![Arc::new(EchoTool)]);
        let out = d
            .execute(&ToolCall::with_instance(
                Arc::new(shadow),
                serde_json::json!({"idx": 7}),
            ))
            .await
            .unwrap();
        assert_eq!(out.content, "idx=7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_many_preserves_submission_order() {
        // 前面的调用更慢：完成顺序与提交顺序相反，结果仍按提交顺序排列
        let (slow, _) = CountingTool::new("slow", 80, false);
        let (fast, _) = CountingTool::new("fast", 0, false);
        let d = dispatcher_with(vec![Arc::new(slow), Arc::new(fast)]);

        let calls = vec![
            ToolCall::by_name("slow", serde_json::json!({"idx": 0})),
            ToolCall::by_name("fast", serde_json::json!({"idx": 1})),
            ToolCall::by_name("fast", serde_json::json!({"idx": 2})),
        ];
        let results = d.execute_many(calls).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().content, "idx=0");
        assert_eq!(results[1].as_ref().unwrap().content, "idx=1");
        assert_eq!(results[2].as_ref().unwrap().content, "idx=2");
    }

    #[tokio::test]
    async fn test_failure_collected_positionally_without_cancelling_siblings() {
        let (bad, _) = CountingTool::new("bad", 0, true);
        let (good, good_calls) = CountingTool::new("good", 20, false);
        let d = dispatcher_with(vec![Arc::new(bad), Arc::new(good)]);

        let results = d
            .execute_many(vec![
                ToolCall::by_name("bad", serde_json::json!({"idx": 0})),
                ToolCall::by_name("good", serde_json::json!({"idx": 1})),
            ])
            .await;
        assert!(matches!(
            results[0],
            Err(EngineError::ToolExecution { .. })
        ));
        assert_eq!(results[1].as_ref().unwrap().content, "idx=1");
        assert_eq!(good_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_short_circuits() {
        let (bad, _) = CountingTool::new("bad", 0, true);
        let (good, _) = CountingTool::new("good", 0, false);
        let d = dispatcher_with(vec![Arc::new(bad), Arc::new(good)]);

        let err = d
            .execute_many_fail_fast(vec![
                ToolCall::by_name("bad", serde_json::json!({"idx": 0})),
                ToolCall::by_name("good", serde_json::json!({"idx": 1})),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_tool_timeout_maps_to_timeout_error() {
        let (hang, _) = CountingTool::new("hang", 10_000, false);
        let mut reg = ToolRegistry::new();
        reg.register_arc(Arc::new(hang) as Arc<dyn Tool>);
        let d = ToolDispatcher::new(Arc::new(reg), 1, 4);

        let err = d
            .execute(&ToolCall::by_name("hang", serde_json::json!({"idx": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }
}
