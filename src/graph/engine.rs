//! 图执行引擎
//!
//! 单控制线程遍历：执行当前节点 -> 按声明顺序取第一条条件为真的出边 -> 应用边变换 -> 前进，
//! 到 finish 终止；非 finish 节点无边匹配时以 GraphTraversal 失败，不做静默重试。
//! 挂起点（LLM、工具、压缩）处响应取消：持有的写会话不提交直接释放，返回 Cancelled。
//! 节点失败先交 Error 监听器表决，被处理的失败化为 Failure 值继续路由。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::compress::{CompressionStrategy, Compressor};
use crate::core::EngineError;
use crate::events::EventPipeline;
use crate::graph::edge::RunContext;
use crate::graph::node::{Node, NodeKind, NodeValue};
use crate::graph::Graph;
use crate::llm::LlmClient;
use crate::prompt::{Message, PromptStore, Role, ToolInvocation, WriteSession};
use crate::tools::{ToolCall, ToolDispatcher, ToolOutput};

/// 从 LLM 文本输出解析工具调用（```json 围栏或裸 JSON）；
/// 支持单调用 {"tool","args"} 与多调用 {"calls":[...]}，解析不出则视为普通回复
pub fn parse_tool_calls(output: &str) -> Vec<ToolInvocation> {
    #[derive(Deserialize)]
    struct Single {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
    }
    #[derive(Deserialize)]
    struct Many {
        calls: Vec<Single>,
    }

    fn to_invocation(s: Single) -> ToolInvocation {
        let args = if s.args.is_null() {
            serde_json::json!({})
        } else {
            s.args
        };
        ToolInvocation::new(s.tool, args)
    }

    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        }
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end <= start {
            return Vec::new();
        }
        &trimmed[start..=end]
    } else {
        return Vec::new();
    };

    if let Ok(many) = serde_json::from_str::<Many>(json_str) {
        return many
            .calls
            .into_iter()
            .filter(|c| !c.tool.is_empty())
            .map(to_invocation)
            .collect();
    }
    if let Ok(single) = serde_json::from_str::<Single>(json_str) {
        if !single.tool.is_empty() {
            return vec![to_invocation(single)];
        }
    }
    Vec::new()
}

/// 图执行引擎；克隆共享全部协作方
#[derive(Clone)]
pub struct GraphEngine {
    store: PromptStore,
    dispatcher: ToolDispatcher,
    llm: Arc<dyn LlmClient>,
    compressor: Arc<Compressor>,
    events: EventPipeline,
    cancel: CancellationToken,
    llm_timeout: Duration,
    preserve_memory: bool,
    /// Static 阶段的工具集合；None 表示不限制（Dynamic）
    allowed_tools: Option<Vec<String>>,
}

impl GraphEngine {
    pub fn new(
        store: PromptStore,
        dispatcher: ToolDispatcher,
        llm: Arc<dyn LlmClient>,
        compressor: Arc<Compressor>,
        events: EventPipeline,
    ) -> Self {
        Self {
            store,
            dispatcher,
            llm,
            compressor,
            events,
            cancel: CancellationToken::new(),
            llm_timeout: Duration::from_secs(60),
            preserve_memory: true,
            allowed_tools: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_llm_timeout(mut self, secs: u64) -> Self {
        self.llm_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_preserve_memory(mut self, preserve: bool) -> Self {
        self.preserve_memory = preserve;
        self
    }

    pub fn with_allowed_tools(mut self, tools: Option<Vec<String>>) -> Self {
        self.allowed_tools = tools;
        self
    }

    pub fn store(&self) -> &PromptStore {
        &self.store
    }

    /// 执行一张图：initial 作为 start 节点输入，返回 finish 节点的输出
    pub async fn run(&self, graph: &Graph, initial: NodeValue) -> Result<NodeValue, EngineError> {
        let run_id = Uuid::new_v4().to_string();
        self.events.emit_init(&run_id).await;
        let result = self.traverse(graph, initial).await;
        match &result {
            Ok(value) => {
                self.events.emit_result(&value.preview()).await;
                tracing::info!(run_id = %run_id, "graph run finished");
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "graph run failed");
            }
        }
        result
    }

    fn traverse<'a>(
        &'a self,
        graph: &'a Graph,
        initial: NodeValue,
    ) -> BoxFuture<'a, Result<NodeValue, EngineError>> {
        Box::pin(async move {
            let mut ctx = RunContext::new();
            let mut current = graph.start().clone();
            let mut value = initial;

            loop {
                if self.cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let node = graph.node(&current).ok_or_else(|| {
                    EngineError::GraphTraversal(format!("unknown node '{current}'"))
                })?;
                tracing::debug!(node = %node.id, kind = ?node.kind, "executing node");

                let output = match self.apply(node, value).await {
                    Ok(v) => v,
                    Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                    Err(e) => {
                        if self.events.offer_error(&e).await {
                            tracing::warn!(node = %node.id, error = %e, "node failure handled by listener");
                            NodeValue::Failure(e.to_string())
                        } else {
                            return Err(e);
                        }
                    }
                };
                ctx.record(&current);

                if current == *graph.finish() {
                    return Ok(output);
                }

                let edge = graph
                    .edges(&current)
                    .iter()
                    .find(|e| e.condition.matches(&ctx, &output))
                    .ok_or_else(|| {
                        EngineError::GraphTraversal(format!(
                            "no outgoing edge of node '{current}' matches its output ({})",
                            output.kind_name()
                        ))
                    })?;
                value = edge.apply(output);
                current = edge.to.clone();
            }
        })
    }

    async fn apply(&self, node: &Node, input: NodeValue) -> Result<NodeValue, EngineError> {
        match &node.kind {
            NodeKind::Transform(f) => f(input),
            NodeKind::LlmRequest => self.apply_llm(input).await,
            NodeKind::ToolExecute { .. } => self.apply_tools(input).await,
            NodeKind::Compress(strategy) => self.apply_compress(strategy).await,
            NodeKind::Subgraph(inner) => self.guard(self.traverse(inner, input)).await,
        }
    }

    /// LLM 节点：入参写入会话，带工具通告调用 LLM，回复（或解析出的调用）追加后提交
    async fn apply_llm(&self, input: NodeValue) -> Result<NodeValue, EngineError> {
        let mut session = self.acquire_write().await?;
        match input {
            NodeValue::Text(s) => session.push(Message::user(s)),
            // 助手消息（含带调用的）已在历史中，环回时不可重复写入
            NodeValue::Message(m) if !matches!(m.role, Role::Assistant | Role::ToolCall) => {
                session.push(m)
            }
            NodeValue::Failure(reason) => {
                session.push(Message::tool_result("error", format!("Error: {reason}")))
            }
            // ToolResults 已由 ToolExecute 节点写入会话；其余值无需入历史
            _ => {}
        }

        let mut request: Vec<Message> = Vec::new();
        let tools = session.prompt().tools();
        if !tools.is_empty() {
            let advert = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
            request.push(Message::system(format!(
                "Available tools (respond with JSON {{\"tool\": \"name\", \"args\": {{...}}}} to call one):\n{advert}"
            )));
        }
        request.extend(session.prompt().messages().iter().cloned());

        let reply = self
            .guard(async {
                timeout(self.llm_timeout, self.llm.complete(&request))
                    .await
                    .map_err(|_| EngineError::Timeout("llm request".to_string()))?
                    .map_err(EngineError::Llm)
            })
            .await?;

        let invocations = parse_tool_calls(&reply.content);
        if invocations.is_empty() {
            session.push(reply.clone());
            session.commit();
            Ok(NodeValue::Message(reply))
        } else {
            session.push(Message::tool_call(reply.content, invocations.clone()));
            session.commit();
            Ok(NodeValue::ToolCalls(invocations))
        }
    }

    /// 工具节点：校验阶段工具集，扇出执行，结果按提交顺序原子写回会话
    async fn apply_tools(&self, input: NodeValue) -> Result<NodeValue, EngineError> {
        let calls = Node::as_tool_calls(&input).ok_or_else(|| {
            EngineError::GraphTraversal(format!(
                "tool-execute node received '{}' value",
                input.kind_name()
            ))
        })?;

        if let Some(allowed) = &self.allowed_tools {
            if let Some(outside) = calls.iter().find(|c| !allowed.contains(&c.tool)) {
                return Err(EngineError::ToolNotFound(format!(
                    "{} (outside stage tool set)",
                    outside.tool
                )));
            }
        }

        for call in &calls {
            self.events.emit_before_tool_call(&call.tool, &call.args).await;
        }

        let requests: Vec<ToolCall> = calls
            .iter()
            .map(|c| ToolCall::by_name(c.tool.clone(), c.args.clone()))
            .collect();
        let results: Vec<Result<ToolOutput, EngineError>> = if requests.len() == 1 {
            let single = self.guard(self.dispatcher.execute(&requests[0])).await;
            if matches!(single, Err(EngineError::Cancelled)) {
                return Err(EngineError::Cancelled);
            }
            vec![single]
        } else {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                results = self.dispatcher.execute_many(requests) => results,
            }
        };

        let mut session = self.acquire_write().await?;
        let mut outputs = Vec::new();
        let mut first_err: Option<EngineError> = None;
        for (call, result) in calls.iter().zip(results) {
            match result {
                Ok(out) => {
                    self.events
                        .emit_after_tool_call(&out.tool, true, &truncate(&out.content))
                        .await;
                    session.push(Message::tool_result(out.tool.clone(), out.content.clone()));
                    outputs.push(out);
                }
                Err(e) => {
                    self.events
                        .emit_after_tool_call(&call.tool, false, &e.to_string())
                        .await;
                    // 失败也作为观察写回，LLM 可在后续轮次看到
                    session.push(Message::tool_result(call.tool.clone(), format!("Error: {e}")));
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        session.commit();

        match first_err {
            Some(e) => Err(e),
            None => Ok(NodeValue::ToolResults(outputs)),
        }
    }

    /// 压缩节点：写会话持有整个压缩期间，替换序列算完才提交，失败时 Prompt 原样
    async fn apply_compress(
        &self,
        strategy: &CompressionStrategy,
    ) -> Result<NodeValue, EngineError> {
        let mut session = self.acquire_write().await?;
        let current = session.prompt().messages().to_vec();
        let replacement = self
            .guard(
                self.compressor
                    .compress(strategy, &current, self.preserve_memory),
            )
            .await?;
        session.prompt_mut().set_messages(replacement.clone());
        session.commit();
        Ok(NodeValue::Messages(replacement))
    }

    async fn acquire_write(&self) -> Result<WriteSession, EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            session = self.store.acquire_write() => Ok(session),
        }
    }

    /// 在挂起点处响应取消
    async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = fut => result,
        }
    }
}

fn truncate(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
