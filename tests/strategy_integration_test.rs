//! 策略编排集成测试

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use hive::config::EngineConfig;
    use hive::events::{EventListener, EventPipeline};
    use hive::graph::{EdgeCondition, Graph, Node, NodeValue};
    use hive::llm::MockLlm;
    use hive::memory::NoopMemory;
    use hive::prompt::{Message, Prompt, PromptStore, Role, ToolInvocation};
    use hive::stage::{HistoryPolicy, StageOrchestrator, Strategy, ToolMode};
    use hive::tools::{EchoTool, ParamSpec, Tool, ToolRegistry};
    use hive::EngineError;

    /// 在每次 Init / Result 时记录已提交 Prompt 的消息快照
    struct SnapshotListener {
        store: PromptStore,
        inits: Mutex<Vec<Vec<Message>>>,
        results: Mutex<Vec<Vec<Message>>>,
    }

    impl SnapshotListener {
        fn new(store: PromptStore) -> Self {
            Self {
                store,
                inits: Mutex::new(Vec::new()),
                results: Mutex::new(Vec::new()),
            }
        }

        fn committed(&self) -> Vec<Message> {
            self.store.acquire_read().prompt().messages().to_vec()
        }
    }

    #[async_trait]
    impl EventListener for SnapshotListener {
        fn name(&self) -> &str {
            "snapshot"
        }

        async fn on_init(&self, _run_id: &str) -> Result<(), String> {
            self.inits.lock().unwrap().push(self.committed());
            Ok(())
        }

        async fn on_result(&self, _preview: &str) -> Result<(), String> {
            self.results.lock().unwrap().push(self.committed());
            Ok(())
        }
    }

    /// 产生 n 个 echo 调用的扇出图（工具结果逐条写回 Prompt）
    fn fan_out_graph(n: usize) -> Graph {
        Graph::builder("fan", "tools")
            .node(Node::transform("fan", move |_| {
                Ok(NodeValue::ToolCalls(
                    (0..n)
                        .map(|i| {
                            ToolInvocation::new(
                                "echo",
                                serde_json::json!({"text": format!("call {i}")}),
                            )
                        })
                        .collect(),
                ))
            }))
            .node(Node::tool_execute("tools", vec!["echo"]))
            .connect("fan", "tools", EdgeCondition::OnToolCall)
            .build()
            .unwrap()
    }

    fn reply_graph() -> Graph {
        Graph::builder("llm", "done")
            .node(Node::llm_request("llm"))
            .node(Node::transform("done", Ok))
            .connect("llm", "done", EdgeCondition::OnAssistantMessage)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_stage_compress_scenario() {
        // 阶段 A（Static, tools=[echo]）把 Prompt 堆到 120 条，策略 Compress 在 A/B 之间
        // 恰好插入一次压缩；B 看到的历史远小于 120，记忆消息被保留，A 结束时取得的快照不再变化。
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let registry = Arc::new(registry);

        let mut initial = Prompt::with_system("base system");
        initial.push(Message::system("user prefers helix").from_memory());
        let store = PromptStore::new(initial);

        let listener = Arc::new(SnapshotListener::new(store.clone()));
        let mut events = EventPipeline::new();
        events.register(Arc::clone(&listener) as Arc<dyn EventListener>);

        // 压缩摘要出一次 LLM 调用，阶段 B 出一次
        let llm = Arc::new(MockLlm::with_responses(vec!["THE SUMMARY", "final reply"]));

        let orch = StageOrchestrator::new(
            store.clone(),
            Arc::clone(&registry),
            llm,
            Arc::new(NoopMemory),
            events,
            &EngineConfig::default(),
        )
        .unwrap();

        let strategy = Strategy::builder(HistoryPolicy::Compress)
            .stage(
                "a",
                ToolMode::Static(vec!["echo".to_string()]),
                fan_out_graph(118),
            )
            .stage("b", ToolMode::Dynamic, reply_graph())
            .build(&registry)
            .unwrap();

        let out = orch.run(&strategy, NodeValue::Unit).await.unwrap();
        assert!(matches!(out, NodeValue::Message(ref m) if m.content == "final reply"));

        // 阶段 A 结束时：system + memory + 118 条工具结果 = 120
        let results = listener.results.lock().unwrap();
        let stage_a_end = &results[0];
        assert_eq!(stage_a_end.len(), 120);

        // 阶段 B 进场时恰好经过一次压缩：1 条摘要 + 1 条保留的记忆消息
        let inits = listener.inits.lock().unwrap();
        assert_eq!(inits.len(), 2);
        let stage_b_start = &inits[1];
        assert!(stage_b_start.len() < 120);
        assert_eq!(stage_b_start.len(), 2);
        assert!(stage_b_start[0].content.contains("THE SUMMARY"));
        assert!(stage_b_start[1].is_memory());
        assert_eq!(stage_b_start[1].content, "user prefers helix");

        // 阶段 A 结束时取得的快照是独立克隆，后续压缩不改写它
        assert_eq!(stage_a_end.len(), 120);
        assert!(stage_a_end
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .count()
            == 118);
    }

    /// 休眠固定时长的工具，用于取消测试
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps for a while. Args: {\"text\": \"ignored\"}"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::optional("text", "ignored")]
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_cancellation_at_suspension_boundary() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let registry = Arc::new(registry);
        let store = PromptStore::new(Prompt::with_system("base"));

        let orch = StageOrchestrator::new(
            store.clone(),
            Arc::clone(&registry),
            Arc::new(MockLlm::new()),
            Arc::new(NoopMemory),
            EventPipeline::new(),
            &EngineConfig::default(),
        )
        .unwrap();

        let graph = Graph::builder("fan", "tools")
            .node(Node::transform("fan", |_| {
                Ok(NodeValue::ToolCalls(vec![ToolInvocation::new(
                    "slow",
                    serde_json::json!({}),
                )]))
            }))
            .node(Node::tool_execute("tools", vec!["slow"]))
            .connect("fan", "tools", EdgeCondition::OnToolCall)
            .build()
            .unwrap();
        let strategy = Strategy::builder(HistoryPolicy::Persist)
            .stage("a", ToolMode::Dynamic, graph)
            .build(&registry)
            .unwrap();

        let token = orch.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = orch.run(&strategy, NodeValue::Unit).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));

        // 工具未完成，悬挂的写入不提交：Prompt 里没有任何工具结果
        let read = store.acquire_read();
        assert!(!read
            .prompt()
            .messages()
            .iter()
            .any(|m| m.role == Role::ToolResult));
    }

    #[tokio::test]
    async fn test_persist_policy_runs_stages_back_to_back() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let registry = Arc::new(registry);
        let store = PromptStore::new(Prompt::with_system("base"));

        let llm = Arc::new(MockLlm::with_responses(vec!["one", "two", "three"]));
        let orch = StageOrchestrator::new(
            store.clone(),
            Arc::clone(&registry),
            llm,
            Arc::new(NoopMemory),
            EventPipeline::new(),
            &EngineConfig::default(),
        )
        .unwrap();

        let strategy = Strategy::builder(HistoryPolicy::Persist)
            .stage("a", ToolMode::Dynamic, reply_graph())
            .stage("b", ToolMode::Dynamic, reply_graph())
            .stage("c", ToolMode::Dynamic, reply_graph())
            .build(&registry)
            .unwrap();

        let out = orch
            .run(&strategy, NodeValue::Text("start".into()))
            .await
            .unwrap();
        assert!(matches!(out, NodeValue::Message(ref m) if m.content == "three"));

        // 三个阶段的回复全部留在历史中
        let read = store.acquire_read();
        let assistants: Vec<_> = read
            .prompt()
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(assistants, vec!["one", "two", "three"]);
    }
}
