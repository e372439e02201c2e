//! 阶段编排器
//!
//! 按计划顺序驱动各阶段的图执行；进入阶段前按工具模式换上通告列表，
//! 阶段之间执行历史转移（Compress 用配置的默认策略，Clear 重置到原始 system 消息）。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::compress::{CompressionStrategy, Compressor};
use crate::config::EngineConfig;
use crate::core::EngineError;
use crate::events::EventPipeline;
use crate::graph::{GraphEngine, NodeValue};
use crate::llm::LlmClient;
use crate::memory::{MemoryProvider, Scope};
use crate::prompt::{PromptStore, WriteSession};
use crate::stage::{execution_plan, HistoryPolicy, PlanItem, Stage, Strategy, ToolMode};
use crate::tools::{ToolDispatcher, ToolRegistry};

/// 阶段编排器：持有全部协作方，按 Strategy 驱动
pub struct StageOrchestrator {
    store: PromptStore,
    registry: Arc<ToolRegistry>,
    base_engine: GraphEngine,
    compressor: Arc<Compressor>,
    default_strategy: CompressionStrategy,
    preserve_memory: bool,
    cancel: CancellationToken,
}

impl StageOrchestrator {
    pub fn new(
        store: PromptStore,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        memory: Arc<dyn MemoryProvider>,
        events: EventPipeline,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let default_strategy = config.compression.strategy()?;
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&registry),
            config.engine.tool_timeout_secs,
            config.engine.max_concurrent_tools,
        );
        let compressor = Arc::new(
            Compressor::new(
                Arc::clone(&llm),
                memory,
                config.engine.compression_timeout_secs,
            )
            .with_subject(config.memory.subject()?, Scope::named(&config.memory.scope)),
        );
        let cancel = CancellationToken::new();
        let base_engine = GraphEngine::new(
            store.clone(),
            dispatcher,
            llm,
            Arc::clone(&compressor),
            events,
        )
        .with_llm_timeout(config.engine.llm_timeout_secs)
        .with_preserve_memory(config.compression.preserve_memory)
        .with_cancel_token(cancel.clone());

        Ok(Self {
            store,
            registry,
            base_engine,
            compressor,
            default_strategy,
            preserve_memory: config.compression.preserve_memory,
            cancel,
        })
    }

    /// 取消令牌；cancel() 后运行在下一个挂起点返回 Cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &PromptStore {
        &self.store
    }

    /// 按阶段列表顺序执行策略；阶段 i 的终值作为阶段 i+1 的初值
    pub async fn run(
        &self,
        strategy: &Strategy,
        initial: NodeValue,
    ) -> Result<NodeValue, EngineError> {
        let plan = execution_plan(strategy.stages().len(), strategy.policy());
        let mut value = initial;
        for item in plan {
            match item {
                PlanItem::RunStage(i) => {
                    let stage = &strategy.stages()[i];
                    let allowed = self.enter_stage(stage).await?;
                    tracing::info!(stage = %stage.name, "running stage");
                    let engine = self.base_engine.clone().with_allowed_tools(allowed);
                    value = engine.run(&stage.graph, value).await?;
                }
                PlanItem::Transition => {
                    self.apply_transition(strategy.policy()).await?;
                }
            }
        }
        Ok(value)
    }

    /// 通告该阶段的工具列表；Static 阶段返回运行期的限制集合
    async fn enter_stage(&self, stage: &Stage) -> Result<Option<Vec<String>>, EngineError> {
        let (descriptors, allowed) = match &stage.tool_mode {
            ToolMode::Static(names) => {
                let descriptors = self
                    .registry
                    .descriptors_for(names)
                    .map_err(EngineError::Config)?;
                (descriptors, Some(names.clone()))
            }
            ToolMode::Dynamic => (self.registry.descriptors(), None),
        };
        let mut session = self.acquire_write().await?;
        session.set_tools(descriptors);
        session.commit();
        Ok(allowed)
    }

    async fn apply_transition(&self, policy: HistoryPolicy) -> Result<(), EngineError> {
        match policy {
            HistoryPolicy::Persist => Ok(()),
            HistoryPolicy::Compress => {
                let mut session = self.acquire_write().await?;
                let current = session.prompt().messages().to_vec();
                let before = current.len();
                let replacement = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(EngineError::Cancelled),
                    r = self.compressor.compress(&self.default_strategy, &current, self.preserve_memory) => r?,
                };
                let after = replacement.len();
                session.prompt_mut().set_messages(replacement);
                session.commit();
                tracing::info!(before, after, "inter-stage compression applied");
                Ok(())
            }
            HistoryPolicy::Clear => {
                let mut session = self.acquire_write().await?;
                session.prompt_mut().reset_to_system();
                session.commit();
                tracing::info!("history cleared between stages");
                Ok(())
            }
        }
    }

    async fn acquire_write(&self) -> Result<WriteSession, EngineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            session = self.store.acquire_write() => Ok(session),
        }
    }
}
