//! 历史压缩
//!
//! compress 对输入序列是纯变换（摘要/事实抽取委托给 LLM 与记忆提供方），四种策略可插拔。
//! preserve_memory 为 true 时，记忆来源消息不进入任何策略的丢弃范围，按原相对顺序追加回结果，
//! 对所有策略无一例外。完整替换序列在触碰 Prompt 之前算完，失败时 Prompt 保持原样。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::EngineError;
use crate::llm::LlmClient;
use crate::memory::{Concept, ConceptArity, Fact, MemoryProvider, Scope, Subject};
use crate::prompt::{Message, Role};

/// 压缩策略
#[derive(Clone, Debug)]
pub enum CompressionStrategy {
    /// 整段历史压成一条摘要消息
    WholeHistory,
    /// 只摘要最后 n 条；更早的消息直接丢弃（不摘要）。n >= 长度时等价于 WholeHistory
    FromLastN(usize),
    /// 按 size 连续分块，逐块摘要，保持时间顺序。size >= 长度时一块；size == 1 时逐条摘要
    Chunked(usize),
    /// 逐概念检索事实，整段历史替换为每条事实一条消息（按概念声明顺序）
    RetrieveFacts(Vec<Concept>),
}

impl CompressionStrategy {
    /// 构造期校验：Chunked(0) 非法
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            CompressionStrategy::Chunked(0) => Err(EngineError::Config(
                "Chunked strategy requires size >= 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// 历史压缩器：持有 LLM 与记忆提供方，所有委托调用施加单独超时
pub struct Compressor {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryProvider>,
    timeout: Duration,
    subject: Subject,
    scope: Scope,
}

impl Compressor {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<dyn MemoryProvider>, timeout_secs: u64) -> Self {
        Self {
            llm,
            memory,
            timeout: Duration::from_secs(timeout_secs),
            subject: Subject::User,
            scope: Scope::global(),
        }
    }

    pub fn with_subject(mut self, subject: Subject, scope: Scope) -> Self {
        self.subject = subject;
        self.scope = scope;
        self
    }

    /// 执行压缩，返回完整替换序列；任何失败都不产生部分结果
    pub async fn compress(
        &self,
        strategy: &CompressionStrategy,
        messages: &[Message],
        preserve_memory: bool,
    ) -> Result<Vec<Message>, EngineError> {
        strategy.validate()?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // 记忆来源消息先行摘出，策略只作用于其余部分
        let (work, kept): (Vec<Message>, Vec<Message>) = if preserve_memory {
            let mut work = Vec::new();
            let mut kept = Vec::new();
            for m in messages {
                if m.is_memory() {
                    kept.push(m.clone());
                } else {
                    work.push(m.clone());
                }
            }
            (work, kept)
        } else {
            (messages.to_vec(), Vec::new())
        };

        let mut result = match strategy {
            CompressionStrategy::WholeHistory => self.whole_history(&work).await?,
            CompressionStrategy::FromLastN(n) => {
                if *n >= work.len() {
                    self.whole_history(&work).await?
                } else {
                    let window = &work[work.len() - n..];
                    self.whole_history(window).await?
                }
            }
            CompressionStrategy::Chunked(size) => {
                let mut out = Vec::new();
                for chunk in work.chunks(*size) {
                    out.extend(self.whole_history(chunk).await?);
                }
                out
            }
            CompressionStrategy::RetrieveFacts(concepts) => {
                self.retrieve_facts(concepts, &work).await?
            }
        };

        result.extend(kept);
        tracing::debug!(
            before = messages.len(),
            after = result.len(),
            "history compressed"
        );
        Ok(result)
    }

    /// 一段消息 -> 一条摘要消息；空输入原样返回
    async fn whole_history(&self, messages: &[Message]) -> Result<Vec<Message>, EngineError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let request = vec![
            Message::system(
                "Summarize the following conversation transcript into one concise paragraph. \
                 Keep decisions, facts and open tasks; drop pleasantries.",
            ),
            Message::user(render_transcript(messages)),
        ];
        let reply = timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| EngineError::Timeout("compression summarization".to_string()))?
            .map_err(EngineError::Compression)?;
        Ok(vec![Message::system(format!(
            "Previous conversation summary:\n\n{}",
            reply.content
        ))])
    }

    /// 逐概念取事实：记忆提供方有的直接用，其余交给 LLM 从历史抽取
    async fn retrieve_facts(
        &self,
        concepts: &[Concept],
        messages: &[Message],
    ) -> Result<Vec<Message>, EngineError> {
        let transcript = render_transcript(messages);
        let mut out = Vec::new();
        for concept in concepts {
            let mut facts = self
                .memory
                .load(concept, self.subject, &self.scope)
                .await
                .map_err(EngineError::Compression)?;
            if facts.is_empty() {
                facts = self.extract_facts(concept, &transcript).await?;
            }
            let values: Vec<String> = facts.into_iter().flat_map(|f| f.values).collect();
            let take = match concept.arity {
                ConceptArity::Single => 1,
                ConceptArity::Multiple => usize::MAX,
            };
            for value in values.into_iter().take(take) {
                out.push(
                    Message::system(format!("{}: {}", concept.keyword, value)).from_memory(),
                );
            }
        }
        Ok(out)
    }

    /// LLM 抽取：一行一个取值，无匹配时输出 NONE
    async fn extract_facts(
        &self,
        concept: &Concept,
        transcript: &str,
    ) -> Result<Vec<Fact>, EngineError> {
        let request = vec![
            Message::system(format!(
                "Extract values for the concept '{}' ({}) from the transcript below. \
                 Output one value per line, nothing else. Output NONE if the transcript \
                 contains no matching value.",
                concept.keyword, concept.description
            )),
            Message::user(transcript.to_string()),
        ];
        let reply = timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| EngineError::Timeout("fact extraction".to_string()))?
            .map_err(EngineError::Compression)?;

        let values: Vec<String> = reply
            .content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("none"))
            .map(String::from)
            .collect();
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Fact::new(concept.keyword.clone(), values)])
    }
}

/// 渲染转写文本供摘要/抽取使用
fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::ToolCall => "tool-call",
                Role::ToolResult => "tool-result",
            };
            format!("[{role}] {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
