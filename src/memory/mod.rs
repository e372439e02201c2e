//! 记忆域：Concept / Fact / Subject / Scope 与 MemoryProvider
//!
//! RetrieveFacts 压缩策略消费此模块；默认 NoopMemory 不存任何东西。
//! 同一 Concept 在多个 Subject 下有事实时，始终取更具体的 Subject
//! （MACHINE > USER > PROJECT > ORGANIZATION）。

pub mod store;
pub mod tokenizer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::InMemoryStore;

/// 概念的取值数目：单值或多值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptArity {
    Single,
    Multiple,
}

/// 概念：关键词 + 描述 + 取值数目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub keyword: String,
    pub description: String,
    pub arity: ConceptArity,
}

impl Concept {
    pub fn single(keyword: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            description: description.into(),
            arity: ConceptArity::Single,
        }
    }

    pub fn multiple(keyword: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            description: description.into(),
            arity: ConceptArity::Multiple,
        }
    }
}

/// 事实：概念标签 + 取值 + 创建时间
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub concept: String,
    pub values: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(concept: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            concept: concept.into(),
            values,
            created_at: Utc::now(),
        }
    }
}

/// 事实归属的主体，按具体程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Machine,
    User,
    Project,
    Organization,
}

impl Subject {
    /// 具体程度：越大越具体
    pub fn specificity(&self) -> u8 {
        match self {
            Subject::Machine => 3,
            Subject::User => 2,
            Subject::Project => 1,
            Subject::Organization => 0,
        }
    }

    /// 全部主体，按具体程度从高到低
    pub fn ranked() -> [Subject; 4] {
        [
            Subject::Machine,
            Subject::User,
            Subject::Project,
            Subject::Organization,
        ]
    }
}

/// 事实的有效上下文
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope(pub String);

impl Scope {
    pub fn global() -> Self {
        Self("global".to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// 记忆提供方 trait；默认实现为 NoopMemory
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn save(&self, fact: Fact, subject: Subject, scope: &Scope) -> Result<(), String>;

    /// 按概念加载；跨 Subject 冲突时返回最具体 Subject 下的事实
    async fn load(
        &self,
        concept: &Concept,
        subject: Subject,
        scope: &Scope,
    ) -> Result<Vec<Fact>, String>;

    /// 加载指定 Subject 下的全部事实
    async fn load_all(&self, subject: Subject, scope: &Scope) -> Result<Vec<Fact>, String>;

    /// 按描述文本检索相关事实
    async fn load_by_description(
        &self,
        text: &str,
        subject: Subject,
        scope: &Scope,
    ) -> Result<Vec<Fact>, String>;
}

/// 空实现：不存任何东西（默认提供方）
#[derive(Clone, Default)]
pub struct NoopMemory;

#[async_trait]
impl MemoryProvider for NoopMemory {
    async fn save(&self, _fact: Fact, _subject: Subject, _scope: &Scope) -> Result<(), String> {
        Ok(())
    }

    async fn load(
        &self,
        _concept: &Concept,
        _subject: Subject,
        _scope: &Scope,
    ) -> Result<Vec<Fact>, String> {
        Ok(Vec::new())
    }

    async fn load_all(&self, _subject: Subject, _scope: &Scope) -> Result<Vec<Fact>, String> {
        Ok(Vec::new())
    }

    async fn load_by_description(
        &self,
        _text: &str,
        _subject: Subject,
        _scope: &Scope,
    ) -> Result<Vec<Fact>, String> {
        Ok(Vec::new())
    }
}
