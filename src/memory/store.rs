//! 内置内存记忆提供方
//!
//! 按 (scope, subject, concept) 存储事实；load 按主体具体程度从高到低取第一个命中，
//! load_by_description 用词重叠对概念描述打分检索。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::memory::{tokenizer, Concept, Fact, MemoryProvider, Scope, Subject};

type Key = (Scope, Subject, String);

/// 进程内记忆存储；克隆共享同一份数据
#[derive(Clone, Default)]
pub struct InMemoryStore {
    /// 事实表 + 概念描述表（检索用）
    facts: Arc<RwLock<HashMap<Key, Vec<Fact>>>>,
    descriptions: Arc<RwLock<HashMap<(Scope, Subject, String), String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记概念描述，供 load_by_description 打分
    pub fn register_concept(&self, concept: &Concept, subject: Subject, scope: &Scope) {
        self.descriptions
            .write()
            .expect("memory lock poisoned")
            .insert(
                (scope.clone(), subject, concept.keyword.clone()),
                concept.description.clone(),
            );
    }
}

#[async_trait]
impl MemoryProvider for InMemoryStore {
    async fn save(&self, fact: Fact, subject: Subject, scope: &Scope) -> Result<(), String> {
        let key = (scope.clone(), subject, fact.concept.clone());
        self.facts
            .write()
            .expect("memory lock poisoned")
            .entry(key)
            .or_default()
            .push(fact);
        Ok(())
    }

    async fn load(
        &self,
        concept: &Concept,
        _subject: Subject,
        scope: &Scope,
    ) -> Result<Vec<Fact>, String> {
        let facts = self.facts.read().expect("memory lock poisoned");
        for subject in Subject::ranked() {
            let key = (scope.clone(), subject, concept.keyword.clone());
            if let Some(found) = facts.get(&key) {
                if !found.is_empty() {
                    return Ok(found.clone());
                }
            }
        }
        Ok(Vec::new())
    }

    async fn load_all(&self, subject: Subject, scope: &Scope) -> Result<Vec<Fact>, String> {
        let facts = self.facts.read().expect("memory lock poisoned");
        Ok(facts
            .iter()
            .filter(|((s, subj, _), _)| s == scope && *subj == subject)
            .flat_map(|(_, v)| v.clone())
            .collect())
    }

    async fn load_by_description(
        &self,
        text: &str,
        _subject: Subject,
        scope: &Scope,
    ) -> Result<Vec<Fact>, String> {
        let descriptions = self.descriptions.read().expect("memory lock poisoned");
        let facts = self.facts.read().expect("memory lock poisoned");

        // 对每个概念描述打分；同名概念只保留最具体 Subject 的命中
        let mut best: HashMap<String, (usize, Subject)> = HashMap::new();
        for ((s, subject, keyword), description) in descriptions.iter() {
            if s != scope {
                continue;
            }
            let score = tokenizer::overlap_score(text, description);
            if score == 0 {
                continue;
            }
            match best.get(keyword) {
                Some((_, prev)) if prev.specificity() >= subject.specificity() => {}
                _ => {
                    best.insert(keyword.clone(), (score, *subject));
                }
            }
        }

        let mut hits: Vec<(usize, Vec<Fact>)> = best
            .into_iter()
            .filter_map(|(keyword, (score, subject))| {
                facts
                    .get(&(scope.clone(), subject, keyword))
                    .map(|f| (score, f.clone()))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits.into_iter().flat_map(|(_, f)| f).collect())
    }
}
