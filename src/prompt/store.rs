//! 会话存取：单写者独占 + 已提交快照读
//!
//! acquire_write 经 tokio Mutex 排队（等待队列天然 FIFO），同一 Prompt 任意时刻至多一个写会话；
//! 写会话在私有副本上工作，commit 时整体替换已提交状态，放弃 commit 直接 drop 即丢弃变更。
//! acquire_read 永不阻塞，返回最近一次提交的快照，看不到未提交的中间修改。

use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::core::EngineError;
use crate::prompt::{Message, Prompt};
use crate::tools::ToolDescriptor;

/// Prompt 的并发访问入口；克隆共享同一份状态
#[derive(Clone)]
pub struct PromptStore {
    committed: Arc<RwLock<Prompt>>,
    write_gate: Arc<Mutex<()>>,
}

impl PromptStore {
    pub fn new(initial: Prompt) -> Self {
        Self {
            committed: Arc::new(RwLock::new(initial)),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// 获取独占写会话；已有持有者时排队等待（FIFO）
    pub async fn acquire_write(&self) -> WriteSession {
        let permit = self.write_gate.clone().lock_owned().await;
        let working = self
            .committed
            .read()
            .expect("prompt lock poisoned")
            .clone();
        WriteSession {
            id: Uuid::new_v4(),
            working,
            committed: Arc::clone(&self.committed),
            _permit: permit,
        }
    }

    /// 非阻塞获取写会话；已有持有者时返回 SessionConflict
    pub fn try_acquire_write(&self) -> Result<WriteSession, EngineError> {
        let permit = self
            .write_gate
            .clone()
            .try_lock_owned()
            .map_err(|_| EngineError::SessionConflict("write session already held".to_string()))?;
        let working = self
            .committed
            .read()
            .expect("prompt lock poisoned")
            .clone();
        Ok(WriteSession {
            id: Uuid::new_v4(),
            working,
            committed: Arc::clone(&self.committed),
            _permit: permit,
        })
    }

    /// 读会话：最近一次提交的一致快照，不阻塞也不被写者阻塞
    pub fn acquire_read(&self) -> ReadSession {
        ReadSession {
            snapshot: self
                .committed
                .read()
                .expect("prompt lock poisoned")
                .clone(),
        }
    }
}

/// 独占写会话：在私有副本上修改，commit 时原子发布
pub struct WriteSession {
    id: Uuid,
    working: Prompt,
    committed: Arc<RwLock<Prompt>>,
    _permit: OwnedMutexGuard<()>,
}

impl WriteSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn prompt(&self) -> &Prompt {
        &self.working
    }

    pub fn prompt_mut(&mut self) -> &mut Prompt {
        &mut self.working
    }

    pub fn push(&mut self, msg: Message) {
        self.working.push(msg);
    }

    pub fn set_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.working.set_tools(tools);
    }

    /// 提交：整体替换已提交状态并释放独占；读者在此刻之后才能看到本会话的修改
    pub fn commit(self) {
        *self.committed.write().expect("prompt lock poisoned") = self.working;
    }

    /// 显式放弃（drop 即可，此方法仅为调用处可读性）
    pub fn discard(self) {}
}

/// 只读快照会话
pub struct ReadSession {
    snapshot: Prompt,
}

impl ReadSession {
    pub fn prompt(&self) -> &Prompt {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_read_sees_only_committed() {
        let store = PromptStore::new(Prompt::with_system("base"));

        let mut w = store.acquire_write().await;
        w.push(Message::user("in flight"));
        // 未提交：读者仍看旧状态
        assert_eq!(store.acquire_read().prompt().len(), 1);
        w.commit();
        assert_eq!(store.acquire_read().prompt().len(), 2);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards() {
        let store = PromptStore::new(Prompt::with_system("base"));
        {
            let mut w = store.acquire_write().await;
            w.push(Message::user("never committed"));
        }
        assert_eq!(store.acquire_read().prompt().len(), 1);
    }

    #[tokio::test]
    async fn test_try_acquire_conflicts_while_held() {
        let store = PromptStore::new(Prompt::new());
        let held = store.acquire_write().await;
        assert!(matches!(
            store.try_acquire_write(),
            Err(EngineError::SessionConflict(_))
        ));
        drop(held);
        assert!(store.try_acquire_write().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_writers_serialized_counter() {
        // 计数器只受会话机制保护：每个写者读取消息数、+1 条消息后提交。
        // 若两个写会话同时持有，必然丢更新，最终条数 < N。
        let store = PromptStore::new(Prompt::new());
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let n = 32usize;
        let mut handles = Vec::new();
        for i in 0..n {
            let store = store.clone();
            let active = Arc::clone(&active);
            let overlap = Arc::clone(&overlap);
            handles.push(tokio::spawn(async move {
                let mut w = store.acquire_write().await;
                if active.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                let count = w.prompt().len();
                tokio::task::yield_now().await;
                w.push(Message::user(format!("writer {i} saw {count}")));
                active.fetch_sub(1, Ordering::SeqCst);
                w.commit();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(overlap.load(Ordering::SeqCst), 0, "two write sessions overlapped");
        assert_eq!(store.acquire_read().prompt().len(), n);
    }

    #[tokio::test]
    async fn test_read_does_not_block_writer() {
        let store = PromptStore::new(Prompt::with_system("base"));
        let r = store.acquire_read();
        let mut w = store.acquire_write().await;
        w.push(Message::user("hi"));
        w.commit();
        // 旧快照不受后续提交影响
        assert_eq!(r.prompt().len(), 1);
    }
}
