//! 对话持久化
//!
//! 将消息序列写入/从 JSON 文件加载，用于跨进程或跨会话恢复（可选使用）。

use std::path::Path;

use crate::prompt::Message;

/// 简单的文件持久化：单文件 pretty JSON
#[derive(Debug)]
pub struct PromptPersistence {
    path: std::path::PathBuf,
}

impl PromptPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 从 JSON 文件加载消息序列；文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 将消息序列写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(messages)?)?;
        Ok(())
    }
}
