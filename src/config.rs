//! 引擎配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ENGINE__LLM_TIMEOUT_SECS=30`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::compress::CompressionStrategy;
use crate::core::EngineError;
use crate::memory::Subject;

/// 引擎配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub compression: CompressionSection,
    #[serde(default)]
    pub memory: MemorySection,
}

/// [engine] 段：外部调用超时与扇出并发上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 单次 LLM 往返超时（秒）
    pub llm_timeout_secs: u64,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 单次压缩委托调用超时（秒）
    pub compression_timeout_secs: u64,
    /// 工具扇出并发上限
    pub max_concurrent_tools: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            llm_timeout_secs: 60,
            tool_timeout_secs: 30,
            compression_timeout_secs: 120,
            max_concurrent_tools: 8,
        }
    }
}

/// [compression] 段：阶段间压缩的默认策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionSection {
    /// whole_history / from_last_n / chunked
    pub default_strategy: String,
    /// from_last_n 的窗口大小
    pub last_n: usize,
    /// chunked 的块大小
    pub chunk_size: usize,
    /// 记忆来源消息是否豁免于压缩丢弃
    pub preserve_memory: bool,
}

impl Default for CompressionSection {
    fn default() -> Self {
        Self {
            default_strategy: "whole_history".to_string(),
            last_n: 20,
            chunk_size: 20,
            preserve_memory: true,
        }
    }
}

impl CompressionSection {
    /// 解析为策略值；RetrieveFacts 需要概念列表，只能经 API 构造，不走配置
    pub fn strategy(&self) -> Result<CompressionStrategy, EngineError> {
        let strategy = match self.default_strategy.as_str() {
            "whole_history" => CompressionStrategy::WholeHistory,
            "from_last_n" => CompressionStrategy::FromLastN(self.last_n),
            "chunked" => CompressionStrategy::Chunked(self.chunk_size),
            other => {
                return Err(EngineError::Config(format!(
                    "unknown compression strategy '{other}'"
                )))
            }
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

/// [memory] 段：事实检索的默认主体与作用域
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// machine / user / project / organization
    pub subject: String,
    pub scope: String,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            subject: "user".to_string(),
            scope: "global".to_string(),
        }
    }
}

impl MemorySection {
    pub fn subject(&self) -> Result<Subject, EngineError> {
        match self.subject.as_str() {
            "machine" => Ok(Subject::Machine),
            "user" => Ok(Subject::User),
            "project" => Ok(Subject::Project),
            "organization" => Ok(Subject::Organization),
            other => Err(EngineError::Config(format!("unknown subject '{other}'"))),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<EngineConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
