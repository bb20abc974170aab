//! 交互缓存：按顺序保存每轮的 {prompt, response}，用于离线回放与录制
//!
//! 文件格式为 JSON 数组。文件不存在或内容损坏时按空缓存处理（损坏会打 warn 日志）。
//! 回放游标只能前进；耗尽后由驱动方改走实时 LLM 调用。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::AssembledPrompt;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 一轮交互
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub prompt: AssembledPrompt,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl CacheRecord {
    pub fn new(prompt: AssembledPrompt, response: impl Into<String>) -> Self {
        Self {
            prompt,
            response: response.into(),
            recorded_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// 缓存存储：整体加载、逐条追加
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self) -> Result<Vec<CacheRecord>, CacheError>;

    async fn append(&self, record: CacheRecord) -> Result<(), CacheError>;
}

/// 内存缓存（测试与一次性会话）
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: Mutex<Vec<CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<CacheRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn load(&self) -> Result<Vec<CacheRecord>, CacheError> {
        Ok(self.records.lock().await.clone())
    }

    async fn append(&self, record: CacheRecord) -> Result<(), CacheError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// JSON 数组文件缓存
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CacheStore for JsonFileCache {
    async fn load(&self) -> Result<Vec<CacheRecord>, CacheError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "cache file not found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        match serde_json::from_str::<Vec<CacheRecord>>(&text) {
            Ok(records) => Ok(records),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache file corrupt, ignoring");
                Ok(Vec::new())
            }
        }
    }

    async fn append(&self, record: CacheRecord) -> Result<(), CacheError> {
        let mut records = self.load().await?;
        records.push(record);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let body = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| self.io_error(e))
    }
}

/// 只进不退的回放游标
#[derive(Debug, Default)]
pub struct ReplayCursor {
    records: VecDeque<CacheRecord>,
    consumed: usize,
}

impl ReplayCursor {
    pub fn new(records: Vec<CacheRecord>) -> Self {
        Self {
            records: records.into(),
            consumed: 0,
        }
    }

    /// 取下一条缓存回复；与当前提示词不一致时仍回放，仅记 debug 日志
    pub fn next_response(&mut self, prompt: &AssembledPrompt) -> Option<String> {
        let record = self.records.pop_front()?;
        self.consumed += 1;
        if record.prompt != *prompt {
            tracing::debug!(index = self.consumed - 1, "replayed prompt differs from cached prompt");
        }
        Some(record.response)
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.records.is_empty()
    }
}
