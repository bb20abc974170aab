//! 启动期与协作方错误
//!
//! 窗口操作本身从不返回 Err（见 `OpResult`）；这里只覆盖配置、资源加载与 LLM / 缓存协作方的失败。

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;
use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("window not registered: {0}")]
    NotRegistered(String),

    #[error("operation '{operation}' exported by both '{first}' and '{second}'")]
    OperationCollision {
        operation: String,
        first: String,
        second: String,
    },

    #[error("failed to load window resource {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("session closed")]
    SessionClosed,
}
