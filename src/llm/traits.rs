//! LLM 客户端抽象
//!
//! 核心只需要一个操作：给定 (system, user) 两段提示词，返回模型的原始文本。
//! 具体后端（HTTP API、本地模型、脚本化测试桩）实现 LlmClient 即可接入回合驱动。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("scripted responses exhausted")]
    Exhausted,
}

/// LLM 客户端 trait：一次非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// 后端名称，用于日志
    fn name(&self) -> &str {
        "llm"
    }
}
