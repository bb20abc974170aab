//! 脚本化 LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预置的回复；耗尽后返回 fallback（若有）或 `LlmError::Exhausted`。
//! 同时记录收到的每一份提示词，便于断言。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::AssembledPrompt;
use crate::llm::{LlmClient, LlmError};

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<AssembledPrompt>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 脚本耗尽后一直返回该回复
    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// 目前为止收到的全部提示词
    pub async fn prompts(&self) -> Vec<AssembledPrompt> {
        self.prompts.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.prompts.lock().await.push(AssembledPrompt {
            system: system.to_string(),
            user: user.to_string(),
        });
        match self.responses.lock().await.pop_front() {
            Some(r) => Ok(r),
            None => self.fallback.clone().ok_or(LlmError::Exhausted),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_order_and_exhaustion() {
        let llm = ScriptedLlmClient::new(["a", "b"]);
        assert_eq!(llm.chat("s", "u1").await.unwrap(), "a");
        assert_eq!(llm.chat("s", "u2").await.unwrap(), "b");
        assert_eq!(llm.chat("s", "u3").await.unwrap_err(), LlmError::Exhausted);
        let prompts = llm.prompts().await;
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[1].user, "u2");
    }

    #[tokio::test]
    async fn test_fallback() {
        let llm = ScriptedLlmClient::new(Vec::<String>::new()).with_fallback("{}");
        assert_eq!(llm.chat("s", "u").await.unwrap(), "{}");
    }
}
