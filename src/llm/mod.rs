//! LLM 层：客户端抽象与脚本化实现

pub mod mock;
pub mod traits;

pub use mock::ScriptedLlmClient;
pub use traits::{LlmClient, LlmError};
