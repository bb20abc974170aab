//! LLMOS - 基于窗口的提示词操作系统内核
//!
//! 模块划分：
//! - **windows**: 窗口契约、注册表与内置窗口（执行栈、堆、对话、思考、异常、环境……）
//! - **calls**: 调用结构与模型输出解析（JSON 主语法 + 旧式文本语法）
//! - **core**: MainBoard（组装、分发、快照）、构建器、会话编排
//! - **llm**: LLM 客户端抽象与脚本化实现
//! - **cache**: 交互缓存与回放
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化

pub mod cache;
pub mod calls;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod windows;

pub use crate::calls::{parse_response, Call, CallType, ParseError};
pub use crate::core::{BoardBuilder, BoardError, MainBoard, Session, SessionHandle, Snapshot};
pub use crate::windows::{OpResult, Window, WindowRegistry};
