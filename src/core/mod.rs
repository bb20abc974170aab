//! 核心编排层：MainBoard、快照、错误、构建器与会话编排

pub mod board;
pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use board::{Applied, AssembledPrompt, MainBoard};
pub use builder::BoardBuilder;
pub use error::BoardError;
pub use orchestrator::{spawn_session, Command, ResponseSource, Session, SessionHandle, TurnReport};
pub use state::{Snapshot, WindowView};
