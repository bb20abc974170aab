//! 窗口层：提示词窗口契约、注册表与内置窗口
//!
//! 每个窗口独占一段状态，渲染 meta（静态说明）与 state（当前数据），并导出一张可被模型调用的操作表。
//! 窗口只能通过操作调用被修改；渲染必须是当前状态的纯函数。

pub mod args;
pub mod chat;
pub mod env;
pub mod error_log;
pub mod heap;
pub mod null;
pub mod registry;
pub mod result;
pub mod stack;
pub mod static_text;
pub mod system;
pub mod think;

use std::path::Path;

use serde_json::{Map, Value};

use crate::core::{BoardError, Snapshot, WindowView};

pub use chat::ChatWindow;
pub use env::{EnvError, EnvWindow, Environment};
pub use error_log::ErrorWindow;
pub use heap::HeapWindow;
pub use null::NullWindow;
pub use registry::{WindowRegistry, WindowSpec};
pub use result::{OpResult, OpStatus};
pub use stack::{ActionRecord, FlowStackWindow, Frame, HistoryEntry, StackLimits};
pub use static_text::StaticWindow;
pub use system::SystemWindow;
pub use think::ThinkWindow;

/// 窗口契约：名称、meta/state 渲染、操作表与调用入口
pub trait Window: Send {
    /// 窗口名（快照中的键，应全局唯一）
    fn name(&self) -> &str;

    fn render_meta(&self) -> String {
        String::new()
    }

    fn render_state(&self) -> String {
        String::new()
    }

    /// 完整渲染；默认用窗口边界包裹 meta + state，子类可覆盖
    fn forward(&self) -> String {
        format!(
            "\n<WINDOW START: {name}>\nMETA:\n{meta}\nSTATE:\n{state}\n<WINDOW END: {name}>\n",
            name = self.name(),
            meta = self.render_meta(),
            state = self.render_state(),
        )
    }

    /// 导出的操作名；合并到 MainBoard 后不得与其它窗口冲突
    fn operations(&self) -> Vec<String> {
        Vec::new()
    }

    /// 执行一个操作；未知操作返回 error 结果而不是 panic
    fn invoke(&mut self, op: &str, _kwargs: Map<String, Value>) -> OpResult {
        OpResult::error(format!("handler not found: {op}"))
    }

    /// 结构化快照：{name: {meta, state}}；聚合窗口会返回多个条目
    fn divided_snapshot(&self) -> Snapshot {
        Snapshot::single(
            self.name(),
            WindowView {
                meta: self.render_meta(),
                state: self.render_state(),
            },
        )
    }

    /// 若本窗口（或其子窗口）是执行栈，返回之，供分发器自动记录
    fn as_stack(&self) -> Option<&FlowStackWindow> {
        None
    }

    fn as_stack_mut(&mut self) -> Option<&mut FlowStackWindow> {
        None
    }
}

/// 读取窗口的描述文本：给了路径就必须能读到（启动期致命错误），否则使用内置默认文本
pub(crate) fn load_text(path: Option<&Path>, default: &str) -> Result<String, BoardError> {
    match path {
        Some(p) => std::fs::read_to_string(p).map_err(|source| BoardError::Resource {
            path: p.to_path_buf(),
            source,
        }),
        None => Ok(default.to_string()),
    }
}

/// 按字符截断（不切断 UTF-8 字符）
pub(crate) fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() > limit {
        s.chars().take(limit).collect()
    } else {
        s.to_string()
    }
}
