//! MainBoard：组装提示词、合并操作表、分发调用、生成快照
//!
//! 窗口按注册顺序排列，外加一个可选的系统窗口（缺省为 NullWindow）。
//! 操作表在注册时一次性构建，重名即报 `OperationCollision`，不会静默覆盖。
//! 每次分发到非执行栈窗口的调用，都会由执行栈自动记录到当前帧的历史中。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::calls::{Call, ParseError, ResponseParser};
use crate::core::{BoardError, Snapshot};
use crate::windows::{truncate_chars, ActionRecord, FlowStackWindow, NullWindow, OpResult, Window};

/// 审计日志与错误结果中原始文本 / 参数的预览长度
const PREVIEW_CHARS: usize = 200;

/// 一轮对话的提示词：system 为系统窗口渲染，user 为其余窗口按注册顺序拼接
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
}

/// `apply_response` 的结果：解析出的调用与逐个结果；解析失败时 calls 为空
#[derive(Debug, Clone)]
pub struct Applied {
    pub calls: Vec<Call>,
    pub results: Vec<OpResult>,
    pub parse_error: Option<ParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    System,
    Window(usize),
}

#[derive(Debug, Clone)]
struct Route {
    slot: Slot,
    owner: String,
}

pub struct MainBoard {
    windows: Vec<Box<dyn Window>>,
    system: Box<dyn Window>,
    routes: HashMap<String, Route>,
    parser: ResponseParser,
}

impl Default for MainBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MainBoard {
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
            system: Box::new(NullWindow::new()),
            routes: HashMap::new(),
            parser: ResponseParser::default(),
        }
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    /// 追加窗口并（可选）设置系统窗口。先完整校验操作名冲突，全部通过后才生效。
    pub fn register_windows(
        &mut self,
        windows: Vec<Box<dyn Window>>,
        system: Option<Box<dyn Window>>,
    ) -> Result<(), BoardError> {
        let system_ref: &dyn Window = match &system {
            Some(s) => s.as_ref(),
            None => self.system.as_ref(),
        };

        let mut routes: HashMap<String, Route> = HashMap::new();
        let mut add = |slot: Slot, window: &dyn Window| -> Result<(), BoardError> {
            for op in window.operations() {
                if let Some(existing) = routes.get(&op) {
                    return Err(BoardError::OperationCollision {
                        operation: op,
                        first: existing.owner.clone(),
                        second: window.name().to_string(),
                    });
                }
                routes.insert(
                    op,
                    Route {
                        slot,
                        owner: window.name().to_string(),
                    },
                );
            }
            Ok(())
        };

        add(Slot::System, system_ref)?;
        for (idx, w) in self.windows.iter().chain(windows.iter()).enumerate() {
            add(Slot::Window(idx), w.as_ref())?;
        }

        for w in &windows {
            tracing::info!(window = %w.name(), operations = w.operations().len(), "window registered");
        }
        self.windows.extend(windows);
        if let Some(s) = system {
            tracing::info!(window = %s.name(), "system window set");
            self.system = s;
        }
        self.routes = routes;
        Ok(())
    }

    pub fn register_window(&mut self, window: Box<dyn Window>) -> Result<(), BoardError> {
        self.register_windows(vec![window], None)
    }

    pub fn assemble_prompt(&self) -> AssembledPrompt {
        AssembledPrompt {
            system: self.system.forward(),
            user: self
                .windows
                .iter()
                .map(|w| w.forward())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// 分发一次调用；未知操作返回 error 结果，从不 panic
    pub fn dispatch(&mut self, call: &Call) -> OpResult {
        let start = Instant::now();
        let route = self.routes.get(&call.func_name).map(|r| r.slot);

        let result = match route {
            Some(Slot::System) => self.system.invoke(&call.func_name, call.kwargs.clone()),
            Some(Slot::Window(idx)) => self.windows[idx].invoke(&call.func_name, call.kwargs.clone()),
            None => {
                tracing::warn!(func = %call.func_name, "dispatch miss");
                let result = OpResult::error(format!("handler not found: {}", call.func_name));
                audit(call, &result, start.elapsed());
                return result;
            }
        };

        audit(call, &result, start.elapsed());
        self.auto_record(call, &result);
        result
    }

    /// 外部事件入口：以 `event_call` 类型分发
    pub fn inject_event(&mut self, func_name: &str, kwargs: Map<String, Value>) -> OpResult {
        self.dispatch(&Call::event(func_name, kwargs))
    }

    /// 解析并按顺序分发全部调用；解析失败记为一条 error 历史，下一轮对模型可见
    pub fn apply_response(&mut self, raw: &str) -> Applied {
        match self.parser.parse(raw) {
            Ok(calls) => {
                tracing::debug!(count = calls.len(), "dispatching parsed calls");
                let results = calls.iter().map(|c| self.dispatch(c)).collect();
                Applied {
                    calls,
                    results,
                    parse_error: None,
                }
            }
            Err(err) => {
                let raw_preview = truncate_chars(raw, PREVIEW_CHARS);
                tracing::warn!(error = %err, raw = %raw_preview, "failed to parse model response");
                if let Some(stack) = self.recorder_mut() {
                    stack.auto_record_action(ActionRecord {
                        instruction: "parse_response".to_string(),
                        call_type: "error".to_string(),
                        func_name: "parse_response".to_string(),
                        result: format!("{err} | raw: {raw}"),
                        reasoning: String::new(),
                    });
                }
                let result = OpResult::error(format!("parse error: {err}")).with("raw", raw_preview);
                Applied {
                    calls: Vec::new(),
                    results: vec![result],
                    parse_error: Some(err),
                }
            }
        }
    }

    /// 系统窗口的分窗快照 + 其余窗口快照（按注册顺序，同名后写覆盖）
    pub fn snapshot(&self) -> Snapshot {
        let mut snap = self.system.divided_snapshot();
        for w in &self.windows {
            snap.merge(w.divided_snapshot());
        }
        snap
    }

    /// 已合并的操作名（排序）
    pub fn operations(&self) -> Vec<String> {
        let mut ops: Vec<String> = self.routes.keys().cloned().collect();
        ops.sort();
        ops
    }

    /// 操作名归属的窗口名
    pub fn owner_of(&self, op: &str) -> Option<&str> {
        self.routes.get(op).map(|r| r.owner.as_str())
    }

    pub fn window_names(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.name()).collect()
    }

    pub fn system_window(&self) -> &dyn Window {
        self.system.as_ref()
    }

    /// 负责自动记录的执行栈：先在普通窗口中找，再看系统窗口
    pub fn stack(&self) -> Option<&FlowStackWindow> {
        self.windows
            .iter()
            .find_map(|w| w.as_stack())
            .or_else(|| self.system.as_stack())
    }

    fn recorder_mut(&mut self) -> Option<&mut FlowStackWindow> {
        if let Some(idx) = self.windows.iter().position(|w| w.as_stack().is_some()) {
            return self.windows[idx].as_stack_mut();
        }
        self.system.as_stack_mut()
    }

    /// 把已路由的调用写入执行栈历史；栈自身的操作（push/pop/set_instruction……）不记录，
    /// 它们已体现在帧状态中，且 push 之后的新帧必须从空历史开始
    fn auto_record(&mut self, call: &Call, result: &OpResult) {
        let Some(stack) = self.recorder_mut() else {
            return;
        };
        if stack.handles(&call.func_name) {
            return;
        }
        stack.auto_record_action(ActionRecord {
            instruction: call.describe(),
            call_type: call.call_type.as_str().to_string(),
            func_name: call.func_name.clone(),
            result: result.to_string(),
            reasoning: call.reasoning.clone().unwrap_or_default(),
        });
    }
}

fn audit(call: &Call, result: &OpResult, elapsed: Duration) {
    let audit = serde_json::json!({
        "event": "call_audit",
        "func": call.func_name,
        "call_type": call.call_type.as_str(),
        "status": result.status.as_str(),
        "duration_us": elapsed.as_micros() as u64,
        "kwargs_preview": kwargs_preview(&call.kwargs),
    });
    tracing::info!(audit = %audit.to_string(), "call");
}

fn kwargs_preview(kwargs: &Map<String, Value>) -> String {
    let s = Value::Object(kwargs.clone()).to_string();
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", truncate_chars(&s, PREVIEW_CHARS))
    } else {
        s
    }
}
