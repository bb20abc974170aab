//! 执行栈窗口：嵌套任务帧、有界执行历史与重复指令检测
//!
//! 栈至少包含一个 ROOT 帧，ROOT 永不弹出；变量与指令类操作只修改栈顶帧。
//! 三个界限互相独立：历史保留条数（10）、循环检测回看条数（5）、渲染展示条数（3）。
//!
//! 操作：stack_push / stack_pop / stack_setvar / stack_replace / stack_set_instruction；
//! 另有仅供分发器使用的 `auto_record_action`（不经过循环检测）。

use std::collections::VecDeque;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::BoardError;
use crate::windows::args::{self, decode, require};
use crate::windows::{load_text, truncate_chars, OpResult, Window};

pub const ROOT_FRAME: &str = "ROOT";

pub const STACK_OPERATIONS: [&str; 5] = [
    "stack_push",
    "stack_pop",
    "stack_setvar",
    "stack_replace",
    "stack_set_instruction",
];

/// 结果文本中出现这些子串（不区分大小写）即视为失败，用于「Tried and Failed」摘要
const FAILURE_MARKERS: [&str; 3] = ["fail", "error", "locked"];

/// 手动指令切换写入历史时使用的来源标记
const MANUAL_SOURCE: &str = "stack_set_instruction";

const DEFAULT_DESCRIPTION: &str = "\
The execution stack tracks nested sub-tasks. Each frame has a description, variables,
the INSTRUCTION you are currently executing, and a short history of how you got there.
- stack_push starts a sub-task (description and instruction are required).
- stack_set_instruction moves to the next step; you must give the reason and the result
  of the previous step. Repeating a recently tried instruction is rejected.
- stack_replace abandons the current plan (fail_reason required) and clears its history.
- stack_pop finishes the sub-task; result is written to the parent under ret_key.";

/// 三个独立的栈界限，外加历史结果截断长度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackLimits {
    /// 每帧最多保留的历史条数（超出时淘汰最旧的）
    pub history_capacity: usize,
    /// 循环检测回看的最近历史条数
    pub loop_lookback: usize,
    /// 渲染时展示的最近历史条数
    pub display_recent: usize,
    /// 历史结果文本的最大字符数
    pub result_limit: usize,
}

impl Default for StackLimits {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            loop_lookback: 5,
            display_recent: 3,
            result_limit: 200,
        }
    }
}

impl StackLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.history_capacity == 0 || self.loop_lookback == 0 || self.result_limit == 0 {
            return Err(
                "stack limits: history_capacity, loop_lookback and result_limit must be > 0"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// 一条执行历史
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// 帧内单调递增的步骤号
    pub step: u64,
    pub instruction: String,
    pub result: String,
    pub reasoning: String,
    /// 来源：手动切换为 stack_set_instruction，自动记录为调用类型（prompt / event_call / error）
    pub source: String,
    pub auto_recorded: bool,
}

/// 栈帧：一个正在进行的子任务
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub description: String,
    pub variables: Map<String, Value>,
    pub instruction: Option<String>,
    pub fail_reason: Option<String>,
    pub ret_key: Option<String>,
    pub step_counter: u64,
    pub history: VecDeque<HistoryEntry>,
}

impl Frame {
    fn new(name: String, description: String) -> Self {
        Self {
            name,
            description,
            variables: Map::new(),
            instruction: None,
            fail_reason: None,
            ret_key: None,
            step_counter: 0,
            history: VecDeque::new(),
        }
    }

    fn root() -> Self {
        Self::new(ROOT_FRAME.to_string(), "Top-level session task".to_string())
    }

    /// 追加历史并按容量淘汰最旧条目；返回本条步骤号
    fn append(&mut self, mut entry: HistoryEntry, limits: &StackLimits) -> u64 {
        self.step_counter += 1;
        entry.step = self.step_counter;
        entry.result = truncate_chars(&entry.result, limits.result_limit);
        self.history.push_back(entry);
        while self.history.len() > limits.history_capacity {
            self.history.pop_front();
        }
        self.step_counter
    }

    /// 在最近 lookback 条历史中查找相同指令；命中时返回最近一次的记录
    fn find_loop(&self, instruction: &str, lookback: usize) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .take(lookback)
            .find(|h| h.instruction == instruction)
    }

    fn render(&self, limits: &StackLimits) -> String {
        let mut lines = vec![format!("Function {}: {}", self.name, self.description)];

        if !self.variables.is_empty() {
            lines.push(format!("Variables: {}", Value::Object(self.variables.clone())));
        }
        if let Some(instruction) = &self.instruction {
            lines.push(format!("-> INSTRUCTION: {instruction}"));
        }

        if !self.history.is_empty() {
            lines.push("\n[Execution History - how you got here]".to_string());
            let skip = self.history.len().saturating_sub(limits.display_recent);
            for h in self.history.iter().skip(skip) {
                let tag = if h.auto_recorded {
                    format!(" [auto:{}]", h.source)
                } else {
                    String::new()
                };
                lines.push(format!(
                    "  Step #{}{}: {} → {}",
                    h.step, tag, h.instruction, h.result
                ));
                if !h.reasoning.is_empty() {
                    lines.push(format!("           Reasoning: {}", h.reasoning));
                }
            }
            lines.push(
                "  (the current INSTRUCTION is the next decision made from the history above)"
                    .to_string(),
            );

            let failed = self.failed_instructions();
            if !failed.is_empty() {
                lines.push("\n[Tried and Failed - known dead ends]".to_string());
                for h in failed {
                    lines.push(format!("  - {}: {} (step #{})", h.instruction, h.result, h.step));
                }
            }
        }

        if let Some(reason) = &self.fail_reason {
            lines.push(format!("\n[Previous failure reason: {reason}]"));
        }

        lines.join("\n")
    }

    /// 每条失败过的指令取其最近一次失败记录，按首次出现顺序排列
    fn failed_instructions(&self) -> Vec<&HistoryEntry> {
        let mut seen: Vec<&str> = Vec::new();
        for h in &self.history {
            if is_failure(&h.result) && !seen.contains(&h.instruction.as_str()) {
                seen.push(&h.instruction);
            }
        }
        seen.into_iter()
            .filter_map(|instr| {
                self.history
                    .iter()
                    .rev()
                    .find(|h| h.instruction == instr && is_failure(&h.result))
            })
            .collect()
    }
}

fn is_failure(result: &str) -> bool {
    let lower = result.to_lowercase();
    FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// 分发器自动记录的一次调用
#[derive(Debug, Clone)]
pub struct ActionRecord {
    /// 写入历史的指令文本（通常是调用的紧凑描述，如 `heap_set(key="user")`）
    pub instruction: String,
    /// 调用类型标记，作为历史条目的来源
    pub call_type: String,
    pub func_name: String,
    pub result: String,
    pub reasoning: String,
}

// ── 操作参数 ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackPushArgs {
    #[serde(default)]
    pub name: Option<String>,
    pub description: String,
    #[serde(alias = "next_instruction")]
    pub instruction: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, alias = "retKey")]
    pub ret_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackPopArgs {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, alias = "retKey")]
    pub ret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackSetVarArgs {
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackReplaceArgs {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default, alias = "next_instruction")]
    pub instruction: Option<String>,
    #[serde(alias = "failReason")]
    pub fail_reason: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackSetInstructionArgs {
    pub instruction: String,
    pub reason: String,
    #[serde(alias = "lastResult")]
    pub last_result: String,
}

/// 栈操作（按操作名解码后的强类型形式）
#[derive(Debug, Clone)]
pub enum StackOp {
    Push(StackPushArgs),
    Pop(StackPopArgs),
    SetVariables(StackSetVarArgs),
    Replace(StackReplaceArgs),
    SetInstruction(StackSetInstructionArgs),
}

impl StackOp {
    pub fn decode(op: &str, kwargs: Map<String, Value>) -> Result<Self, OpResult> {
        match op {
            "stack_push" => {
                require(&kwargs, &["description"], true, "stack_push requires 'description'")?;
                require(
                    &kwargs,
                    &["instruction", "next_instruction"],
                    true,
                    "stack_push requires 'instruction'",
                )?;
                Ok(StackOp::Push(decode(op, kwargs)?))
            }
            "stack_pop" => Ok(StackOp::Pop(decode(op, kwargs)?)),
            "stack_setvar" => {
                let non_empty_map = matches!(kwargs.get("variables"), Some(Value::Object(m)) if !m.is_empty());
                if !non_empty_map {
                    return Err(OpResult::error(
                        "variables argument must be a non-empty dictionary",
                    ));
                }
                Ok(StackOp::SetVariables(decode(op, kwargs)?))
            }
            "stack_replace" => {
                require(
                    &kwargs,
                    &["fail_reason", "failReason"],
                    true,
                    "fail_reason is required for stack_replace",
                )?;
                Ok(StackOp::Replace(decode(op, kwargs)?))
            }
            "stack_set_instruction" => {
                require(
                    &kwargs,
                    &["instruction"],
                    true,
                    "instruction argument must be a non-empty string",
                )?;
                require(
                    &kwargs,
                    &["reason"],
                    true,
                    "reason is required: explain why this instruction comes next and how it differs from the previous step",
                )?;
                require(
                    &kwargs,
                    &["last_result", "lastResult"],
                    true,
                    "last_result is required: state what the previous step produced",
                )?;
                Ok(StackOp::SetInstruction(decode(op, kwargs)?))
            }
            other => Err(OpResult::error(format!("handler not found: {other}"))),
        }
    }
}

// ── 窗口 ───────────────────────────────────────────────────────────────

pub struct FlowStackWindow {
    name: String,
    description: String,
    limits: StackLimits,
    frames: Vec<Frame>,
}

impl FlowStackWindow {
    pub fn new(name: impl Into<String>, limits: StackLimits) -> Self {
        Self {
            name: name.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            limits,
            frames: vec![Frame::root()],
        }
    }

    pub fn from_file(
        name: impl Into<String>,
        limits: StackLimits,
        path: Option<&Path>,
    ) -> Result<Self, BoardError> {
        let mut w = Self::new(name, limits);
        w.description = load_text(path, DEFAULT_DESCRIPTION)?;
        Ok(w)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn limits(&self) -> &StackLimits {
        &self.limits
    }

    pub fn top(&self) -> &Frame {
        // frames 永不为空：ROOT 在构造时创建且不可弹出
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// 是否为本窗口自己的操作（分发器不对这些调用做自动记录）
    pub fn handles(&self, op: &str) -> bool {
        STACK_OPERATIONS.contains(&op)
    }

    pub fn push(&mut self, args: StackPushArgs) -> OpResult {
        if args.description.trim().is_empty() {
            return OpResult::error("stack_push requires 'description'");
        }
        if args.instruction.trim().is_empty() {
            return OpResult::error("stack_push requires 'instruction'");
        }
        let name = args
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("task_{}", self.frames.len()));
        let mut frame = Frame::new(name, args.description);
        frame.variables = args.variables.unwrap_or_default();
        frame.instruction = Some(args.instruction);
        frame.ret_key = args.ret_key;
        self.frames.push(frame);

        OpResult::ok()
            .with("stack_size", self.frames.len())
            .with("step", 1)
    }

    pub fn pop(&mut self, args: StackPopArgs) -> OpResult {
        if self.frames.len() <= 1 {
            return OpResult::warning("cannot pop root frame");
        }
        let Some(frame) = self.frames.pop() else {
            return OpResult::warning("cannot pop root frame");
        };

        let ret_key = args.ret_key.or_else(|| frame.ret_key.clone());
        let mut returned = None;
        if let (Some(key), Some(result)) = (ret_key, args.result) {
            if !result.is_null() {
                self.top_mut().variables.insert(key.clone(), result);
                returned = Some(key);
            }
        }

        let mut r = OpResult::ok()
            .with("stack_size", self.frames.len())
            .with(
                "message",
                format!(
                    "Task '{}' completed with {} steps",
                    frame.name, frame.step_counter
                ),
            );
        if let Some(key) = returned {
            r = r.with("ret_key", key);
        }
        r
    }

    pub fn set_variables(&mut self, args: StackSetVarArgs) -> OpResult {
        if args.variables.is_empty() {
            return OpResult::error("variables argument must be a non-empty dictionary");
        }
        let frame = self.top_mut();
        let mut updated = Vec::with_capacity(args.variables.len());
        for (key, value) in args.variables {
            updated.push(Value::from(key.clone()));
            frame.variables.insert(key, value);
        }
        OpResult::ok()
            .with("updated_keys", updated)
            .with("stack_size", self.frames.len())
    }

    /// 回溯重写栈顶帧：覆盖给定字段，并清空历史与步骤计数
    pub fn replace(&mut self, args: StackReplaceArgs) -> OpResult {
        if args.fail_reason.trim().is_empty() {
            return OpResult::error("fail_reason is required for stack_replace");
        }
        let frame = self.top_mut();
        if let Some(description) = args.description {
            frame.description = description;
        }
        if let Some(variables) = args.variables {
            frame.variables = variables;
        }
        if let Some(instruction) = args.instruction {
            frame.instruction = Some(instruction);
        }
        frame.fail_reason = Some(args.fail_reason.clone());
        frame.history.clear();
        frame.step_counter = 0;

        OpResult::ok()
            .with("replaced", frame.name.clone())
            .with("fail_reason", args.fail_reason)
            .with("history_cleared", true)
    }

    /// 切换栈顶帧的指令；最近 loop_lookback 条历史中出现过的指令被拒绝且不修改状态
    pub fn set_instruction(&mut self, args: StackSetInstructionArgs) -> OpResult {
        if args.instruction.trim().is_empty() {
            return OpResult::error("instruction argument must be a non-empty string");
        }
        if args.reason.trim().is_empty() {
            return OpResult::error("reason is required: explain why this instruction comes next and how it differs from the previous step");
        }
        if args.last_result.trim().is_empty() {
            return OpResult::error(
                "last_result is required: state what the previous step produced",
            );
        }

        let limits = self.limits;
        let depth = self.frames.len();
        let frame = self.top_mut();

        if let Some(prev) = frame.find_loop(&args.instruction, limits.loop_lookback) {
            tracing::warn!(
                frame = %frame.name,
                step = prev.step,
                "instruction rejected: loop detected"
            );
            return OpResult::error(format!(
                "loop detected: instruction '{}' was already tried at step #{} with result '{}'. \
                 You must try a different approach, or use stack_replace / stack_pop to change strategy.",
                args.instruction, prev.step, prev.result
            ))
            .with("step", prev.step);
        }

        if let Some(current) = frame.instruction.take() {
            frame.append(
                HistoryEntry {
                    step: 0,
                    instruction: current,
                    result: args.last_result,
                    reasoning: args.reason,
                    source: MANUAL_SOURCE.to_string(),
                    auto_recorded: false,
                },
                &limits,
            );
        }
        frame.instruction = Some(args.instruction.clone());

        OpResult::ok()
            .with("new_instruction", args.instruction)
            .with("step", frame.step_counter + 1)
            .with("stack_size", depth)
    }

    /// 分发器专用：无条件追加一条带来源标记的历史（不经过循环检测）
    pub fn auto_record_action(&mut self, record: ActionRecord) {
        let limits = self.limits;
        let frame = self.top_mut();
        let step = frame.append(
            HistoryEntry {
                step: 0,
                instruction: record.instruction,
                result: record.result,
                reasoning: record.reasoning,
                source: record.call_type,
                auto_recorded: true,
            },
            &limits,
        );
        tracing::debug!(frame = %frame.name, step, func = %record.func_name, "auto-recorded");
    }
}

impl Window for FlowStackWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        let sigs = [
            args::signature::<StackPushArgs>("stack_push"),
            args::signature::<StackPopArgs>("stack_pop"),
            args::signature::<StackSetVarArgs>("stack_setvar"),
            args::signature::<StackReplaceArgs>("stack_replace"),
            args::signature::<StackSetInstructionArgs>("stack_set_instruction"),
        ];
        format!("{}\n{}", self.description, args::render_operations(&sigs))
    }

    /// 自底（ROOT）向顶逐帧渲染
    fn render_state(&self) -> String {
        let parts: Vec<String> = self.frames.iter().map(|f| f.render(&self.limits)).collect();
        format!("### STACK DATA ###\n{}", parts.join("\n"))
    }

    fn operations(&self) -> Vec<String> {
        STACK_OPERATIONS.iter().map(|s| s.to_string()).collect()
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        match StackOp::decode(op, kwargs) {
            Ok(StackOp::Push(a)) => self.push(a),
            Ok(StackOp::Pop(a)) => self.pop(a),
            Ok(StackOp::SetVariables(a)) => self.set_variables(a),
            Ok(StackOp::Replace(a)) => self.replace(a),
            Ok(StackOp::SetInstruction(a)) => self.set_instruction(a),
            Err(e) => e,
        }
    }

    fn as_stack(&self) -> Option<&FlowStackWindow> {
        Some(self)
    }

    fn as_stack_mut(&mut self) -> Option<&mut FlowStackWindow> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn stack() -> FlowStackWindow {
        FlowStackWindow::new("FlowStackWindow", StackLimits::default())
    }

    fn set_instruction(s: &mut FlowStackWindow, instruction: &str, last: &str) -> OpResult {
        s.invoke(
            "stack_set_instruction",
            kwargs(json!({"instruction": instruction, "reason": "next", "last_result": last})),
        )
    }

    fn record(s: &mut FlowStackWindow, instruction: &str, result: &str) {
        s.auto_record_action(ActionRecord {
            instruction: instruction.to_string(),
            call_type: "prompt".to_string(),
            func_name: "env_step".to_string(),
            result: result.to_string(),
            reasoning: String::new(),
        });
    }

    #[test]
    fn test_starts_with_root() {
        let s = stack();
        assert_eq!(s.depth(), 1);
        assert_eq!(s.top().name, ROOT_FRAME);
    }

    #[test]
    fn test_push_requires_description_and_instruction() {
        let mut s = stack();
        let r = s.invoke("stack_push", kwargs(json!({"instruction": "search"})));
        assert!(!r.is_ok());
        assert_eq!(r.reason(), Some("stack_push requires 'description'"));
        let r = s.invoke("stack_push", kwargs(json!({"description": "find news"})));
        assert_eq!(r.reason(), Some("stack_push requires 'instruction'"));
        let r = s.invoke(
            "stack_push",
            kwargs(json!({"description": "", "instruction": "x"})),
        );
        assert!(!r.is_ok());
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn test_push_creates_fresh_frame() {
        let mut s = stack();
        let r = s.invoke(
            "stack_push",
            kwargs(json!({"description": "find news", "instruction": "search for AI news"})),
        );
        assert!(r.is_ok());
        assert_eq!(r.get("stack_size"), Some(&json!(2)));
        assert_eq!(s.depth(), 2);
        let top = s.top();
        assert_eq!(top.name, "task_1");
        assert_eq!(top.step_counter, 0);
        assert!(top.history.is_empty());
        assert_eq!(top.instruction.as_deref(), Some("search for AI news"));
    }

    #[test]
    fn test_pop_root_is_warning() {
        let mut s = stack();
        let r = s.invoke("stack_pop", Map::new());
        assert_eq!(
            r.to_value(),
            json!({"status": "warning", "reason": "cannot pop root frame"})
        );
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn test_pop_writes_result_to_parent() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "i"})),
        );
        let r = s.invoke("stack_pop", kwargs(json!({"result": "R", "ret_key": "K"})));
        assert!(r.is_ok());
        assert_eq!(s.depth(), 1);
        assert_eq!(s.top().variables.get("K"), Some(&json!("R")));
    }

    #[test]
    fn test_pop_uses_frame_ret_key() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "i", "ret_key": "answer"})),
        );
        s.invoke("stack_pop", kwargs(json!({"result": 42})));
        assert_eq!(s.top().variables.get("answer"), Some(&json!(42)));
    }

    #[test]
    fn test_setvar_merges_into_top() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "i", "variables": {"a": 1}})),
        );
        let r = s.invoke("stack_setvar", kwargs(json!({"variables": {"b": 2}})));
        assert!(r.is_ok());
        assert_eq!(s.top().variables.len(), 2);
        assert!(s.frames()[0].variables.is_empty());

        let r = s.invoke("stack_setvar", kwargs(json!({"variables": {}})));
        assert!(!r.is_ok());
        let r = s.invoke("stack_setvar", kwargs(json!({"variables": "nope"})));
        assert!(!r.is_ok());
    }

    #[test]
    fn test_set_instruction_requires_all_arguments() {
        let mut s = stack();
        let r = s.invoke(
            "stack_set_instruction",
            kwargs(json!({"instruction": "x", "last_result": "y"})),
        );
        assert!(r.reason().unwrap().starts_with("reason is required"));
        let r = s.invoke(
            "stack_set_instruction",
            kwargs(json!({"instruction": "x", "reason": "y"})),
        );
        assert!(r.reason().unwrap().starts_with("last_result is required"));
        assert!(s.top().instruction.is_none());
    }

    #[test]
    fn test_identical_instruction_rejected_on_second_attempt() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "find news", "instruction": "search for AI news"})),
        );
        let r = s.invoke(
            "stack_set_instruction",
            kwargs(json!({
                "instruction": "search for AI news",
                "reason": "retry",
                "last_result": "no result yet"
            })),
        );
        assert!(r.is_ok());
        let top = s.top();
        assert_eq!(top.history.len(), 1);
        assert_eq!(top.history[0].step, 1);
        assert_eq!(top.history[0].instruction, "search for AI news");
        assert_eq!(top.history[0].result, "no result yet");

        let before = s.top().clone();
        let r = s.invoke(
            "stack_set_instruction",
            kwargs(json!({
                "instruction": "search for AI news",
                "reason": "retry",
                "last_result": "no result yet"
            })),
        );
        assert!(!r.is_ok());
        assert!(r.reason().unwrap().contains("step #1"));
        assert!(r.reason().unwrap().contains("no result yet"));
        assert_eq!(s.top(), &before);
    }

    #[test]
    fn test_loop_detection_looks_back_five_entries() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "step-0"})),
        );
        for i in 1..=6 {
            assert!(set_instruction(&mut s, &format!("step-{i}"), "done").is_ok());
        }
        // history: step-0..step-5；最近 5 条为 step-1..step-5
        assert!(set_instruction(&mut s, "step-0", "done").is_ok());
        assert!(!set_instruction(&mut s, "step-3", "done").is_ok());
    }

    #[test]
    fn test_history_capped_at_ten() {
        let mut s = stack();
        for i in 0..15 {
            record(&mut s, &format!("a{i}"), "ok");
        }
        let top = s.top();
        assert_eq!(top.history.len(), 10);
        assert_eq!(top.history.front().unwrap().instruction, "a5");
        assert_eq!(top.history.back().unwrap().step, 15);
    }

    #[test]
    fn test_auto_record_bypasses_loop_gate_and_truncates() {
        let mut s = stack();
        let long = "x".repeat(500);
        record(&mut s, "go north", &long);
        record(&mut s, "go north", "ok");
        assert_eq!(s.top().history.len(), 2);
        assert_eq!(s.top().history[0].result.chars().count(), 200);
        assert!(s.top().history[0].auto_recorded);
        // 自动记录的指令同样参与循环检测
        assert!(!set_instruction(&mut s, "go north", "ok").is_ok());
    }

    #[test]
    fn test_replace_clears_history() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "a"})),
        );
        set_instruction(&mut s, "b", "failed");
        let r = s.invoke(
            "stack_replace",
            kwargs(json!({"instruction": "c", "description": "new plan"})),
        );
        assert_eq!(r.reason(), Some("fail_reason is required for stack_replace"));

        let r = s.invoke(
            "stack_replace",
            kwargs(json!({"instruction": "a", "description": "new plan", "fail_reason": "door locked"})),
        );
        assert!(r.is_ok());
        let top = s.top();
        assert!(top.history.is_empty());
        assert_eq!(top.step_counter, 0);
        assert_eq!(top.description, "new plan");
        assert_eq!(top.fail_reason.as_deref(), Some("door locked"));
        // 历史清空后，曾尝试的指令不再被拦截
        assert!(set_instruction(&mut s, "b", "ok").is_ok());
    }

    #[test]
    fn test_render_shows_recent_three_and_failures() {
        let mut s = stack();
        record(&mut s, "open door", "Failed: the door is locked");
        for i in 0..4 {
            record(&mut s, &format!("look {i}"), "nothing");
        }
        let state = s.render_state();
        assert!(state.starts_with("### STACK DATA ###"));
        assert!(state.contains("Function ROOT"));
        assert!(!state.contains("Step #2 "));
        assert!(state.contains("Step #3 [auto:prompt]: look 1"));
        assert!(state.contains("Step #5 [auto:prompt]: look 3"));
        assert!(state.contains("[Tried and Failed"));
        assert!(state.contains("- open door: Failed: the door is locked (step #1)"));
    }

    #[test]
    fn test_render_is_pure() {
        let mut s = stack();
        s.invoke(
            "stack_push",
            kwargs(json!({"description": "d", "instruction": "i", "variables": {"k": "v"}})),
        );
        assert_eq!(s.render_state(), s.render_state());
        assert!(s.render_state().contains("Variables: {\"k\":\"v\"}"));
    }
}
