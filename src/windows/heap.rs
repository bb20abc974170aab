//! 堆窗口：全局键值存储（无过期、无持久化）
//!
//! 操作：heap_set / heap_get / heap_delete；state 以 JSON 形式展示全部数据。

use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::BoardError;
use crate::windows::args::{self, decode, require};
use crate::windows::{load_text, OpResult, Window};

const DEFAULT_DESCRIPTION: &str = "\
The heap is a global key-value store shared by every task frame.
Use it to remember facts that must survive stack_pop (user names, found URLs, partial answers).
Values may be any JSON value.";

pub const HEAP_OPERATIONS: [&str; 3] = ["heap_set", "heap_get", "heap_delete"];

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HeapSetArgs {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HeapKeyArgs {
    pub key: String,
}

/// 堆操作（按操作名解码后的强类型形式）
#[derive(Debug, Clone)]
pub enum HeapOp {
    Set(HeapSetArgs),
    Get(HeapKeyArgs),
    Delete(HeapKeyArgs),
}

impl HeapOp {
    pub fn decode(op: &str, kwargs: Map<String, Value>) -> Result<Self, OpResult> {
        match op {
            "heap_set" => {
                require(&kwargs, &["key"], false, "key or value missing")?;
                require(&kwargs, &["value"], false, "key or value missing")?;
                Ok(HeapOp::Set(decode(op, kwargs)?))
            }
            "heap_get" | "heap_delete" => {
                require(&kwargs, &["key"], false, "key missing")?;
                let args = decode(op, kwargs)?;
                Ok(if op == "heap_get" {
                    HeapOp::Get(args)
                } else {
                    HeapOp::Delete(args)
                })
            }
            other => Err(OpResult::error(format!("handler not found: {other}"))),
        }
    }
}

pub struct HeapWindow {
    name: String,
    description: String,
    data: BTreeMap<String, Value>,
}

impl HeapWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            data: BTreeMap::new(),
        }
    }

    /// 从文件加载描述文本；文件缺失为启动期错误
    pub fn from_file(name: impl Into<String>, path: Option<&Path>) -> Result<Self, BoardError> {
        let mut w = Self::new(name);
        w.description = load_text(path, DEFAULT_DESCRIPTION)?;
        Ok(w)
    }

    pub fn set(&mut self, args: HeapSetArgs) -> OpResult {
        self.data.insert(args.key.clone(), args.value.clone());
        OpResult::ok().with("key", args.key).with("value", args.value)
    }

    /// 缺失的键返回 value = null（不是错误）
    pub fn get(&self, args: HeapKeyArgs) -> OpResult {
        let value = self.data.get(&args.key).cloned().unwrap_or(Value::Null);
        OpResult::ok().with("key", args.key).with("value", value)
    }

    pub fn delete(&mut self, args: HeapKeyArgs) -> OpResult {
        if self.data.remove(&args.key).is_some() {
            OpResult::ok().with("key", args.key)
        } else {
            OpResult::error(format!("key '{}' not found", args.key))
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Window for HeapWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        let sigs = [
            args::signature::<HeapSetArgs>("heap_set"),
            args::signature::<HeapKeyArgs>("heap_get"),
            args::signature::<HeapKeyArgs>("heap_delete"),
        ];
        format!("{}\n{}", self.description, args::render_operations(&sigs))
    }

    fn render_state(&self) -> String {
        if self.data.is_empty() {
            return "### HEAP EMPTY ###\n".to_string();
        }
        let body = serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| "{}".to_string());
        format!("### HEAP DATA ###\n{body}\n")
    }

    fn operations(&self) -> Vec<String> {
        HEAP_OPERATIONS.iter().map(|s| s.to_string()).collect()
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        match HeapOp::decode(op, kwargs) {
            Ok(HeapOp::Set(a)) => self.set(a),
            Ok(HeapOp::Get(a)) => self.get(a),
            Ok(HeapOp::Delete(a)) => self.delete(a),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let mut heap = HeapWindow::new("Heap");
        let r = heap.invoke("heap_set", kwargs(json!({"key": "user", "value": "Alex"})));
        assert!(r.is_ok());
        let r = heap.invoke("heap_get", kwargs(json!({"key": "user"})));
        assert_eq!(
            r.to_value(),
            json!({"status": "ok", "key": "user", "value": "Alex"})
        );
    }

    #[test]
    fn test_get_absent_is_null() {
        let mut heap = HeapWindow::new("Heap");
        let r = heap.invoke("heap_get", kwargs(json!({"key": "nobody"})));
        assert!(r.is_ok());
        assert_eq!(r.get("value"), Some(&Value::Null));
    }

    #[test]
    fn test_delete_absent_is_error() {
        let mut heap = HeapWindow::new("Heap");
        let r = heap.invoke("heap_delete", kwargs(json!({"key": "ghost"})));
        assert!(!r.is_ok());
        assert_eq!(r.reason(), Some("key 'ghost' not found"));
    }

    #[test]
    fn test_set_requires_value() {
        let mut heap = HeapWindow::new("Heap");
        let r = heap.invoke("heap_set", kwargs(json!({"key": "k", "value": null})));
        assert_eq!(r.reason(), Some("key or value missing"));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_state_render() {
        let mut heap = HeapWindow::new("Heap");
        assert!(heap.render_state().contains("HEAP EMPTY"));
        heap.invoke("heap_set", kwargs(json!({"key": "n", "value": 3})));
        let state = heap.render_state();
        assert!(state.starts_with("### HEAP DATA ###"));
        assert!(state.contains("\"n\": 3"));
        assert!(heap.render_meta().contains("heap_set(key, value)"));
    }
}
