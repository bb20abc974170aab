//! 模型输出解析：原始文本 -> 有序、已校验的调用列表
//!
//! 1. 去除首尾空白；若存在 ```json 代码块，取其内部文本作为候选区域（其中没有 JSON 时退回全文）
//! 2. 按位置顺序尝试每一个 `{` / `[` 起点，用 serde_json 的流式反序列化读出一个完整 JSON 值
//!    （字符串内的括号不会干扰边界判断，值之后的说明文字被忽略）
//! 3. 对象归一为单元素列表，数组原样使用，其余顶层类型报错
//! 4. 逐个元素校验键集合与字段类型
//!
//! 找不到任何 JSON 时，可选地回退到旧式 `[type:func(k=v)]` 语法。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::calls::legacy::parse_legacy;
use crate::calls::{Call, CallType};

const ALLOWED_KEYS: [&str; 4] = ["callType", "funcName", "kwargs", "reasoning"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no valid JSON structure found")]
    NoJson,

    #[error("top-level JSON value must be an object or an array, got {0}")]
    TopLevelType(&'static str),

    #[error("call #{index} must be a JSON object, got {found}")]
    ElementType { index: usize, found: &'static str },

    #[error("call #{index}: illegal key '{key}' (allowed: callType, funcName, kwargs, reasoning)")]
    IllegalKey { index: usize, key: String },

    #[error("call #{index}: missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("call #{index}: field '{field}' must be {expected}")]
    FieldType {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },
}

/// 解析器；`legacy_fallback` 关闭时只接受 JSON
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    pub legacy_fallback: bool,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            legacy_fallback: true,
        }
    }
}

impl ResponseParser {
    pub fn new(legacy_fallback: bool) -> Self {
        Self { legacy_fallback }
    }

    pub fn parse(&self, raw: &str) -> Result<Vec<Call>, ParseError> {
        let trimmed = raw.trim();
        let found = fenced_block(trimmed)
            .and_then(first_json_value)
            .or_else(|| first_json_value(trimmed));

        match found {
            Some(value) => normalize(value),
            None => {
                if self.legacy_fallback {
                    let calls = parse_legacy(trimmed);
                    if !calls.is_empty() {
                        tracing::debug!(count = calls.len(), "parsed legacy bracket calls");
                        return Ok(calls);
                    }
                }
                Err(ParseError::NoJson)
            }
        }
    }
}

/// 使用默认解析器（启用旧式语法回退）
pub fn parse_response(raw: &str) -> Result<Vec<Call>, ParseError> {
    ResponseParser::default().parse(raw)
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)```json\s*([\s\S]*?)\s*```").unwrap())
}

fn fenced_block(text: &str) -> Option<&str> {
    fence_regex()
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// 从左到右尝试每个 `{` / `[` 起点，返回第一个能完整解析的 JSON 值
fn first_json_value(region: &str) -> Option<Value> {
    region
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(pos, _)| {
            serde_json::Deserializer::from_str(&region[pos..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
        })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn normalize(value: Value) -> Result<Vec<Call>, ParseError> {
    let items = match value {
        Value::Object(obj) => vec![Value::Object(obj)],
        Value::Array(items) => items,
        other => return Err(ParseError::TopLevelType(type_name(&other))),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate(index, item))
        .collect()
}

fn validate(index: usize, item: Value) -> Result<Call, ParseError> {
    let mut obj = match item {
        Value::Object(obj) => obj,
        other => {
            return Err(ParseError::ElementType {
                index,
                found: type_name(&other),
            })
        }
    };

    if let Some(key) = obj.keys().find(|k| !ALLOWED_KEYS.contains(&k.as_str())) {
        return Err(ParseError::IllegalKey {
            index,
            key: key.clone(),
        });
    }

    let call_type = required_string(&mut obj, index, "callType")?;
    let func_name = required_string(&mut obj, index, "funcName")?;

    let kwargs = match obj.remove("kwargs") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ParseError::FieldType {
                index,
                field: "kwargs",
                expected: "an object",
            })
        }
    };

    let reasoning = match obj.remove("reasoning") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    Ok(Call {
        call_type: CallType::from(call_type.as_str()),
        func_name,
        kwargs,
        reasoning,
    })
}

fn required_string(
    obj: &mut Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, ParseError> {
    match obj.remove(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField { index, field }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ParseError::FieldType {
            index,
            field,
            expected: "a string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_object_defaults_kwargs() {
        let calls = parse_response(r#"{"callType":"prompt","funcName":"stack_pop"}"#).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_type, CallType::Prompt);
        assert_eq!(calls[0].func_name, "stack_pop");
        assert!(calls[0].kwargs.is_empty());
        assert!(calls[0].reasoning.is_none());
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let raw = "Sure, storing the name now.\n```json\n{\"callType\":\"prompt\",\"funcName\":\"heap_set\",\"kwargs\":{\"key\":\"user\",\"value\":\"Alex\"}}\n```\nLet me know if you need more.";
        let calls = parse_response(raw).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kwargs.get("value"), Some(&json!("Alex")));
    }

    #[test]
    fn test_array_preserves_order() {
        let raw = r#"[
            {"callType":"prompt","funcName":"stack_push","kwargs":{"description":"d","instruction":"i"}},
            {"callType":"prompt","funcName":"stack_set_instruction","kwargs":{"instruction":"j"},"reasoning":"next"}
        ]"#;
        let calls = parse_response(raw).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].func_name, "stack_push");
        assert_eq!(calls[1].func_name, "stack_set_instruction");
        assert_eq!(calls[1].reasoning.as_deref(), Some("next"));
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"Plan: {"callType":"prompt","funcName":"new_think","kwargs":{"content":"use {braces} and ] here"}} done"#;
        let calls = parse_response(raw).unwrap();
        assert_eq!(
            calls[0].kwargs.get("content"),
            Some(&json!("use {braces} and ] here"))
        );
    }

    #[test]
    fn test_skips_unparseable_candidates() {
        let raw = r#"[note] {oops} {"callType":"prompt","funcName":"heap_get","kwargs":{"key":"k"}}"#;
        let calls = parse_response(raw).unwrap();
        assert_eq!(calls[0].func_name, "heap_get");
    }

    #[test]
    fn test_illegal_key_rejected() {
        let err = parse_response(r#"{"callType":"prompt","funcName":"x","extra":1}"#).unwrap_err();
        assert_eq!(
            err,
            ParseError::IllegalKey {
                index: 0,
                key: "extra".to_string()
            }
        );
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let err = parse_response(r#"{"callType":"prompt"}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "funcName", .. }));
        let err = parse_response(r#"{"callType":"prompt","funcName":"x","kwargs":[1]}"#).unwrap_err();
        assert!(matches!(err, ParseError::FieldType { field: "kwargs", .. }));
        let err = parse_response(r#"[{"callType":"prompt","funcName":"x"}, 3]"#).unwrap_err();
        assert!(matches!(err, ParseError::ElementType { index: 1, .. }));
    }

    #[test]
    fn test_non_json_fence_is_not_the_region() {
        let raw = "Here is the log:\n```text\nno structured data here\n```\n{\"callType\":\"prompt\",\"funcName\":\"heap_get\",\"kwargs\":{\"key\":\"k\"}}";
        let calls = parse_response(raw).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].func_name, "heap_get");
    }

    #[test]
    fn test_json_fence_without_json_falls_back_to_text() {
        let raw = "```json\nnot ready yet\n```\n{\"callType\":\"prompt\",\"funcName\":\"stack_pop\"}";
        let calls = parse_response(raw).unwrap();
        assert_eq!(calls[0].func_name, "stack_pop");
    }

    #[test]
    fn test_no_json() {
        let err = ResponseParser::new(false).parse("I am not sure what to do.").unwrap_err();
        assert_eq!(err, ParseError::NoJson);
        assert_eq!(err.to_string(), "no valid JSON structure found");
    }

    #[test]
    fn test_legacy_fallback_only_without_json() {
        let calls = parse_response("[prompt:heap_get(key=user)]").unwrap();
        assert_eq!(calls[0].func_name, "heap_get");
        assert!(ResponseParser::new(false).parse("[prompt:heap_get(key=user)]").is_err());
    }
}
