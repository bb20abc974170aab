//! 旧式文本调用语法：`[type:func(key=value, ...)]`，参数值一律为字符串

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::calls::{Call, CallType};

fn legacy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\w+):(\w+)\(([^)]*)\)\]").unwrap())
}

/// 扫描全文中的所有旧式调用，按出现顺序返回
pub fn parse_legacy(text: &str) -> Vec<Call> {
    legacy_regex()
        .captures_iter(text)
        .map(|cap| {
            let call_type = CallType::from(&cap[1]);
            let kwargs = parse_args(&cap[3]);
            Call::new(call_type, &cap[2], kwargs)
        })
        .collect()
}

fn parse_args(raw: &str) -> Map<String, Value> {
    let mut kwargs = Map::new();
    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        kwargs.insert(key.to_string(), Value::String(unquote(value.trim()).to_string()));
    }
    kwargs
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
