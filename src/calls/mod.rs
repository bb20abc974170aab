//! 调用：从模型输出解析出的 `{callType, funcName, kwargs, reasoning}` 单元
//!
//! - [`parser`]：主语法（JSON）解析与校验
//! - [`legacy`]：旧式 `[type:func(k=v)]` 文本语法（仅在主语法无结果时使用）

pub mod legacy;
pub mod parser;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use parser::{parse_response, ParseError, ResponseParser};

/// 调用来源：模型输出为 `prompt`，外部注入为 `event_call`，其余标记原样保留
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallType {
    Prompt,
    Event,
    Other(String),
}

impl CallType {
    pub const PROMPT: &'static str = "prompt";
    pub const EVENT: &'static str = "event_call";

    pub fn as_str(&self) -> &str {
        match self {
            CallType::Prompt => Self::PROMPT,
            CallType::Event => Self::EVENT,
            CallType::Other(tag) => tag,
        }
    }
}

impl From<&str> for CallType {
    fn from(tag: &str) -> Self {
        match tag {
            Self::PROMPT => CallType::Prompt,
            Self::EVENT => CallType::Event,
            other => CallType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CallType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CallType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(CallType::from(tag.as_str()))
    }
}

/// 一次已校验的调用；解析后 call_type 与 func_name 必然存在，kwargs 必然是映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub call_type: CallType,
    pub func_name: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Call {
    pub fn new(call_type: CallType, func_name: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self {
            call_type,
            func_name: func_name.into(),
            kwargs,
            reasoning: None,
        }
    }

    pub fn prompt(func_name: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self::new(CallType::Prompt, func_name, kwargs)
    }

    /// 外部事件（如用户输入），自动记录时以 `event_call` 标注来源
    pub fn event(func_name: impl Into<String>, kwargs: Map<String, Value>) -> Self {
        Self::new(CallType::Event, func_name, kwargs)
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// 紧凑描述，如 `heap_set(key="user", value="Alex")`；用作自动记录的指令文本
    pub fn describe(&self) -> String {
        let args: Vec<String> = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}({})", self.func_name, args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_type_tags() {
        assert_eq!(CallType::from("prompt"), CallType::Prompt);
        assert_eq!(CallType::from("event_call"), CallType::Event);
        assert_eq!(CallType::from("legacy").as_str(), "legacy");
    }

    #[test]
    fn test_call_serializes_camel_case() {
        let call = Call::event("user_response", json!({"text": "hi"}).as_object().cloned().unwrap());
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"callType": "event_call", "funcName": "user_response", "kwargs": {"text": "hi"}})
        );
        assert_eq!(call.describe(), "user_response(text=\"hi\")");
    }
}
