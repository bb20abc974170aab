//! 操作结果：每个窗口操作都返回带 status 字段的结果映射，而不是抛出错误
//!
//! 分发器因此无需逐调用处理异常；错误作为数据写回状态，下一轮对模型可见。

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// 操作状态：ok / error / warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Ok,
    Error,
    Warning,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Ok => "ok",
            OpStatus::Error => "error",
            OpStatus::Warning => "warning",
        }
    }
}

/// 单次操作的结果：status 加任意附加字段（reason、key、stack_size ...）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpResult {
    pub status: OpStatus,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            status: OpStatus::Ok,
            fields: Map::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: OpStatus::Error,
            fields: Map::new(),
        }
        .with("reason", reason.into())
    }

    pub fn warning(reason: impl Into<String>) -> Self {
        Self {
            status: OpStatus::Warning,
            fields: Map::new(),
        }
        .with("reason", reason.into())
    }

    /// 追加一个字段（同名覆盖）
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == OpStatus::Ok
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn reason(&self) -> Option<&str> {
        self.fields.get("reason").and_then(Value::as_str)
    }

    /// 转为扁平 JSON 对象：{"status": ..., ...fields}
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("status".to_string(), Value::from(self.status.as_str()));
        Value::Object(map)
    }
}

impl fmt::Display for OpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_value() {
        let r = OpResult::ok().with("key", "user").with("value", "Alex");
        assert_eq!(
            r.to_value(),
            json!({"status": "ok", "key": "user", "value": "Alex"})
        );
        assert_eq!(serde_json::to_value(&r).unwrap(), r.to_value());
    }

    #[test]
    fn test_error_reason() {
        let r = OpResult::error("key missing");
        assert!(!r.is_ok());
        assert_eq!(r.reason(), Some("key missing"));
        assert!(r.to_string().contains("\"status\":\"error\""));
    }
}
