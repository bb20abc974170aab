//! 操作参数：每个操作对应一个强类型参数结构，在分发边界完成校验
//!
//! 模型给出的 kwargs 先经 `require` 做必填检查（给出可读的错误原因），
//! 再经 `decode` 反序列化为具体结构；签名文本由 schemars 生成，拼入各窗口的 meta。

use schemars::gen::SchemaGenerator;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::windows::OpResult;

/// 无参数操作
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

/// 将 kwargs 反序列化为某操作的参数结构；失败时给出带操作名的错误结果
pub fn decode<T: DeserializeOwned>(op: &str, kwargs: Map<String, Value>) -> Result<T, OpResult> {
    serde_json::from_value(Value::Object(kwargs))
        .map_err(|e| OpResult::error(format!("invalid arguments for {op}: {e}")))
}

/// 必填检查：names 中任一别名存在且非 null 即视为已提供；non_empty 时空字符串也视为缺失
pub fn require(
    kwargs: &Map<String, Value>,
    names: &[&str],
    non_empty: bool,
    message: &str,
) -> Result<(), OpResult> {
    let present = names.iter().any(|name| match kwargs.get(*name) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) if non_empty => !s.trim().is_empty(),
        Some(_) => true,
    });
    if present {
        Ok(())
    } else {
        Err(OpResult::error(message))
    }
}

/// 生成操作签名，如 `heap_set(key, value)`；可选参数带 `?`
pub fn signature<T: JsonSchema>(op: &str) -> String {
    let root = SchemaGenerator::default().into_root_schema_for::<T>();
    let params: Vec<String> = match root.schema.object.as_ref() {
        Some(object) => object
            .properties
            .keys()
            .map(|key| {
                if object.required.contains(key) {
                    key.clone()
                } else {
                    format!("{key}?")
                }
            })
            .collect(),
        None => Vec::new(),
    };
    format!("{op}({})", params.join(", "))
}

/// 把若干签名渲染为 meta 中的操作清单
pub fn render_operations(signatures: &[String]) -> String {
    let mut s = String::from("Operations:\n");
    for sig in signatures {
        s.push_str(&format!("- {sig}\n"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        key: String,
        #[serde(default)]
        note: Option<String>,
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_signature_marks_optional() {
        assert_eq!(signature::<Sample>("sample"), "sample(key, note?)");
        assert_eq!(signature::<NoArgs>("noop"), "noop()");
    }

    #[test]
    fn test_decode_rejects_unknown_field() {
        let err = decode::<Sample>("sample", map(json!({"key": "a", "bogus": 1}))).unwrap_err();
        assert!(err.reason().unwrap().contains("invalid arguments for sample"));
    }

    #[test]
    fn test_require_non_empty() {
        let kwargs = map(json!({"a": "", "b": null, "c": 0}));
        assert!(require(&kwargs, &["a"], true, "a").is_err());
        assert!(require(&kwargs, &["a"], false, "a").is_ok());
        assert!(require(&kwargs, &["b"], false, "b").is_err());
        assert!(require(&kwargs, &["x", "c"], true, "c").is_ok());
    }
}
