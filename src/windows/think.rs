//! 思考窗口：保存模型最近一次的思考内容

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::windows::args::{self, decode, require};
use crate::windows::{OpResult, Window};

const DESCRIPTION: &str = "\
Scratchpad for your own reasoning. Call new_think(content) to replace the last thought;
it stays visible until you write a new one.";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NewThinkArgs {
    pub content: String,
}

pub struct ThinkWindow {
    name: String,
    last: Option<String>,
}

impl ThinkWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last: None,
        }
    }

    pub fn last_think(&self) -> Option<&str> {
        self.last.as_deref()
    }

    fn new_think(&mut self, args: NewThinkArgs) -> OpResult {
        let len = args.content.chars().count();
        self.last = Some(args.content);
        OpResult::ok().with("length", len)
    }
}

impl Window for ThinkWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        format!(
            "{DESCRIPTION}\n{}",
            args::render_operations(&[args::signature::<NewThinkArgs>("new_think")])
        )
    }

    fn render_state(&self) -> String {
        match &self.last {
            Some(content) if !content.is_empty() => format!("#last_thinks#:{content}"),
            _ => "#No last think".to_string(),
        }
    }

    fn operations(&self) -> Vec<String> {
        vec!["new_think".to_string()]
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        if op != "new_think" {
            return OpResult::error(format!("handler not found: {op}"));
        }
        if let Err(e) = require(&kwargs, &["content"], false, "content missing") {
            return e;
        }
        match decode::<NewThinkArgs>(op, kwargs) {
            Ok(a) => self.new_think(a),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_think_state() {
        let mut w = ThinkWindow::new("think_window");
        assert_eq!(w.render_state(), "#No last think");
        let r = w.invoke(
            "new_think",
            json!({"content": "the key is in the drawer"}).as_object().cloned().unwrap(),
        );
        assert!(r.is_ok());
        assert_eq!(w.render_state(), "#last_thinks#:the key is in the drawer");
        assert!(w.render_meta().contains("new_think(content)"));
    }

    #[test]
    fn test_think_requires_content() {
        let mut w = ThinkWindow::new("think_window");
        let r = w.invoke("new_think", Map::new());
        assert_eq!(r.reason(), Some("content missing"));
        assert!(w.last_think().is_none());
    }
}
