//! 对话窗口：记录用户与模型之间的消息
//!
//! `user_response` 通常由外部事件注入（event_call），`llm_response` 由模型主动调用（如反问用户）。

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::BoardError;
use crate::windows::args::{self, decode};
use crate::windows::{load_text, OpResult, Window};

const DEFAULT_DESCRIPTION: &str = "\
Conversation with the user. New user messages arrive here as events.
Call llm_response(text) to say something to the user (answers, clarifying questions).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatTextArgs {
    #[serde(default)]
    pub text: String,
}

pub struct ChatWindow {
    name: String,
    description: String,
    messages: Vec<ChatMessage>,
}

impl ChatWindow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn from_file(name: impl Into<String>, path: Option<&Path>) -> Result<Self, BoardError> {
        let mut w = Self::new(name);
        w.description = load_text(path, DEFAULT_DESCRIPTION)?;
        Ok(w)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    fn append(&mut self, role: Role, text: String) -> OpResult {
        self.messages.push(ChatMessage { role, text });
        OpResult::ok().with("messages", self.messages.len())
    }
}

impl Window for ChatWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        let sigs = [
            args::signature::<ChatTextArgs>("llm_response"),
            args::signature::<ChatTextArgs>("user_response"),
        ];
        format!("{}\n{}", self.description, args::render_operations(&sigs))
    }

    fn render_state(&self) -> String {
        if self.messages.is_empty() {
            return "NO USER instruction".to_string();
        }
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn operations(&self) -> Vec<String> {
        vec!["user_response".to_string(), "llm_response".to_string()]
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        let role = match op {
            "user_response" => Role::User,
            "llm_response" => Role::Assistant,
            other => return OpResult::error(format!("handler not found: {other}")),
        };
        match decode::<ChatTextArgs>(op, kwargs) {
            Ok(a) => self.append(role, a.text),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_transcript() {
        let mut w = ChatWindow::new("ChatWindow");
        assert_eq!(w.render_state(), "NO USER instruction");
        w.invoke(
            "user_response",
            json!({"text": "My name is Alex"}).as_object().cloned().unwrap(),
        );
        w.invoke(
            "llm_response",
            json!({"text": "Nice to meet you"}).as_object().cloned().unwrap(),
        );
        assert_eq!(
            w.render_state(),
            "USER: My name is Alex\nASSISTANT: Nice to meet you"
        );
        assert_eq!(w.messages().len(), 2);
    }
}
