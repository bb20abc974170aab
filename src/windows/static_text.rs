//! 静态文本窗口：kernel（文本作为 meta）与 code（文本作为 state），不导出操作

use std::path::Path;

use crate::core::BoardError;
use crate::windows::{load_text, Window};

const KERNEL_TEXT: &str = "\
You are the kernel of a prompt operating system. Every turn you see the full board:
windows with META (how to use them) and STATE (what they hold now).
Reply with JSON only: one call object or an array of call objects, each shaped like
{\"callType\": \"prompt\", \"funcName\": \"<operation>\", \"kwargs\": {...}, \"reasoning\": \"...\"}.
Keep the execution stack honest: push sub-tasks, move forward with stack_set_instruction,
replace a plan that failed, and pop when a sub-task is done.";

const CODE_TEXT: &str = "No program loaded.";

/// 文本放在 meta 还是 state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPlacement {
    Meta,
    State,
}

pub struct StaticWindow {
    name: String,
    content: String,
    placement: TextPlacement,
}

impl StaticWindow {
    pub fn new(name: impl Into<String>, content: impl Into<String>, placement: TextPlacement) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            placement,
        }
    }

    pub fn kernel(name: impl Into<String>, path: Option<&Path>) -> Result<Self, BoardError> {
        Ok(Self::new(name, load_text(path, KERNEL_TEXT)?, TextPlacement::Meta))
    }

    pub fn code(name: impl Into<String>, path: Option<&Path>) -> Result<Self, BoardError> {
        Ok(Self::new(name, load_text(path, CODE_TEXT)?, TextPlacement::State))
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl Window for StaticWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn render_meta(&self) -> String {
        match self.placement {
            TextPlacement::Meta => self.content.clone(),
            TextPlacement::State => String::new(),
        }
    }

    fn render_state(&self) -> String {
        match self.placement {
            TextPlacement::Meta => String::new(),
            TextPlacement::State => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kernel_text_in_meta() {
        let w = StaticWindow::kernel("Kernel", None).unwrap();
        assert!(w.render_meta().contains("prompt operating system"));
        assert_eq!(w.render_state(), "");
        assert!(w.operations().is_empty());
    }

    #[test]
    fn test_code_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "step 1: open the fridge").unwrap();
        let w = StaticWindow::code("Code", Some(file.path())).unwrap();
        assert_eq!(w.render_state(), "step 1: open the fridge");
        assert_eq!(w.render_meta(), "");
        assert!(w.forward().contains("<WINDOW START: Code>"));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = StaticWindow::kernel("Kernel", Some(Path::new("/nonexistent/kernel.md")))
            .err()
            .unwrap();
        assert!(matches!(err, BoardError::Resource { .. }));
    }
}
