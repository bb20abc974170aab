//! 空窗口：未配置系统窗口时占位，渲染空字符串、不导出任何操作

use crate::windows::Window;

pub const NULL_WINDOW_NAME: &str = "null_window";

#[derive(Debug, Default)]
pub struct NullWindow;

impl NullWindow {
    pub fn new() -> Self {
        Self
    }
}

impl Window for NullWindow {
    fn name(&self) -> &str {
        NULL_WINDOW_NAME
    }

    fn forward(&self) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_window_is_empty() {
        let w = NullWindow::new();
        assert_eq!(w.forward(), "");
        assert!(w.operations().is_empty());
        let snap = w.divided_snapshot();
        let view = snap.get(NULL_WINDOW_NAME).unwrap();
        assert_eq!(view.meta, "");
        assert_eq!(view.state, "");
    }
}
