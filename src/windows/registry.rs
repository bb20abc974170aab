//! 窗口注册表
//!
//! 名称（含别名）-> 工厂函数。配置中的每个窗口条目（`WindowSpec`）经 `create` 实例化；
//! 未注册的名称返回 `BoardError::NotRegistered`。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::BoardError;
use crate::windows::system::SYSTEM_WINDOW_NAME;
use crate::windows::{
    ChatWindow, ErrorWindow, FlowStackWindow, HeapWindow, NullWindow, StackLimits, StaticWindow,
    SystemWindow, ThinkWindow, Window,
};

/// 配置中的窗口条目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// 注册名（或别名），如 `heap`、`flowStack`、`system_window`
    pub kind: String,
    /// 实例名；缺省使用该类窗口的默认名
    #[serde(default)]
    pub name: Option<String>,
    /// 描述/正文文件；给出但读不到时为启动期错误
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// 仅聚合窗口使用
    #[serde(default)]
    pub children: Vec<WindowSpec>,
}

impl WindowSpec {
    pub fn of(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn name_or(&self, default: &str) -> String {
        self.name.clone().unwrap_or_else(|| default.to_string())
    }
}

/// 窗口工厂：由条目与注册表（用于递归创建子窗口）构造窗口
pub type WindowFactory =
    Arc<dyn Fn(&WindowSpec, &WindowRegistry) -> Result<Box<dyn Window>, BoardError> + Send + Sync>;

pub struct WindowRegistry {
    factories: HashMap<String, WindowFactory>,
    limits: StackLimits,
}

impl WindowRegistry {
    /// 空注册表
    pub fn new(limits: StackLimits) -> Self {
        Self {
            factories: HashMap::new(),
            limits,
        }
    }

    /// 注册全部内置窗口及其别名
    pub fn with_builtins(limits: StackLimits) -> Self {
        let mut reg = Self::new(limits);

        reg.register(&["heap", "Heap"], |spec, _| {
            Ok(Box::new(HeapWindow::from_file(
                spec.name_or("Heap"),
                spec.file.as_deref(),
            )?))
        });
        reg.register(&["flowStack", "stack"], |spec, reg| {
            Ok(Box::new(FlowStackWindow::from_file(
                spec.name_or("FlowStackWindow"),
                reg.stack_limits(),
                spec.file.as_deref(),
            )?))
        });
        reg.register(&["kernel", "Kernel"], |spec, _| {
            Ok(Box::new(StaticWindow::kernel(
                spec.name_or("Kernel"),
                spec.file.as_deref(),
            )?))
        });
        reg.register(&["code", "Code"], |spec, _| {
            Ok(Box::new(StaticWindow::code(
                spec.name_or("Code"),
                spec.file.as_deref(),
            )?))
        });
        reg.register(&["think_window"], |spec, _| {
            Ok(Box::new(ThinkWindow::new(spec.name_or("think_window"))))
        });
        reg.register(&["ChatWindow", "chatWindow"], |spec, _| {
            Ok(Box::new(ChatWindow::from_file(
                spec.name_or("ChatWindow"),
                spec.file.as_deref(),
            )?))
        });
        reg.register(&["error_window", "ErrorWindow"], |spec, _| {
            Ok(Box::new(ErrorWindow::new(spec.name_or("ErrorWindow"))))
        });
        reg.register(&["NullWindow"], |_, _| Ok(Box::new(NullWindow::new())));
        reg.register(&[SYSTEM_WINDOW_NAME], |spec, reg| {
            let children: Vec<WindowSpec> = if spec.children.is_empty() {
                ["kernel", "heap", "flowStack", "code"]
                    .into_iter()
                    .map(WindowSpec::of)
                    .collect()
            } else {
                spec.children.clone()
            };
            let windows = children
                .iter()
                .map(|c| reg.create(c))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(SystemWindow::new(
                spec.name_or(SYSTEM_WINDOW_NAME),
                windows,
            )?))
        });

        reg
    }

    /// 以若干名称（别名）注册同一个工厂；同名覆盖
    pub fn register<F>(&mut self, names: &[&str], factory: F)
    where
        F: Fn(&WindowSpec, &WindowRegistry) -> Result<Box<dyn Window>, BoardError>
            + Send
            + Sync
            + 'static,
    {
        let factory: WindowFactory = Arc::new(factory);
        for name in names {
            self.factories.insert(name.to_string(), factory.clone());
        }
    }

    pub fn create(&self, spec: &WindowSpec) -> Result<Box<dyn Window>, BoardError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| BoardError::NotRegistered(spec.kind.clone()))?;
        let window = factory(spec, self)?;
        tracing::debug!(kind = %spec.kind, window = %window.name(), "window created");
        Ok(window)
    }

    pub fn create_by_name(&self, name: &str) -> Result<Box<dyn Window>, BoardError> {
        self.create(&WindowSpec::of(name))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 已注册名称（排序，便于日志与错误提示）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stack_limits(&self) -> StackLimits {
        self.limits
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::with_builtins(StackLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve() {
        let reg = WindowRegistry::default();
        assert_eq!(reg.create_by_name("heap").unwrap().name(), "Heap");
        assert_eq!(reg.create_by_name("Heap").unwrap().name(), "Heap");
        assert_eq!(reg.create_by_name("stack").unwrap().name(), "FlowStackWindow");
        assert_eq!(reg.create_by_name("chatWindow").unwrap().name(), "ChatWindow");
        assert!(reg.is_registered("error_window"));
    }

    #[test]
    fn test_unknown_name_fails() {
        let reg = WindowRegistry::default();
        let err = reg.create_by_name("quantum_window").err().unwrap();
        assert!(matches!(err, BoardError::NotRegistered(ref n) if n == "quantum_window"));
    }

    #[test]
    fn test_named_instance_and_limits() {
        let limits = StackLimits {
            history_capacity: 4,
            ..StackLimits::default()
        };
        let reg = WindowRegistry::with_builtins(limits);
        let w = reg.create(&WindowSpec::of("flowStack").named("Plan")).unwrap();
        assert_eq!(w.name(), "Plan");
        assert_eq!(w.as_stack().unwrap().limits().history_capacity, 4);
    }

    #[test]
    fn test_system_window_default_children() {
        let reg = WindowRegistry::default();
        let sys = reg.create_by_name("system_window").unwrap();
        let snap = sys.divided_snapshot();
        assert_eq!(snap.len(), 4);
        assert!(sys.as_stack().is_some());
    }

    #[test]
    fn test_custom_factory() {
        let mut reg = WindowRegistry::new(StackLimits::default());
        reg.register(&["notes"], |spec, _| {
            Ok(Box::new(HeapWindow::new(spec.name_or("Notes"))))
        });
        assert_eq!(reg.create_by_name("notes").unwrap().name(), "Notes");
        assert!(!reg.is_registered("heap"));
    }
}
