//! 系统窗口：聚合若干子窗口（默认 kernel、heap、stack、code）
//!
//! forward 为各子窗口 forward 的拼接；操作表为子窗口操作的并集（重名在构造时拒绝）；
//! 结构化快照按子窗口逐个展开。

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::core::{BoardError, Snapshot};
use crate::windows::{FlowStackWindow, OpResult, Window};

pub const SYSTEM_WINDOW_NAME: &str = "system_window";

pub struct SystemWindow {
    name: String,
    children: Vec<Box<dyn Window>>,
    /// 操作名 -> 子窗口下标
    routes: HashMap<String, usize>,
}

impl SystemWindow {
    pub fn new(
        name: impl Into<String>,
        children: Vec<Box<dyn Window>>,
    ) -> Result<Self, BoardError> {
        let mut routes: HashMap<String, usize> = HashMap::new();
        for (idx, child) in children.iter().enumerate() {
            for op in child.operations() {
                if let Some(&first) = routes.get(&op) {
                    return Err(BoardError::OperationCollision {
                        operation: op,
                        first: children[first].name().to_string(),
                        second: child.name().to_string(),
                    });
                }
                routes.insert(op, idx);
            }
        }
        Ok(Self {
            name: name.into(),
            children,
            routes,
        })
    }

    pub fn children(&self) -> &[Box<dyn Window>] {
        &self.children
    }

    /// 操作名归属的子窗口名
    pub fn owner_of(&self, op: &str) -> Option<&str> {
        self.routes.get(op).map(|&idx| self.children[idx].name())
    }
}

impl Window for SystemWindow {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self) -> String {
        self.children.iter().map(|c| c.forward()).collect()
    }

    fn operations(&self) -> Vec<String> {
        self.children.iter().flat_map(|c| c.operations()).collect()
    }

    fn invoke(&mut self, op: &str, kwargs: Map<String, Value>) -> OpResult {
        match self.routes.get(op) {
            Some(&idx) => self.children[idx].invoke(op, kwargs),
            None => OpResult::error(format!("handler not found: {op}")),
        }
    }

    fn divided_snapshot(&self) -> Snapshot {
        let mut snap = Snapshot::default();
        for child in &self.children {
            snap.merge(child.divided_snapshot());
        }
        snap
    }

    fn as_stack(&self) -> Option<&FlowStackWindow> {
        self.children.iter().find_map(|c| c.as_stack())
    }

    fn as_stack_mut(&mut self) -> Option<&mut FlowStackWindow> {
        self.children.iter_mut().find_map(|c| c.as_stack_mut())
    }
}
