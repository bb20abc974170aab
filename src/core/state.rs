//! 快照：按窗口名组织的 {meta, state} 投影
//!
//! 顺序即注册顺序；同名条目后写覆盖（原位置不变）。序列化为 JSON 对象，输出确定。

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// 单个窗口的渲染结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WindowView {
    pub meta: String,
    pub state: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<(String, WindowView)>,
}

impl Snapshot {
    pub fn single(name: impl Into<String>, view: WindowView) -> Self {
        let mut snap = Self::default();
        snap.insert(name, view);
        snap
    }

    /// 插入或覆盖同名条目
    pub fn insert(&mut self, name: impl Into<String>, view: WindowView) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = view,
            None => self.entries.push((name, view)),
        }
    }

    pub fn merge(&mut self, other: Snapshot) {
        for (name, view) in other.entries {
            self.insert(name, view);
        }
    }

    pub fn get(&self, name: &str) -> Option<&WindowView> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WindowView)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, view) in &self.entries {
            map.serialize_entry(name, view)?;
        }
        map.end()
    }
}
