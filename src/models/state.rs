//! # 结构状态
//!
//! 每个已加载结构对应一个 `ModelState`：基础原子表、逐步追加的质心原子表，
//! 以及按名称存储的直线/平面。定位器在 "nodes"（基础原子 ∪ 质心）上解析。
//!
//! ## 依赖关系
//! - 被 `processor/` 使用
//! - 使用 `models/atoms.rs`, `geometry/shapes.rs`

use crate::error::{PicometerError, Result};
use crate::geometry::{Explicit, Point};
use crate::models::{Atom, AtomSet, Uncertain};

use std::collections::HashMap;

/// 单个结构的状态
#[derive(Debug, Clone)]
pub struct ModelState {
    pub atoms: AtomSet,
    pub centroids: AtomSet,
    pub shapes: HashMap<String, Explicit>,
}

impl ModelState {
    pub fn new(atoms: AtomSet) -> Self {
        ModelState {
            atoms,
            centroids: AtomSet::empty(),
            shapes: HashMap::new(),
        }
    }

    /// 基础原子与质心的并集
    pub fn nodes(&self) -> AtomSet {
        self.atoms.clone() + self.centroids.clone()
    }

    /// 追加一个质心原子（分数坐标）
    pub fn add_centroid(&mut self, label: &str, fract: Point<Uncertain>) -> Result<()> {
        let frame = self.atoms.frame().cloned().ok_or_else(|| {
            PicometerError::DegenerateGeometry(format!(
                "cannot place centroid '{}' in a structure without a unit cell",
                label
            ))
        })?;
        let centroid = AtomSet::new(frame, vec![Atom::with_fract(label, fract)]);
        let existing = std::mem::take(&mut self.centroids);
        self.centroids = existing + centroid;
        Ok(())
    }
}

/// 按插入顺序排列的结构状态集合
#[derive(Debug, Clone, Default)]
pub struct ModelStates {
    entries: Vec<(String, ModelState)>,
}

impl ModelStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入结构状态；同名标签原位替换
    pub fn insert(&mut self, label: impl Into<String>, state: ModelState) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = state,
            None => self.entries.push((label, state)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&ModelState> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| s)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelState)> {
        self.entries.iter().map(|(l, s)| (l.as_str(), s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut ModelState)> {
        self.entries.iter_mut().map(|(l, s)| (l.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CoordinateFrame;
    use std::sync::Arc;

    fn state(label: &str) -> ModelState {
        let frame = Arc::new(CoordinateFrame::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0).unwrap());
        ModelState::new(AtomSet::new(frame, vec![Atom::new(label, [0.0; 3])]))
    }

    #[test]
    fn test_nodes_include_centroids() {
        let mut s = state("Fe");
        s.add_centroid("cp", [0.5, 0.5, 0.5].map(Uncertain::exact)).unwrap();
        s.add_centroid("cq", [0.1, 0.1, 0.1].map(Uncertain::exact)).unwrap();

        let labels: Vec<String> = s.nodes().labels().map(String::from).collect();
        assert_eq!(labels, vec!["Fe", "cp", "cq"]);
        assert_eq!(s.atoms.len(), 1);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut states = ModelStates::new();
        states.insert("a.cif", state("A"));
        states.insert("b.cif", state("B"));
        states.insert("a.cif", state("C"));

        assert_eq!(states.len(), 2);
        assert_eq!(states.labels().collect::<Vec<_>>(), vec!["a.cif", "b.cif"]);
        let first = states.get("a.cif").unwrap();
        assert_eq!(first.atoms.labels().next(), Some("C"));
    }
}
