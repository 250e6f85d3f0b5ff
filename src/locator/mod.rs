//! # 定位器模块
//!
//! 定位器是对一组原子的声明式引用：标签或正则模式、可选的对称操作、
//! 可选的重定心目标（嵌套的定位器列表）。
//! 组（group）是具名的定位器列表快照。定义组时，其中引用到的已有组
//! 会把当时的成员一并捕获，之后重新定义被引用的组不影响已定义的组。
//!
//! ## 依赖关系
//! - 被 `routine/`, `processor/` 使用
//! - 子模块: resolver

pub mod resolver;

pub use resolver::Resolver;

use crate::models::SymmetryOperation;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 原子定位器
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    /// 原子标签、正则模式或组名
    pub label: String,

    /// 对称操作；未指定时为恒等操作
    pub symm: Option<SymmetryOperation>,

    /// 重定心目标
    pub at: Option<Vec<Locator>>,

    /// 定义组时捕获的组成员；为空时按标签在注册表或原子表中查找
    pub members: Option<Arc<[Locator]>>,
}

impl Locator {
    pub fn new(label: impl Into<String>) -> Self {
        Locator {
            label: label.into(),
            symm: None,
            at: None,
            members: None,
        }
    }

    pub fn with_symm(mut self, symm: SymmetryOperation) -> Self {
        self.symm = Some(symm);
        self
    }

    pub fn with_at(mut self, at: Vec<Locator>) -> Self {
        self.at = Some(at);
        self
    }

    /// 实际生效的对称操作
    pub fn operation(&self) -> SymmetryOperation {
        self.symm.clone().unwrap_or_default()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(symm) = &self.symm {
            write!(f, " [{}]", symm)?;
        }
        if let Some(at) = &self.at {
            let targets: Vec<String> = at.iter().map(|l| l.to_string()).collect();
            write!(f, " @ ({})", targets.join(", "))?;
        }
        Ok(())
    }
}

/// 组注册表
///
/// 组在定义时保存定位器列表的深拷贝，之后修改被引用的组不会影响已定义的组。
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    groups: HashMap<String, Vec<Locator>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定义组；同名组直接覆盖
    ///
    /// 引用到的已有组（包括重定心目标中的）在此刻捕获成员。
    pub fn define(&mut self, name: impl Into<String>, locators: Vec<Locator>) {
        let name = name.into();
        let captured = locators.into_iter().map(|l| self.capture(l)).collect();
        if self.groups.insert(name.clone(), captured).is_some() {
            log::debug!("Group '{}' redefined", name);
        }
    }

    fn capture(&self, mut locator: Locator) -> Locator {
        if locator.members.is_none() {
            locator.members = self.get(&locator.label).map(Arc::from);
        }
        if let Some(targets) = locator.at.take() {
            locator.at = Some(targets.into_iter().map(|t| self.capture(t)).collect());
        }
        locator
    }

    pub fn get(&self, name: &str) -> Option<&[Locator]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_overwrites() {
        let mut registry = GroupRegistry::new();
        registry.define("G", vec![Locator::new("A")]);
        registry.define("G", vec![Locator::new("B"), Locator::new("C")]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("G").unwrap().len(), 2);
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains("G"));
    }

    #[test]
    fn test_define_captures_referenced_groups() {
        let mut registry = GroupRegistry::new();
        registry.define("G", vec![Locator::new("X")]);
        registry.define("H", vec![Locator::new("Fe").with_at(vec![Locator::new("G")])]);

        let h = registry.get("H").unwrap();
        let target = &h[0].at.as_ref().unwrap()[0];
        assert_eq!(target.members.as_deref(), Some(&[Locator::new("X")][..]));
        assert!(h[0].members.is_none());
    }

    #[test]
    fn test_locator_display() {
        let loc = Locator::new("Fe")
            .with_symm(SymmetryOperation::parse("-x,-y,-z").unwrap())
            .with_at(vec![Locator::new("cp")]);
        assert_eq!(loc.to_string(), "Fe [-x,-y,-z] @ (cp)");
        assert!(Locator::new("Fe").operation().is_identity());
    }
}
