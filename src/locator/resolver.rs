//! # 定位器解析
//!
//! 把定位器列表解析为具体的原子表。对每个定位器依次：
//! 展开组或按标签选择、应用对称操作、按需重定心、追加到结果。
//!
//! 定义时捕获的组成员直接展开；按名称从注册表展开的组记录在栈上，
//! 自引用的组定义会立即报错；
//! 嵌套深度超过 `MAX_RESOLUTION_DEPTH` 同样报错。
//! 没有匹配到任何原子不是错误，但会记录到 `unmatched` 并输出警告。
//!
//! ## 依赖关系
//! - 被 `processor/` 使用
//! - 使用 `models/atoms.rs`

use crate::error::{PicometerError, Result};
use crate::locator::{GroupRegistry, Locator};
use crate::models::AtomSet;

/// 最大嵌套深度
pub const MAX_RESOLUTION_DEPTH: usize = 64;

/// 在给定原子全集与组注册表上的解析器
pub struct Resolver<'a> {
    universe: &'a AtomSet,
    registry: &'a GroupRegistry,
    active: Vec<String>,
    depth: usize,
    unmatched: Vec<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(universe: &'a AtomSet, registry: &'a GroupRegistry) -> Self {
        Resolver {
            universe,
            registry,
            active: Vec::new(),
            depth: 0,
            unmatched: Vec::new(),
        }
    }

    /// 解析定位器列表，按顺序拼接结果
    pub fn locate(&mut self, locators: &[Locator]) -> Result<AtomSet> {
        self.depth += 1;
        if self.depth > MAX_RESOLUTION_DEPTH {
            return Err(PicometerError::ResolutionTooDeep(MAX_RESOLUTION_DEPTH));
        }

        let mut result = AtomSet::empty();
        for locator in locators {
            let found = self.resolve(locator)?;
            result = result + found;
        }

        self.depth -= 1;
        Ok(result)
    }

    /// 未匹配任何原子的定位器标签
    pub fn into_unmatched(self) -> Vec<String> {
        self.unmatched
    }

    fn resolve(&mut self, locator: &Locator) -> Result<AtomSet> {
        let registry = self.registry;
        let selected = match (&locator.members, registry.get(&locator.label)) {
            (Some(captured), _) => self.locate(captured)?,
            (None, Some(members)) => self.expand_group(&locator.label, members)?,
            (None, None) => self.universe.select(&locator.label)?,
        };

        if selected.is_empty() {
            log::warn!("Locator '{}' matched no atoms", locator.label);
            self.unmatched.push(locator.label.clone());
        }

        let transformed = match &locator.symm {
            Some(symm) => selected.transform(symm),
            None => selected,
        };

        match &locator.at {
            Some(targets) => {
                let target = self.locate(targets)?;
                match target.centroid() {
                    Some(origin) if !transformed.is_empty() => {
                        log::debug!(
                            "Recentering '{}' at ({:.4}, {:.4}, {:.4})",
                            locator.label,
                            origin.x,
                            origin.y,
                            origin.z
                        );
                        Ok(transformed.recentered(&origin))
                    }
                    _ => Ok(transformed),
                }
            }
            None => Ok(transformed),
        }
    }

    fn expand_group(&mut self, name: &str, members: &[Locator]) -> Result<AtomSet> {
        if self.active.iter().any(|g| g == name) {
            let mut chain = self.active.clone();
            chain.push(name.to_string());
            return Err(PicometerError::GroupCycle {
                group: name.to_string(),
                chain: chain.join(" -> "),
            });
        }

        self.active.push(name.to_string());
        let expanded = self.locate(members);
        self.active.pop();
        expanded
    }
}
