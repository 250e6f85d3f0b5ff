//! # 数据模型模块
//!
//! 定义数值、坐标系、对称操作、原子表与结构状态。
//!
//! ## 依赖关系
//! - 被 `locator/`, `parsers/`, `processor/` 使用
//! - 子模块: uncertain, frame, symmetry, atoms, state

pub mod atoms;
pub mod frame;
pub mod state;
pub mod symmetry;
pub mod uncertain;

pub use atoms::{Atom, AtomSet, U_COMPONENTS};
pub use frame::CoordinateFrame;
pub use state::{ModelState, ModelStates};
pub use symmetry::SymmetryOperation;
pub use uncertain::{correlated_values, parse_cif_number, Uncertain};
