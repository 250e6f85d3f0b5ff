//! # 文件解析器模块
//!
//! 结构与协方差文件的读取。
//!
//! ## 支持的格式
//! - `.cif`: CIF 1.1 晶体结构文件
//! - `.vcov`: Olex2 导出的参数协方差矩阵
//!
//! ## 依赖关系
//! - 被 `processor/`, `commands/` 使用
//! - 使用 `models/` 中的数据结构
//! - 子模块: cif, covariance, loader

pub mod cif;
pub mod covariance;
pub mod loader;

pub use loader::load_structure;
