//! # atoms 子命令 CLI 定义
//!
//! 查看结构文件
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/atoms.rs`

use clap::Args;
use std::path::PathBuf;

/// atoms 子命令参数
#[derive(Args, Debug)]
pub struct AtomsArgs {
    /// Path to the CIF file
    pub input: PathBuf,

    /// Data block name (defaults to the first block)
    #[arg(long)]
    pub block: Option<String>,

    /// Show standard uncertainties from the file
    #[arg(long, default_value_t = false)]
    pub uncertainty: bool,
}
