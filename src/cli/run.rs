//! # run 子命令 CLI 定义
//!
//! 执行单个例程文件
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the routine file (YAML)
    pub routine: PathBuf,

    /// Also write the result table to this CSV file
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Write the executed instructions to this YAML file
    #[arg(long)]
    pub history: Option<PathBuf>,
}
