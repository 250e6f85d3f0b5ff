//! # batch 子命令 CLI 定义
//!
//! 并行执行目录中的例程文件
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/batch.rs`

use clap::Args;
use std::path::PathBuf;

/// batch 子命令参数
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Routine file or directory containing routine files
    pub input: PathBuf,

    /// File name patterns, comma separated
    #[arg(short, long, default_value = "*.yaml,*.yml")]
    pub pattern: String,

    /// Search subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = all CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Directory for `<routine>.csv` result tables
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite existing result tables
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Hide the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}
