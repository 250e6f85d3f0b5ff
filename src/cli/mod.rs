//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `run`: 执行单个例程文件
//! - `batch`: 并行执行目录中的多个例程
//! - `atoms`: 查看结构文件中的晶胞与原子
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: atoms, batch, run

pub mod atoms;
pub mod batch;
pub mod run;

use crate::utils::logging::LogLevel;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Picometer - 跨多个晶体结构的几何测量
#[derive(Parser)]
#[command(name = "picometer")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(
    about = "Precisely define and measure geometry across multiple crystal structures",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity (ignored when RUST_LOG is set)
    #[arg(long, global = true, value_enum, default_value = "warn", env = "PICOMETER_LOG")]
    pub log_level: LogLevel,

    /// Write log records to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Run a routine file and print the measured values
    Run(run::RunArgs),

    /// Run every routine file in a directory in parallel
    Batch(batch::BatchArgs),

    /// Print the unit cell and atom table of a CIF file
    Atoms(atoms::AtomsArgs),
}
