//! # Picometer - 跨多个晶体结构的几何测量
//!
//! 按例程（YAML 指令序列）在一个或多个晶体结构上定义原子、质心、
//! 直线与平面，并测量距离、夹角与二面角。
//!
//! ## 子命令
//! - `run`   - 执行单个例程文件
//! - `batch` - 并行执行目录中的例程文件
//! - `atoms` - 查看结构文件中的晶胞与原子
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── processor/ (指令处理器与结果表)
//!   │     ├── routine/   (例程与指令)
//!   │     ├── locator/   (定位器解析)
//!   │     ├── parsers/   (CIF 与协方差读取)
//!   │     ├── geometry/  (向量与形状)
//!   │     └── models/    (数据模型)
//!   ├── batch/      (批量执行)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod error;
#[cfg(test)]
mod fixtures;
mod geometry;
mod locator;
mod models;
mod parsers;
mod processor;
mod routine;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = utils::logging::init(cli.log_level, cli.log_file.as_deref()) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
