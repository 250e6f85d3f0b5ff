//! # 统一错误处理模块
//!
//! 定义 Picometer 的所有错误类型，使用 `thiserror` 派生。
//!
//! 指令执行期间出现的任何错误都会中止整个例程；
//! 已完成指令对处理器状态的修改会保留，不做回滚。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// Picometer 统一错误类型
#[derive(Error, Debug)]
pub enum PicometerError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 文件格式解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Invalid number: '{0}'")]
    InvalidNumber(String),

    #[error("Invalid unit cell: {0}")]
    InvalidCell(String),

    // ─────────────────────────────────────────────────────────────
    // 指令解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("Unknown instruction: '{0}'")]
    UnknownInstruction(String),

    #[error("Unknown argument '{argument}' for instruction '{keyword}'")]
    UnknownArgument { keyword: String, argument: String },

    #[error("Instruction '{keyword}' requires argument '{argument}'")]
    MissingArgument { keyword: String, argument: String },

    #[error("Invalid symmetry operation '{code}': {reason}")]
    InvalidSymmetry { code: String, reason: String },

    #[error("Invalid atom label pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // 定位解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Group '{group}' refers to itself (resolution chain: {chain})")]
    GroupCycle { group: String, chain: String },

    #[error("Locator resolution exceeded the maximum depth of {0}")]
    ResolutionTooDeep(usize),

    // ─────────────────────────────────────────────────────────────
    // 几何错误
    // ─────────────────────────────────────────────────────────────
    #[error("Unsupported operands for {operation}: {reason}")]
    UnsupportedOperands { operation: String, reason: String },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    // ─────────────────────────────────────────────────────────────
    // 设置错误
    // ─────────────────────────────────────────────────────────────
    #[error("Unknown setting name '{0}'")]
    UnknownSetting(String),

    #[error("Invalid value '{value}' for setting '{key}'")]
    InvalidSettingValue { key: String, value: String },

    // ─────────────────────────────────────────────────────────────
    // 协方差错误
    // ─────────────────────────────────────────────────────────────
    #[error("Covariance error: {0}")]
    CovarianceError(String),

    // ─────────────────────────────────────────────────────────────
    // CSV / YAML 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PicometerError>;
