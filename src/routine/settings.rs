//! # 设置
//!
//! 带默认值的类型化设置项。未知的键报错；设为 `null` 恢复默认值。
//!
//! ## 依赖关系
//! - 被 `processor/`, `parsers/loader.rs` 使用
//! - 使用 `serde_yaml::Value` 作为设置值的载体

use crate::error::{PicometerError, Result};

use serde_yaml::Value;

/// 所有已知设置名称
pub const SETTING_NAMES: [&str; 2] = ["clear_selection_after_use", "propagate_uncertainty"];

/// 处理器设置
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 消耗选择的指令执行后清空选择
    pub clear_selection_after_use: bool,

    /// 加载结构时保留文件中的标准不确定度
    pub propagate_uncertainty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            clear_selection_after_use: true,
            propagate_uncertainty: false,
        }
    }
}

impl Settings {
    /// 设置单个键
    pub fn set(&mut self, key: &str, value: &Value) -> Result<()> {
        let defaults = Settings::default();
        match key {
            "clear_selection_after_use" => {
                self.clear_selection_after_use =
                    parse_bool(key, value)?.unwrap_or(defaults.clear_selection_after_use);
            }
            "propagate_uncertainty" => {
                self.propagate_uncertainty =
                    parse_bool(key, value)?.unwrap_or(defaults.propagate_uncertainty);
            }
            _ => return Err(PicometerError::UnknownSetting(key.to_string())),
        }
        log::debug!("Setting '{}' = {:?}", key, self.get(key));
        Ok(())
    }

    /// 批量合并；任一键无效时不修改任何设置
    pub fn update(&mut self, pairs: &[(String, Value)]) -> Result<()> {
        let mut staged = self.clone();
        for (key, value) in pairs {
            staged.set(key, value)?;
        }
        *self = staged;
        Ok(())
    }

    /// 恢复默认值
    pub fn reset(&mut self, key: &str) -> Result<()> {
        self.set(key, &Value::Null)
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        match key {
            "clear_selection_after_use" => Ok(Value::Bool(self.clear_selection_after_use)),
            "propagate_uncertainty" => Ok(Value::Bool(self.propagate_uncertainty)),
            _ => Err(PicometerError::UnknownSetting(key.to_string())),
        }
    }
}

fn parse_bool(key: &str, value: &Value) -> Result<Option<bool>> {
    let invalid = || PicometerError::InvalidSettingValue {
        key: key.to_string(),
        value: match value {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        },
    };
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid()),
        },
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(Some(true)),
            "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}
