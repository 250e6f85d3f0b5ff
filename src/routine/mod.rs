//! # 例程模块
//!
//! 例程是按顺序执行的指令列表，以 YAML 保存。每个文档可以包含
//! `settings`（每个键值对转为一条 `set` 指令）与 `instructions` 两部分；
//! 多个文档之间隐式插入 `clear`。
//!
//! ## 依赖关系
//! - 被 `processor/`, `commands/` 使用
//! - 子模块: instruction, settings

pub mod instruction;
pub mod settings;

pub use instruction::Instruction;
pub use settings::Settings;

use crate::error::{PicometerError, Result};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 指令序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Routine {
    instructions: Vec<Instruction>,
}

impl Routine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    /// 拼接多个例程，相邻例程之间插入 `clear`
    pub fn concatenate(routines: Vec<Routine>) -> Routine {
        let mut joined = Routine::new();
        for (i, routine) in routines.into_iter().enumerate() {
            if i > 0 {
                joined.push(Instruction::Clear);
            }
            joined.instructions.extend(routine.instructions);
        }
        joined
    }

    /// 从单个 YAML 文档构造
    pub fn from_value(document: &Value) -> Result<Routine> {
        let mut routine = Routine::new();
        let map = match document {
            Value::Null => return Ok(routine),
            Value::Sequence(items) => {
                for item in items {
                    routine.push(Instruction::from_value(item)?);
                }
                return Ok(routine);
            }
            Value::Mapping(map) => map,
            other => {
                return Err(PicometerError::InvalidInstruction(format!(
                    "a routine document must be a mapping, got {:?}",
                    other
                )))
            }
        };

        for key in map.keys() {
            match key.as_str() {
                Some("settings") | Some("instructions") => {}
                _ => log::warn!("Ignoring unknown routine section {:?}", key),
            }
        }

        match map.get("settings") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(settings)) => {
                for (key, value) in settings {
                    let key = key.as_str().ok_or_else(|| {
                        PicometerError::InvalidInstruction(
                            "setting names must be strings".to_string(),
                        )
                    })?;
                    routine.push(Instruction::Set(vec![(key.to_string(), value.clone())]));
                }
            }
            Some(_) => {
                return Err(PicometerError::InvalidInstruction(
                    "'settings' must be a mapping".to_string(),
                ))
            }
        }

        match map.get("instructions") {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                for item in items {
                    routine.push(Instruction::from_value(item)?);
                }
            }
            Some(_) => {
                return Err(PicometerError::InvalidInstruction(
                    "'instructions' must be a sequence".to_string(),
                ))
            }
        }

        Ok(routine)
    }

    /// 从例程文件读取
    pub fn from_path(path: &Path) -> Result<Routine> {
        let content = fs::read_to_string(path).map_err(|e| PicometerError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        content.parse().map_err(|e| match e {
            PicometerError::YamlError(inner) => PicometerError::ParseError {
                format: "YAML".to_string(),
                path: path.display().to_string(),
                reason: inner.to_string(),
            },
            other => other,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert(
            "instructions".into(),
            Value::Sequence(self.instructions.iter().map(Instruction::to_value).collect()),
        );
        Value::Mapping(map)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    /// 写出为单文档 YAML
    pub fn write_yaml(&self, path: &Path) -> Result<()> {
        let text = self.to_yaml_string()?;
        fs::write(path, text).map_err(|e| PicometerError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

impl FromStr for Routine {
    type Err = PicometerError;

    fn from_str(text: &str) -> Result<Routine> {
        let mut routines = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(document)?;
            routines.push(Routine::from_value(&value)?);
        }
        Ok(Routine::concatenate(routines))
    }
}

impl<'a> IntoIterator for &'a Routine {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl FromIterator<Instruction> for Routine {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Routine {
            instructions: iter.into_iter().collect(),
        }
    }
}
