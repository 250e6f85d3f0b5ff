//! # 指令
//!
//! 封闭的指令集合，以及与 YAML 值之间的双向转换。
//!
//! 一条指令可以是裸关键字字符串（`clear`），也可以是只有一个键的映射；
//! 映射的值为标量时绑定到该指令的第一个参数，为映射时按参数名解析。
//!
//! ## 依赖关系
//! - 被 `routine/mod.rs`, `processor/` 使用
//! - 使用 `locator/`, `models/symmetry.rs`

use crate::error::{PicometerError, Result};
use crate::locator::Locator;
use crate::models::SymmetryOperation;

use serde_yaml::{Mapping, Value};
use std::fmt;

/// 单条指令
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// 加载结构文件
    Load {
        path: String,
        block: Option<String>,
        cov: Option<String>,
    },
    /// 追加定位器到选择；无标签时清空选择
    Select(Option<Locator>),
    /// 把选择中每个定位器的重定心目标替换为此定位器
    Recenter(Locator),
    Group { label: String },
    Centroid { label: String },
    Line { label: String },
    Plane { label: String },
    Distance { label: String },
    Angle { label: String },
    Dihedral { label: String },
    /// 导出结果表
    Write { path: String },
    /// 重置全部处理器状态
    Clear,
    Set(Vec<(String, Value)>),
}

/// 各指令接受的参数名，第一个为默认参数
fn expected_arguments(keyword: &str) -> Option<&'static [&'static str]> {
    match keyword {
        "load" => Some(&["path", "block", "cov"]),
        "select" | "recenter" => Some(&["label", "symm", "at"]),
        "group" | "centroid" | "line" | "plane" | "distance" | "angle" | "dihedral" => {
            Some(&["label"])
        }
        "write" => Some(&["path"]),
        "clear" => Some(&[]),
        "set" => Some(&[]),
        _ => None,
    }
}

/// 已校验的参数表
struct Arguments {
    keyword: String,
    values: Vec<(String, Value)>,
}

impl Arguments {
    fn parse(keyword: &str, raw: &Value, expected: &[&str]) -> Result<Self> {
        let mut values = Vec::new();
        match raw {
            Value::Null => {}
            Value::Mapping(map) => {
                for (key, value) in map {
                    let key = scalar_to_string(key).ok_or_else(|| {
                        PicometerError::InvalidInstruction(format!(
                            "argument names of '{}' must be strings",
                            keyword
                        ))
                    })?;
                    if !expected.contains(&key.as_str()) {
                        return Err(PicometerError::UnknownArgument {
                            keyword: keyword.to_string(),
                            argument: key,
                        });
                    }
                    values.push((key, value.clone()));
                }
            }
            other => match expected.first() {
                Some(first) => values.push((first.to_string(), other.clone())),
                None => {
                    return Err(PicometerError::InvalidInstruction(format!(
                        "'{}' takes no arguments",
                        keyword
                    )))
                }
            },
        }
        Ok(Arguments {
            keyword: keyword.to_string(),
            values,
        })
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    fn string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => scalar_to_string(value).map(Some).ok_or_else(|| {
                PicometerError::InvalidInstruction(format!(
                    "argument '{}' of '{}' must be a scalar",
                    name, self.keyword
                ))
            }),
        }
    }

    fn required(&self, name: &str) -> Result<String> {
        self.string(name)?
            .ok_or_else(|| PicometerError::MissingArgument {
                keyword: self.keyword.clone(),
                argument: name.to_string(),
            })
    }

    fn locator(&self) -> Result<Option<Locator>> {
        let Some(label) = self.string("label")? else {
            return Ok(None);
        };
        let mut locator = Locator::new(label);
        if let Some(code) = self.string("symm")? {
            locator.symm = Some(SymmetryOperation::parse(&code)?);
        }
        if let Some(at) = self.get("at") {
            locator.at = Some(locators_from_value(at)?);
        }
        Ok(Some(locator))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 解析重定心目标：标签字符串、定位器映射或二者组成的序列
pub fn locators_from_value(value: &Value) -> Result<Vec<Locator>> {
    match value {
        Value::Sequence(items) => items.iter().map(locator_from_value).collect(),
        other => Ok(vec![locator_from_value(other)?]),
    }
}

fn locator_from_value(value: &Value) -> Result<Locator> {
    match value {
        Value::Mapping(_) => {
            let args = Arguments::parse("at", value, &["label", "symm", "at"])?;
            args.locator()?.ok_or_else(|| PicometerError::MissingArgument {
                keyword: "at".to_string(),
                argument: "label".to_string(),
            })
        }
        other => scalar_to_string(other).map(Locator::new).ok_or_else(|| {
            PicometerError::InvalidInstruction(format!(
                "cannot interpret {:?} as an atom locator",
                other
            ))
        }),
    }
}

/// 定位器 → YAML；只有标签时写成字符串
pub fn locator_to_value(locator: &Locator) -> Value {
    if locator.symm.is_none() && locator.at.is_none() {
        return Value::String(locator.label.clone());
    }
    let mut map = Mapping::new();
    map.insert("label".into(), locator.label.clone().into());
    if let Some(symm) = &locator.symm {
        map.insert("symm".into(), symm.code().into());
    }
    if let Some(at) = &locator.at {
        map.insert(
            "at".into(),
            Value::Sequence(at.iter().map(locator_to_value).collect()),
        );
    }
    Value::Mapping(map)
}

impl Instruction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Instruction::Load { .. } => "load",
            Instruction::Select(_) => "select",
            Instruction::Recenter(_) => "recenter",
            Instruction::Group { .. } => "group",
            Instruction::Centroid { .. } => "centroid",
            Instruction::Line { .. } => "line",
            Instruction::Plane { .. } => "plane",
            Instruction::Distance { .. } => "distance",
            Instruction::Angle { .. } => "angle",
            Instruction::Dihedral { .. } => "dihedral",
            Instruction::Write { .. } => "write",
            Instruction::Clear => "clear",
            Instruction::Set(_) => "set",
        }
    }

    /// 从 YAML 值解析指令
    pub fn from_value(value: &Value) -> Result<Instruction> {
        let (keyword, raw) = match value {
            Value::String(keyword) => (keyword.as_str(), &Value::Null),
            Value::Mapping(map) if map.len() == 1 => {
                let (key, raw) = map.iter().next().ok_or_else(|| {
                    PicometerError::InvalidInstruction("empty instruction".to_string())
                })?;
                let keyword = key.as_str().ok_or_else(|| {
                    PicometerError::InvalidInstruction(format!(
                        "instruction keyword must be a string, got {:?}",
                        key
                    ))
                })?;
                (keyword, raw)
            }
            Value::Mapping(map) => {
                return Err(PicometerError::InvalidInstruction(format!(
                    "an instruction must contain exactly one keyword, found {}",
                    map.len()
                )))
            }
            other => {
                return Err(PicometerError::InvalidInstruction(format!(
                    "cannot interpret {:?} as an instruction",
                    other
                )))
            }
        };

        let expected = expected_arguments(keyword)
            .ok_or_else(|| PicometerError::UnknownInstruction(keyword.to_string()))?;

        if keyword == "set" {
            return match raw {
                Value::Null => Ok(Instruction::Set(Vec::new())),
                Value::Mapping(map) => {
                    let mut pairs = Vec::with_capacity(map.len());
                    for (key, value) in map {
                        let key = scalar_to_string(key).ok_or_else(|| {
                            PicometerError::InvalidInstruction(
                                "setting names must be strings".to_string(),
                            )
                        })?;
                        pairs.push((key, value.clone()));
                    }
                    Ok(Instruction::Set(pairs))
                }
                _ => Err(PicometerError::InvalidInstruction(
                    "'set' expects a mapping of setting names to values".to_string(),
                )),
            };
        }

        let args = Arguments::parse(keyword, raw, expected)?;
        let label = || args.required("label");

        Ok(match keyword {
            "load" => Instruction::Load {
                path: args.required("path")?,
                block: args.string("block")?,
                cov: args.string("cov")?,
            },
            "select" => Instruction::Select(args.locator()?),
            "recenter" => Instruction::Recenter(args.locator()?.ok_or_else(|| {
                PicometerError::MissingArgument {
                    keyword: "recenter".to_string(),
                    argument: "label".to_string(),
                }
            })?),
            "group" => Instruction::Group { label: label()? },
            "centroid" => Instruction::Centroid { label: label()? },
            "line" => Instruction::Line { label: label()? },
            "plane" => Instruction::Plane { label: label()? },
            "distance" => Instruction::Distance { label: label()? },
            "angle" => Instruction::Angle { label: label()? },
            "dihedral" => Instruction::Dihedral { label: label()? },
            "write" => Instruction::Write {
                path: args.required("path")?,
            },
            _ => Instruction::Clear,
        })
    }

    /// 指令 → YAML；只有默认参数时使用紧凑写法
    pub fn to_value(&self) -> Value {
        let single = |keyword: &str, value: Value| {
            let mut map = Mapping::new();
            map.insert(keyword.into(), value);
            Value::Mapping(map)
        };

        match self {
            Instruction::Load { path, block, cov } => {
                if block.is_none() && cov.is_none() {
                    return single("load", path.clone().into());
                }
                let mut args = Mapping::new();
                args.insert("path".into(), path.clone().into());
                if let Some(block) = block {
                    args.insert("block".into(), block.clone().into());
                }
                if let Some(cov) = cov {
                    args.insert("cov".into(), cov.clone().into());
                }
                single("load", Value::Mapping(args))
            }
            Instruction::Select(None) => Value::String("select".to_string()),
            Instruction::Select(Some(locator)) => single("select", locator_to_value(locator)),
            Instruction::Recenter(locator) => single("recenter", locator_to_value(locator)),
            Instruction::Group { label }
            | Instruction::Centroid { label }
            | Instruction::Line { label }
            | Instruction::Plane { label }
            | Instruction::Distance { label }
            | Instruction::Angle { label }
            | Instruction::Dihedral { label } => single(self.keyword(), label.clone().into()),
            Instruction::Write { path } => single("write", path.clone().into()),
            Instruction::Clear => Value::String("clear".to_string()),
            Instruction::Set(pairs) => {
                let mut args = Mapping::new();
                for (key, value) in pairs {
                    args.insert(key.clone().into(), value.clone());
                }
                single("set", Value::Mapping(args))
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load { path, block, .. } => match block {
                Some(block) => write!(f, "load {}:{}", path, block),
                None => write!(f, "load {}", path),
            },
            Instruction::Select(None) => write!(f, "select (clear selection)"),
            Instruction::Select(Some(locator)) => write!(f, "select {}", locator),
            Instruction::Recenter(locator) => write!(f, "recenter at {}", locator),
            Instruction::Group { label }
            | Instruction::Centroid { label }
            | Instruction::Line { label }
            | Instruction::Plane { label }
            | Instruction::Distance { label }
            | Instruction::Angle { label }
            | Instruction::Dihedral { label } => write!(f, "{} {}", self.keyword(), label),
            Instruction::Write { path } => write!(f, "write {}", path),
            Instruction::Clear => write!(f, "clear"),
            Instruction::Set(pairs) => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                write!(f, "set {}", keys.join(", "))
            }
        }
    }
}
