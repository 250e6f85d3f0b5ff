//! # 对称操作
//!
//! 解析 `-x,-y,-z`、`1-y,1+x-y,z`、`z+1;y;z` 这类仿射对称操作码，
//! 作用于分数坐标。分量之间可以用 `,` 或 `;` 分隔。
//!
//! ## 依赖关系
//! - 被 `models/atoms.rs`, `locator/` 使用
//! - 使用 `geometry/vector.rs` 的泛型运算

use crate::error::{PicometerError, Result};
use crate::geometry::{add, constant_point, transform, Point, Scalar};

use nalgebra::{Matrix3, Vector3};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// 仿射对称操作 `x' = R·x + t`（分数坐标）
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    code: String,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

fn term_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+-]?[^+-]+").expect("static regex"))
}

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?(?:/\d+(?:\.\d+)?)?)?\*?([xyz])(?:/(\d+(?:\.\d+)?))?$")
            .expect("static regex")
    })
}

fn constant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)(?:/(\d+(?:\.\d+)?))?$").expect("static regex")
    })
}

impl SymmetryOperation {
    pub fn identity() -> Self {
        SymmetryOperation {
            code: "x,y,z".to_string(),
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// 解析对称操作码
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = |reason: String| PicometerError::InvalidSymmetry {
            code: code.to_string(),
            reason,
        };

        let compact: String = code
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let parts: Vec<&str> = compact.split([',', ';']).collect();
        if parts.len() != 3 {
            return Err(invalid(format!(
                "expected 3 components, found {}",
                parts.len()
            )));
        }

        let mut rotation = Matrix3::<f64>::zeros();
        let mut translation = Vector3::<f64>::zeros();

        for (row, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(invalid(format!("component {} is empty", row + 1)));
            }

            let mut consumed = 0;
            for term in term_regex().find_iter(part) {
                consumed += term.as_str().len();
                let text = term.as_str();
                let (sign, body) = match text.as_bytes()[0] {
                    b'-' => (-1.0, &text[1..]),
                    b'+' => (1.0, &text[1..]),
                    _ => (1.0, text),
                };

                if let Some(caps) = variable_regex().captures(body) {
                    let mut coefficient = match caps.get(1) {
                        Some(m) => parse_fraction(m.as_str()).ok_or_else(|| {
                            invalid(format!("bad coefficient '{}'", m.as_str()))
                        })?,
                        None => 1.0,
                    };
                    if let Some(divisor) = caps.get(3) {
                        let divisor: f64 = divisor.as_str().parse().unwrap_or(0.0);
                        if divisor == 0.0 {
                            return Err(invalid(format!("bad divisor in '{}'", text)));
                        }
                        coefficient /= divisor;
                    }
                    let column = match &caps[2] {
                        "x" => 0,
                        "y" => 1,
                        _ => 2,
                    };
                    rotation[(row, column)] += sign * coefficient;
                } else if constant_regex().is_match(body) {
                    let value = parse_fraction(body)
                        .ok_or_else(|| invalid(format!("bad constant '{}'", body)))?;
                    translation[row] += sign * value;
                } else {
                    return Err(invalid(format!("unrecognised term '{}'", text)));
                }
            }
            if consumed != part.len() {
                return Err(invalid(format!("dangling sign in '{}'", part)));
            }
        }

        if rotation.determinant().abs() < 1e-12 {
            return Err(invalid("rotation part is singular".to_string()));
        }

        Ok(SymmetryOperation {
            code: code.trim().to_string(),
            rotation,
            translation,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Matrix3::identity() && self.translation == Vector3::zeros()
    }

    /// 逆操作 `x = R⁻¹·x' - R⁻¹·t`
    pub fn inverse(&self) -> Result<Self> {
        let rotation = self
            .rotation
            .try_inverse()
            .ok_or_else(|| PicometerError::InvalidSymmetry {
                code: self.code.clone(),
                reason: "operation is not invertible".to_string(),
            })?;
        let translation = -(rotation * self.translation);
        Ok(SymmetryOperation {
            code: format_code(&rotation, &translation),
            rotation,
            translation,
        })
    }

    /// 作用于分数坐标
    pub fn apply<T: Scalar>(&self, fract: &Point<T>) -> Point<T> {
        let rotated = transform(&self.rotation, fract);
        if self.translation == Vector3::zeros() {
            rotated
        } else {
            add(&rotated, &constant_point(&self.translation))
        }
    }
}

impl Default for SymmetryOperation {
    fn default() -> Self {
        Self::identity()
    }
}

impl FromStr for SymmetryOperation {
    type Err = PicometerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SymmetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

fn parse_fraction(text: &str) -> Option<f64> {
    match text.split_once('/') {
        Some((numerator, denominator)) => {
            let n: f64 = numerator.parse().ok()?;
            let d: f64 = denominator.parse().ok()?;
            (d != 0.0).then(|| n / d)
        }
        None => text.parse().ok(),
    }
}

/// 由矩阵生成规范的操作码，如 `-y+1/2,x,z`
fn format_code(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> String {
    (0..3)
        .map(|row| {
            let mut text = String::new();
            for (column, symbol) in ["x", "y", "z"].iter().enumerate() {
                let value = rotation[(row, column)];
                if value.abs() < 1e-9 {
                    continue;
                }
                let sign = if value < 0.0 { "-" } else if text.is_empty() { "" } else { "+" };
                let magnitude = value.abs();
                if (magnitude - 1.0).abs() < 1e-9 {
                    text.push_str(&format!("{}{}", sign, symbol));
                } else {
                    text.push_str(&format!("{}{}{}", sign, format_number(magnitude), symbol));
                }
            }
            let shift = translation[row];
            if shift.abs() > 1e-9 {
                let sign = if shift < 0.0 { "-" } else if text.is_empty() { "" } else { "+" };
                text.push_str(&format!("{}{}", sign, format_number(shift.abs())));
            }
            if text.is_empty() {
                text.push('0');
            }
            text
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn format_number(value: f64) -> String {
    for denominator in 1..=12u32 {
        let numerator = value * denominator as f64;
        if (numerator - numerator.round()).abs() < 1e-9 {
            let numerator = numerator.round() as i64;
            return if denominator == 1 {
                numerator.to_string()
            } else {
                format!("{}/{}", numerator, denominator)
            };
        }
    }
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inversion() {
        let op = SymmetryOperation::parse("-x,-y,-z").unwrap();
        assert_eq!(*op.rotation(), -Matrix3::identity());
        assert_eq!(*op.translation(), Vector3::zeros());
        assert_eq!(op.code(), "-x,-y,-z");
    }

    #[test]
    fn test_parse_separators_and_translations() {
        let a = SymmetryOperation::parse("-x;-y;-z").unwrap();
        let b = SymmetryOperation::parse("-x, -y, -z").unwrap();
        assert_eq!(a.rotation(), b.rotation());

        let op = SymmetryOperation::parse("1-y,1+x-y,z").unwrap();
        let expected = Matrix3::new(0.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(*op.rotation(), expected);
        assert_eq!(*op.translation(), Vector3::new(1.0, 1.0, 0.0));

        let op = SymmetryOperation::parse("z+1;y;x+1/2").unwrap();
        assert!((op.translation()[2] - 0.5).abs() < 1e-12);
        assert_eq!(op.rotation()[(0, 2)], 1.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SymmetryOperation::parse("x,y").is_err());
        assert!(SymmetryOperation::parse("x,y,w").is_err());
        assert!(SymmetryOperation::parse("x,y,").is_err());
        assert!(SymmetryOperation::parse("x,x,z").is_err());
        assert!(SymmetryOperation::parse("x,y,z-").is_err());
    }

    #[test]
    fn test_apply_and_inverse() {
        let op = SymmetryOperation::parse("1-y,1+x-y,z+1/2").unwrap();
        let inverse = op.inverse().unwrap();
        let point = [0.1234, -0.3, 0.77];

        let moved = op.apply(&point);
        let back = inverse.apply(&moved);
        for k in 0..3 {
            assert!((back[k] - point[k]).abs() < 1e-9);
        }
        assert!(SymmetryOperation::parse(inverse.code()).is_ok());
    }

    #[test]
    fn test_identity() {
        let op = SymmetryOperation::parse("x,y,z").unwrap();
        assert!(op.is_identity());
        assert!(SymmetryOperation::identity().is_identity());
        assert!(!SymmetryOperation::parse("x+1,y,z").unwrap().is_identity());
    }
}
