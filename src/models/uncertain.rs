//! # 不确定度数值
//!
//! 带一阶线性误差传播的数值类型。每个值由标称值和若干独立单位方差变量的
//! 线性系数组成，因此相关性自动保留（例如 `a - a` 的标准差为零）。
//!
//! 晶体学记法 `1.234(5)` 的解析与格式化也在此实现。
//!
//! ## 依赖关系
//! - 被 `models/atoms.rs`, `geometry/`, `parsers/`, `processor/` 使用
//! - 使用 `geometry/vector.rs` 的 `Scalar` trait
//! - 使用 `nalgebra` 做协方差矩阵的对称特征分解

use crate::error::{PicometerError, Result};
use crate::geometry::Scalar;

use nalgebra::{DMatrix, SymmetricEigen};
use regex::Regex;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static NEXT_VARIABLE: AtomicU64 = AtomicU64::new(0);

fn new_variable() -> u64 {
    NEXT_VARIABLE.fetch_add(1, Ordering::Relaxed)
}

/// 带不确定度的数值
///
/// `terms` 按变量编号升序排列，每项为 (变量编号, 偏导系数)。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Uncertain {
    nominal: f64,
    terms: Vec<(u64, f64)>,
}

impl Uncertain {
    /// 无不确定度的精确值
    pub fn exact(nominal: f64) -> Self {
        Self {
            nominal,
            terms: Vec::new(),
        }
    }

    /// 创建一个新的独立变量
    pub fn new(nominal: f64, std_dev: f64) -> Self {
        if std_dev == 0.0 || !std_dev.is_finite() {
            return Self::exact(nominal);
        }
        Self {
            nominal,
            terms: vec![(new_variable(), std_dev.abs())],
        }
    }

    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    pub fn variance(&self) -> f64 {
        self.terms.iter().map(|(_, c)| c * c).sum()
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 两个值之间的协方差
    pub fn covariance(&self, other: &Uncertain) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.terms.len() && j < other.terms.len() {
            let (vi, ci) = self.terms[i];
            let (vj, cj) = other.terms[j];
            if vi == vj {
                sum += ci * cj;
                i += 1;
                j += 1;
            } else if vi < vj {
                i += 1;
            } else {
                j += 1;
            }
        }
        sum
    }

    pub fn is_exact(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    /// 线性组合 `ca * a + cb * b` 的偏导项，标称值由调用者给出
    fn linear(a: &Uncertain, ca: f64, b: &Uncertain, cb: f64, nominal: f64) -> Self {
        let mut terms = Vec::with_capacity(a.terms.len() + b.terms.len());
        let (mut i, mut j) = (0, 0);
        while i < a.terms.len() || j < b.terms.len() {
            let next = match (a.terms.get(i), b.terms.get(j)) {
                (Some(&(va, xa)), Some(&(vb, xb))) if va == vb => {
                    i += 1;
                    j += 1;
                    (va, ca * xa + cb * xb)
                }
                (Some(&(va, xa)), Some(&(vb, _))) if va < vb => {
                    i += 1;
                    (va, ca * xa)
                }
                (Some(&(va, xa)), None) => {
                    i += 1;
                    (va, ca * xa)
                }
                (_, Some(&(vb, xb))) => {
                    j += 1;
                    (vb, cb * xb)
                }
                (None, None) => break,
            };
            if next.1 != 0.0 {
                terms.push(next);
            }
        }
        Self { nominal, terms }
    }

    /// 对标称值应用函数 f，偏导项乘以 f'(x)
    fn chain(&self, value: f64, derivative: f64) -> Self {
        let terms = if derivative == 0.0 || !derivative.is_finite() {
            Vec::new()
        } else {
            self.terms
                .iter()
                .map(|&(v, c)| (v, c * derivative))
                .collect()
        };
        Self {
            nominal: value,
            terms,
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 算术运算
// ─────────────────────────────────────────────────────────────

impl Add for Uncertain {
    type Output = Uncertain;

    fn add(self, rhs: Uncertain) -> Uncertain {
        Uncertain::linear(&self, 1.0, &rhs, 1.0, self.nominal + rhs.nominal)
    }
}

impl Sub for Uncertain {
    type Output = Uncertain;

    fn sub(self, rhs: Uncertain) -> Uncertain {
        Uncertain::linear(&self, 1.0, &rhs, -1.0, self.nominal - rhs.nominal)
    }
}

impl Mul for Uncertain {
    type Output = Uncertain;

    fn mul(self, rhs: Uncertain) -> Uncertain {
        Uncertain::linear(
            &self,
            rhs.nominal,
            &rhs,
            self.nominal,
            self.nominal * rhs.nominal,
        )
    }
}

impl Div for Uncertain {
    type Output = Uncertain;

    fn div(self, rhs: Uncertain) -> Uncertain {
        let b = rhs.nominal;
        Uncertain::linear(
            &self,
            1.0 / b,
            &rhs,
            -self.nominal / (b * b),
            self.nominal / b,
        )
    }
}

impl Neg for Uncertain {
    type Output = Uncertain;

    fn neg(self) -> Uncertain {
        self.chain(-self.nominal, -1.0)
    }
}

impl Add<f64> for Uncertain {
    type Output = Uncertain;

    fn add(mut self, rhs: f64) -> Uncertain {
        self.nominal += rhs;
        self
    }
}

impl Sub<f64> for Uncertain {
    type Output = Uncertain;

    fn sub(mut self, rhs: f64) -> Uncertain {
        self.nominal -= rhs;
        self
    }
}

impl Mul<f64> for Uncertain {
    type Output = Uncertain;

    fn mul(self, rhs: f64) -> Uncertain {
        self.chain(self.nominal * rhs, rhs)
    }
}

impl Div<f64> for Uncertain {
    type Output = Uncertain;

    fn div(self, rhs: f64) -> Uncertain {
        self.chain(self.nominal / rhs, 1.0 / rhs)
    }
}

impl From<f64> for Uncertain {
    fn from(value: f64) -> Self {
        Uncertain::exact(value)
    }
}

impl Scalar for Uncertain {
    fn constant(value: f64) -> Self {
        Uncertain::exact(value)
    }

    fn nominal(&self) -> f64 {
        self.nominal
    }

    fn sqrt(&self) -> Self {
        let value = self.nominal.sqrt();
        let derivative = if value > 0.0 { 0.5 / value } else { 0.0 };
        self.chain(value, derivative)
    }

    fn acos(&self) -> Self {
        let x = self.nominal.clamp(-1.0, 1.0);
        let denominator = (1.0 - x * x).sqrt();
        let derivative = if denominator > 0.0 {
            -1.0 / denominator
        } else {
            0.0
        };
        self.chain(x.acos(), derivative)
    }

    fn abs(&self) -> Self {
        if self.nominal < 0.0 {
            self.chain(-self.nominal, -1.0)
        } else {
            self.clone()
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 晶体学记法 1.234(5)
// ─────────────────────────────────────────────────────────────

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+))(?:\((\d+)\))?(?:[eE]([+-]?\d+))?$")
            .expect("static regex")
    })
}

/// 解析 `1.234(5)` 形式的数值，返回 (标称值, 标准不确定度)
///
/// `?` 与 `.` 表示未定义，返回 `Ok(None)`。
pub fn parse_cif_number(text: &str) -> Result<Option<(f64, f64)>> {
    let text = text.trim();
    if text == "?" || text == "." {
        return Ok(None);
    }

    let caps = number_regex()
        .captures(text)
        .ok_or_else(|| PicometerError::InvalidNumber(text.to_string()))?;

    let mantissa = &caps[1];
    let exponent: i32 = match caps.get(3) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| PicometerError::InvalidNumber(text.to_string()))?,
        None => 0,
    };
    let nominal: f64 = format!("{}e{}", mantissa, exponent)
        .parse()
        .map_err(|_| PicometerError::InvalidNumber(text.to_string()))?;

    let su = match caps.get(2) {
        Some(digits) => {
            let digits: f64 = digits
                .as_str()
                .parse()
                .map_err(|_| PicometerError::InvalidNumber(text.to_string()))?;
            let decimals = mantissa
                .split_once('.')
                .map(|(_, frac)| frac.len() as i32)
                .unwrap_or(0);
            digits * 10f64.powi(exponent - decimals)
        }
        None => 0.0,
    };

    Ok(Some((nominal, su)))
}

impl FromStr for Uncertain {
    type Err = PicometerError;

    fn from_str(s: &str) -> Result<Self> {
        match parse_cif_number(s)? {
            Some((nominal, su)) => Ok(Uncertain::new(nominal, su)),
            None => Err(PicometerError::InvalidNumber(s.to_string())),
        }
    }
}

impl fmt::Display for Uncertain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let su = self.std_dev();
        if su == 0.0 || !su.is_finite() {
            return write!(f, "{}", self.nominal);
        }

        // 不确定度以 1 位有效数字表示，首位为 1 时保留 2 位
        let magnitude = su.log10().floor() as i32;
        let leading = su / 10f64.powi(magnitude);
        let digits = if leading < 2.0 { 2 } else { 1 };
        let decimals = (digits - 1 - magnitude).max(0) as usize;
        let su_digits = (su * 10f64.powi(decimals as i32)).round() as u64;

        write!(f, "{:.*}({})", decimals, self.nominal, su_digits)
    }
}

/// 由标称值和协方差矩阵构造相关的不确定度数值
pub fn correlated_values(nominals: &[f64], covariance: &DMatrix<f64>) -> Result<Vec<Uncertain>> {
    let n = nominals.len();
    if covariance.nrows() != n || covariance.ncols() != n {
        return Err(PicometerError::CovarianceError(format!(
            "covariance matrix is {}x{} but {} values were given",
            covariance.nrows(),
            covariance.ncols(),
            n
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let symmetric = (covariance + covariance.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(symmetric);
    let scale = eigen
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));

    let mut values: Vec<Uncertain> = nominals.iter().map(|&v| Uncertain::exact(v)).collect();

    for (j, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda < -1e-10 * scale.max(f64::MIN_POSITIVE) {
            return Err(PicometerError::CovarianceError(format!(
                "matrix is not positive semi-definite (eigenvalue {:e})",
                lambda
            )));
        }
        let sd = lambda.max(0.0).sqrt();
        if sd == 0.0 {
            continue;
        }
        let variable = new_variable();
        for (i, value) in values.iter_mut().enumerate() {
            let coefficient = eigen.eigenvectors[(i, j)] * sd;
            if coefficient != 0.0 {
                value.terms.push((variable, coefficient));
            }
        }
    }

    Ok(values)
}
