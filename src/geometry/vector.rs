//! # 泛型向量运算
//!
//! `Scalar` trait 抽象了 `f64` 与 `Uncertain` 两种数值，
//! 使点积、叉积、夹角、二面角等公式只需写一次。
//!
//! 点用 `[T; 3]` 表示；只需要标称值的方向判断直接使用 `nalgebra::Vector3<f64>`。
//!
//! ## 依赖关系
//! - 被 `geometry/shapes.rs`, `models/` 使用
//! - 使用 `nalgebra` 的矩阵类型

use nalgebra::{Matrix3, Vector3};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// 平行/垂直判断的容差
pub const DIRECTION_TOLERANCE: f64 = 1e-8;

/// 可参与几何计算的数值
pub trait Scalar:
    Clone
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Mul<f64, Output = Self>
{
    fn constant(value: f64) -> Self;
    fn nominal(&self) -> f64;
    fn sqrt(&self) -> Self;
    /// 反余弦；超出 [-1, 1] 的输入先截断
    fn acos(&self) -> Self;
    fn abs(&self) -> Self;
}

impl Scalar for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn nominal(&self) -> f64 {
        *self
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn acos(&self) -> Self {
        f64::acos(self.clamp(-1.0, 1.0))
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }
}

/// 三维点或向量
pub type Point<T> = [T; 3];

pub fn constant_point<T: Scalar>(v: &Vector3<f64>) -> Point<T> {
    [T::constant(v.x), T::constant(v.y), T::constant(v.z)]
}

pub fn nominal_point<T: Scalar>(p: &Point<T>) -> Vector3<f64> {
    Vector3::new(p[0].nominal(), p[1].nominal(), p[2].nominal())
}

pub fn add<T: Scalar>(a: &Point<T>, b: &Point<T>) -> Point<T> {
    [
        a[0].clone() + b[0].clone(),
        a[1].clone() + b[1].clone(),
        a[2].clone() + b[2].clone(),
    ]
}

pub fn sub<T: Scalar>(a: &Point<T>, b: &Point<T>) -> Point<T> {
    [
        a[0].clone() - b[0].clone(),
        a[1].clone() - b[1].clone(),
        a[2].clone() - b[2].clone(),
    ]
}

pub fn scale<T: Scalar>(a: &Point<T>, factor: f64) -> Point<T> {
    [
        a[0].clone() * factor,
        a[1].clone() * factor,
        a[2].clone() * factor,
    ]
}

pub fn dot<T: Scalar>(a: &Point<T>, b: &Point<T>) -> T {
    a[0].clone() * b[0].clone() + a[1].clone() * b[1].clone() + a[2].clone() * b[2].clone()
}

pub fn cross<T: Scalar>(a: &Point<T>, b: &Point<T>) -> Point<T> {
    [
        a[1].clone() * b[2].clone() - a[2].clone() * b[1].clone(),
        a[2].clone() * b[0].clone() - a[0].clone() * b[2].clone(),
        a[0].clone() * b[1].clone() - a[1].clone() * b[0].clone(),
    ]
}

pub fn norm<T: Scalar>(a: &Point<T>) -> T {
    dot(a, a).sqrt()
}

/// 矩阵乘以向量 `m · v`
pub fn transform<T: Scalar>(m: &Matrix3<f64>, v: &Point<T>) -> Point<T> {
    let row = |i: usize| {
        v[0].clone() * m[(i, 0)] + v[1].clone() * m[(i, 1)] + v[2].clone() * m[(i, 2)]
    };
    [row(0), row(1), row(2)]
}

/// 合同变换 `m · t · mᵀ`，用于二阶张量
pub fn congruence<T: Scalar>(m: &Matrix3<f64>, t: &[[T; 3]; 3]) -> [[T; 3]; 3] {
    let element = |i: usize, j: usize| {
        let mut sum = T::constant(0.0);
        for k in 0..3 {
            for l in 0..3 {
                let factor = m[(i, k)] * m[(j, l)];
                if factor != 0.0 {
                    sum = sum + t[k][l].clone() * factor;
                }
            }
        }
        sum
    };
    [
        [element(0, 0), element(0, 1), element(0, 2)],
        [element(1, 0), element(1, 1), element(1, 2)],
        [element(2, 0), element(2, 1), element(2, 2)],
    ]
}

/// 两向量夹角（度），范围 [0, 180]
pub fn degrees_between<T: Scalar>(v: &Point<T>, w: &Point<T>) -> T {
    let cosine = dot(v, w) / (norm(v) * norm(w));
    cosine.acos() * (180.0 / std::f64::consts::PI)
}

/// 三点 x0-x1-x2 在 x1 处的夹角（度）
pub fn interior_angle<T: Scalar>(x0: &Point<T>, x1: &Point<T>, x2: &Point<T>) -> T {
    degrees_between(&sub(x0, x1), &sub(x2, x1))
}

/// 四点 x0-x1-x2-x3 的有符号二面角（度），范围 [-180, 180]
///
/// 两个法向量分别取自三元组 (x0, x1, x2) 与 (x1, x2, x3)；
/// 共面且呈凸多边形顺序的四点给出 0°，符号随镜像翻转。
/// 即常用定义：b1 = x1 - x0, b2 = x2 - x1, b3 = x3 - x2，取 b1×b2 与 b2×b3 的夹角，
/// 符号为 (b1×b2)×(b2×b3)·b2 的符号。
pub fn dihedral_angle<T: Scalar>(
    x0: &Point<T>,
    x1: &Point<T>,
    x2: &Point<T>,
    x3: &Point<T>,
) -> T {
    let axis = sub(x2, x1);
    let n1 = cross(&sub(x0, x1), &axis);
    let n2 = cross(&sub(x1, x2), &sub(x3, x2));
    let magnitude = degrees_between(&n1, &n2);
    let twist = cross(&n1, &n2);
    if dot(&twist, &axis).nominal() > 0.0 {
        magnitude
    } else {
        -magnitude
    }
}

pub fn are_parallel(v: &Vector3<f64>, w: &Vector3<f64>) -> bool {
    1.0 - v.normalize().dot(&w.normalize()).abs() <= DIRECTION_TOLERANCE
}

pub fn are_perpendicular(v: &Vector3<f64>, w: &Vector3<f64>) -> bool {
    v.normalize().dot(&w.normalize()).abs() <= DIRECTION_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Uncertain;

    #[test]
    fn test_interior_angle() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 0.0, 0.0];
        let c = [0.0, 2.0, 0.0];
        assert!((interior_angle(&a, &b, &c) - 90.0).abs() < 1e-10);

        let d = [-1.0, 1.0, 0.0];
        assert!((interior_angle(&a, &b, &d) - 135.0).abs() < 1e-10);
    }

    #[test]
    fn test_dihedral_cis_and_trans() {
        let x0 = [0.0, 1.0, 0.0];
        let x1 = [0.0, 0.0, 0.0];
        let x2 = [1.0, 0.0, 0.0];
        let cis = [1.0, 1.0, 0.0];
        let trans = [1.0, -1.0, 0.0];

        assert!(dihedral_angle(&x0, &x1, &x2, &cis).abs() < 1e-10);
        assert!((dihedral_angle(&x0, &x1, &x2, &trans).abs() - 180.0).abs() < 1e-10);
    }

    #[test]
    fn test_dihedral_sign_flips_under_mirror() {
        let x0 = [0.0, 1.0, 0.0];
        let x1 = [0.0, 0.0, 0.0];
        let x2 = [1.0, 0.0, 0.0];
        let up = [1.0, 0.0, 1.0];
        let down = [1.0, 0.0, -1.0];

        let a = dihedral_angle(&x0, &x1, &x2, &up);
        let b = dihedral_angle(&x0, &x1, &x2, &down);
        assert!((a.abs() - 90.0).abs() < 1e-10);
        assert!((a + b).abs() < 1e-10);
    }

    #[test]
    fn test_parallel_and_perpendicular() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        assert!(are_parallel(&x, &Vector3::new(-3.0, 0.0, 0.0)));
        assert!(!are_parallel(&x, &Vector3::new(1.0, 0.1, 0.0)));
        assert!(are_perpendicular(&x, &Vector3::new(0.0, 0.0, 2.0)));
        assert!(!are_perpendicular(&x, &Vector3::new(0.1, 1.0, 0.0)));
    }

    #[test]
    fn test_uncertain_distance_propagation() {
        let a = [
            Uncertain::new(0.0, 0.1),
            Uncertain::exact(0.0),
            Uncertain::exact(0.0),
        ];
        let b = [
            Uncertain::new(3.0, 0.1),
            Uncertain::exact(0.0),
            Uncertain::exact(0.0),
        ];
        let d = norm(&sub(&b, &a));
        assert!((d.nominal() - 3.0).abs() < 1e-12);
        assert!((d.std_dev() - 0.02_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_congruence_identity() {
        let t = [[1.0, 0.5, 0.0], [0.5, 2.0, 0.1], [0.0, 0.1, 3.0]];
        let r = congruence(&Matrix3::identity(), &t);
        assert_eq!(r, t);
    }
}
