//! # 几何模块
//!
//! 与晶体无关的纯几何计算：泛型向量运算、直线/平面形状、最小二乘拟合。
//!
//! ## 依赖关系
//! - 被 `models/`, `processor/` 使用
//! - 子模块: vector, shapes

pub mod shapes;
pub mod vector;

pub use shapes::{fit_line, fit_plane, Explicit, Shape};
pub use vector::{
    add, are_perpendicular, congruence, constant_point, nominal_point, scale, transform, Point,
    Scalar,
};
