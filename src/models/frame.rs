//! # 坐标系（晶胞）
//!
//! 由晶胞参数构造分数坐标与笛卡尔坐标之间的变换。
//! a 沿 x 轴，b 位于 xy 平面内，c 由其余参数确定。
//!
//! ## 依赖关系
//! - 被 `models/atoms.rs`, `parsers/loader.rs` 使用
//! - 使用 `nalgebra` 的 `Matrix3`

use crate::error::{PicometerError, Result};
use crate::geometry::{transform, Point, Scalar};

use nalgebra::{Matrix3, Vector3};

/// 晶胞坐标系
///
/// `matrix` 的列向量依次为 a, b, c，即 `cart = matrix · fract`。
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateFrame {
    lengths: [f64; 3],
    angles: [f64; 3],
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
    reciprocal_lengths: [f64; 3],
}

impl CoordinateFrame {
    /// 从晶胞参数 (a, b, c, alpha, beta, gamma) 创建坐标系
    /// 角度单位：度
    pub fn from_parameters(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self> {
        if [a, b, c].iter().any(|&l| !(l > 0.0) || !l.is_finite()) {
            return Err(PicometerError::InvalidCell(format!(
                "cell lengths must be positive, got {} {} {}",
                a, b, c
            )));
        }
        if [alpha, beta, gamma]
            .iter()
            .any(|&g| !(g > 0.0 && g < 180.0))
        {
            return Err(PicometerError::InvalidCell(format!(
                "cell angles must lie strictly between 0 and 180 degrees, got {} {} {}",
                alpha, beta, gamma
            )));
        }

        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let cos_gamma = gamma.to_radians().cos();
        let sin_gamma = gamma.to_radians().sin();

        let c1 = c * cos_beta;
        let c2 = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let c3_squared = c * c - c1 * c1 - c2 * c2;
        if !(c3_squared > 0.0) {
            return Err(PicometerError::InvalidCell(format!(
                "angles {} {} {} do not describe a cell with positive volume",
                alpha, beta, gamma
            )));
        }

        let a_vec = Vector3::new(a, 0.0, 0.0);
        let b_vec = Vector3::new(b * cos_gamma, b * sin_gamma, 0.0);
        let c_vec = Vector3::new(c1, c2, c3_squared.sqrt());

        let matrix = Matrix3::from_columns(&[a_vec, b_vec, c_vec]);
        let inverse = matrix.try_inverse().ok_or_else(|| {
            PicometerError::InvalidCell("cell matrix is singular".to_string())
        })?;

        let volume = matrix.determinant();
        let reciprocal_lengths = [
            b_vec.cross(&c_vec).norm() / volume,
            c_vec.cross(&a_vec).norm() / volume,
            a_vec.cross(&b_vec).norm() / volume,
        ];

        Ok(CoordinateFrame {
            lengths: [a, b, c],
            angles: [alpha, beta, gamma],
            matrix,
            inverse,
            reciprocal_lengths,
        })
    }

    /// 获取晶胞参数 (a, b, c, alpha, beta, gamma)
    pub fn parameters(&self) -> (f64, f64, f64, f64, f64, f64) {
        let [a, b, c] = self.lengths;
        let [alpha, beta, gamma] = self.angles;
        (a, b, c, alpha, beta, gamma)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// 倒易晶胞长度 a*, b*, c*
    pub fn reciprocal_lengths(&self) -> [f64; 3] {
        self.reciprocal_lengths
    }

    /// 计算晶胞体积
    pub fn volume(&self) -> f64 {
        self.matrix.determinant()
    }

    /// 分数坐标 → 笛卡尔坐标
    pub fn orthogonalise(&self, fract: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * fract
    }

    /// 笛卡尔坐标 → 分数坐标
    pub fn fractionalise(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * cart
    }

    /// 带不确定度的分数坐标 → 笛卡尔坐标
    pub fn orthogonalise_point<T: Scalar>(&self, fract: &Point<T>) -> Point<T> {
        transform(&self.matrix, fract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_parameters_cubic() {
        let frame = CoordinateFrame::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 90.0).unwrap();
        let m = frame.matrix();

        assert!((m[(0, 0)] - 5.0).abs() < 1e-6);
        assert!((m[(1, 1)] - 5.0).abs() < 1e-6);
        assert!((m[(2, 2)] - 5.0).abs() < 1e-6);
        assert!(m[(0, 1)].abs() < 1e-6);
        assert!(m[(1, 2)].abs() < 1e-6);
        assert!((frame.volume() - 125.0).abs() < 1e-6);
        assert!((frame.reciprocal_lengths()[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_frame_hexagonal() {
        let frame = CoordinateFrame::from_parameters(3.0, 3.0, 5.0, 90.0, 90.0, 120.0).unwrap();
        let b = frame.orthogonalise(&Vector3::new(0.0, 1.0, 0.0));

        assert!((b.norm() - 3.0).abs() < 1e-9);
        assert!((b.x + 1.5).abs() < 1e-9);
        // a* = 1 / (a sin gamma)
        let expected = 1.0 / (3.0 * 120f64.to_radians().sin());
        assert!((frame.reciprocal_lengths()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_frame_round_trip() {
        let frame =
            CoordinateFrame::from_parameters(7.1, 8.3, 9.2, 81.0, 97.5, 104.0).unwrap();
        let fract = Vector3::new(0.12, -0.4, 1.3);
        let back = frame.fractionalise(&frame.orthogonalise(&fract));

        assert!((back - fract).norm() < 1e-12);
    }

    #[test]
    fn test_frame_rejects_invalid_cell() {
        assert!(CoordinateFrame::from_parameters(0.0, 5.0, 5.0, 90.0, 90.0, 90.0).is_err());
        assert!(CoordinateFrame::from_parameters(5.0, 5.0, 5.0, 90.0, 90.0, 180.0).is_err());
        assert!(CoordinateFrame::from_parameters(5.0, 5.0, 5.0, 10.0, 10.0, 120.0).is_err());
    }
}
