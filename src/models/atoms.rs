//! # 原子表
//!
//! `AtomSet` 是共享同一坐标系的有序原子表。标签不要求唯一，
//! 对称扩展后同一标签可以出现多次。
//!
//! 所有操作（选择、对称变换、平移、拼接）都返回新的 `AtomSet`，坐标系不会被修改。
//!
//! ## 依赖关系
//! - 被 `locator/`, `models/state.rs`, `parsers/loader.rs` 使用
//! - 使用 `models/frame.rs`, `models/symmetry.rs`, `geometry/`

use crate::error::{PicometerError, Result};
use crate::geometry::{
    add, congruence, constant_point, fit_line, fit_plane, nominal_point, scale, Explicit, Point,
};
use crate::models::{CoordinateFrame, SymmetryOperation, Uncertain};

use nalgebra::{Matrix3, Vector3};
use regex::Regex;
use std::ops::Add;
use std::sync::Arc;

/// 各向异性位移参数的分量顺序
pub const U_COMPONENTS: [&str; 6] = ["U_11", "U_22", "U_33", "U_12", "U_13", "U_23"];

/// 单个原子
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub label: String,

    /// 分数坐标
    pub fract: Point<Uncertain>,

    /// 各向同性位移参数
    pub u_iso: Option<Uncertain>,

    /// 各向异性位移参数，顺序见 `U_COMPONENTS`
    pub u_aniso: Option<[Uncertain; 6]>,
}

impl Atom {
    pub fn new(label: impl Into<String>, fract: [f64; 3]) -> Self {
        Atom {
            label: label.into(),
            fract: fract.map(Uncertain::exact),
            u_iso: None,
            u_aniso: None,
        }
    }

    pub fn with_fract(label: impl Into<String>, fract: Point<Uncertain>) -> Self {
        Atom {
            label: label.into(),
            fract,
            u_iso: None,
            u_aniso: None,
        }
    }

    pub fn with_u_aniso(mut self, u_aniso: [Uncertain; 6]) -> Self {
        self.u_aniso = Some(u_aniso);
        self
    }

    pub fn fract_nominal(&self) -> Vector3<f64> {
        nominal_point(&self.fract)
    }
}

/// 共享同一坐标系的原子表
#[derive(Debug, Clone, Default)]
pub struct AtomSet {
    frame: Option<Arc<CoordinateFrame>>,
    atoms: Vec<Atom>,
}

impl AtomSet {
    pub fn new(frame: Arc<CoordinateFrame>, atoms: Vec<Atom>) -> Self {
        AtomSet {
            frame: Some(frame),
            atoms,
        }
    }

    /// 空的、无坐标系的原子表，是拼接运算的单位元
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&Arc<CoordinateFrame>> {
        self.frame.as_ref()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|a| a.label.as_str())
    }

    /// 同一坐标系下的新原子表
    fn with_atoms(&self, atoms: Vec<Atom>) -> AtomSet {
        AtomSet {
            frame: self.frame.clone(),
            atoms,
        }
    }

    /// 行拼接；与空表拼接保持不变
    pub fn concat(mut self, other: AtomSet) -> AtomSet {
        if self.frame.is_none() {
            return if self.atoms.is_empty() {
                other
            } else {
                self
            };
        }
        if other.is_empty() {
            return self;
        }
        if let (Some(a), Some(b)) = (&self.frame, &other.frame) {
            if !Arc::ptr_eq(a, b) && a != b {
                log::debug!("Concatenating atoms from differing coordinate frames");
            }
        }
        self.atoms.extend(other.atoms);
        self
    }

    /// 按标签选择原子
    ///
    /// 先做精确匹配；没有精确匹配时把 `pattern` 当作完整匹配的正则表达式。
    pub fn select(&self, pattern: &str) -> Result<AtomSet> {
        let exact: Vec<Atom> = self
            .atoms
            .iter()
            .filter(|a| a.label == pattern)
            .cloned()
            .collect();
        if !exact.is_empty() {
            return Ok(self.with_atoms(exact));
        }

        let regex =
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| PicometerError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        let matched = self
            .atoms
            .iter()
            .filter(|a| regex.is_match(&a.label))
            .cloned()
            .collect();
        Ok(self.with_atoms(matched))
    }

    /// 应用对称操作
    ///
    /// 位置按 `R·x + t` 变换；存在各向异性参数时张量按 R 旋转，
    /// 没有张量的原子只变换位置。
    pub fn transform(&self, operation: &SymmetryOperation) -> AtomSet {
        if operation.is_identity() {
            return self.clone();
        }
        let tensor_map = self.frame.as_ref().map(|frame| tensor_rotation(frame, operation));

        let atoms = self
            .atoms
            .iter()
            .map(|atom| {
                let u_aniso = match (&atom.u_aniso, &tensor_map) {
                    (Some(u), Some(m)) => Some(rotate_tensor(u, m)),
                    (u, _) => u.clone(),
                };
                Atom {
                    label: atom.label.clone(),
                    fract: operation.apply(&atom.fract),
                    u_iso: atom.u_iso.clone(),
                    u_aniso,
                }
            })
            .collect();
        self.with_atoms(atoms)
    }

    /// 按分数坐标平移
    pub fn translated(&self, delta: &Vector3<f64>) -> AtomSet {
        let shift = constant_point(delta);
        let atoms = self
            .atoms
            .iter()
            .map(|atom| Atom {
                fract: add(&atom.fract, &shift),
                ..atom.clone()
            })
            .collect();
        self.with_atoms(atoms)
    }

    /// 刚性平移使质心落在笛卡尔坐标 `origin` 上
    pub fn recentered(&self, origin: &Vector3<f64>) -> AtomSet {
        match (&self.frame, self.centroid()) {
            (Some(frame), Some(centroid)) => {
                let delta = frame.fractionalise(&(origin - centroid));
                self.translated(&delta)
            }
            _ => self.clone(),
        }
    }

    /// 笛卡尔坐标（标称值）
    pub fn cart_xyz(&self) -> Vec<Vector3<f64>> {
        match &self.frame {
            Some(frame) => self
                .atoms
                .iter()
                .map(|a| frame.orthogonalise(&a.fract_nominal()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// 带不确定度的笛卡尔坐标
    pub fn cart_points(&self) -> Vec<Point<Uncertain>> {
        match &self.frame {
            Some(frame) => self
                .atoms
                .iter()
                .map(|a| frame.orthogonalise_point(&a.fract))
                .collect(),
            None => Vec::new(),
        }
    }

    /// 笛卡尔质心（标称值）
    pub fn centroid(&self) -> Option<Vector3<f64>> {
        let cart = self.cart_xyz();
        if cart.is_empty() {
            return None;
        }
        Some(cart.iter().sum::<Vector3<f64>>() / cart.len() as f64)
    }

    /// 带不确定度的分数坐标质心
    pub fn fract_centroid(&self) -> Option<Point<Uncertain>> {
        let first = self.atoms.first()?;
        let sum = self.atoms[1..]
            .iter()
            .fold(first.fract.clone(), |acc, a| add(&acc, &a.fract));
        Some(scale(&sum, 1.0 / self.atoms.len() as f64))
    }

    /// 最小二乘拟合直线
    pub fn line(&self) -> Result<Explicit> {
        fit_line(&self.cart_xyz())
    }

    /// 最小二乘拟合平面
    pub fn plane(&self) -> Result<Explicit> {
        fit_plane(&self.cart_xyz())
    }
}

impl Add for AtomSet {
    type Output = AtomSet;

    fn add(self, rhs: AtomSet) -> AtomSet {
        self.concat(rhs)
    }
}

/// 张量变换矩阵 `N⁻¹ R N`，N = diag(a*, b*, c*)
///
/// U 分量按倒易轴约定存储，旋转前先换到分数坐标基再换回。
fn tensor_rotation(frame: &CoordinateFrame, operation: &SymmetryOperation) -> Matrix3<f64> {
    let r = frame.reciprocal_lengths();
    let n = Matrix3::from_diagonal(&Vector3::new(r[0], r[1], r[2]));
    let n_inv = Matrix3::from_diagonal(&Vector3::new(1.0 / r[0], 1.0 / r[1], 1.0 / r[2]));
    n_inv * operation.rotation() * n
}

fn rotate_tensor(u: &[Uncertain; 6], m: &Matrix3<f64>) -> [Uncertain; 6] {
    let [u11, u22, u33, u12, u13, u23] = u.clone();
    let full = [
        [u11, u12.clone(), u13.clone()],
        [u12, u22, u23.clone()],
        [u13, u23, u33],
    ];
    let r = congruence(m, &full);
    [
        r[0][0].clone(),
        r[1][1].clone(),
        r[2][2].clone(),
        r[0][1].clone(),
        r[0][2].clone(),
        r[1][2].clone(),
    ]
}
