//! # 几何形状与度量
//!
//! 三种形状：原子集合（点）、直线（轴向）、平面。
//! 直线和平面由单位方向向量与原点描述；平面的方向即法向量。
//!
//! 距离、夹角、二面角在这些形状之间定义。涉及原子坐标的结果保留不确定度，
//! 显式直线/平面之间的结果为精确值。
//!
//! ## 依赖关系
//! - 被 `models/atoms.rs`, `processor/` 使用
//! - 使用 `nalgebra` 的 SVD 做最小二乘拟合

use crate::error::{PicometerError, Result};
use crate::geometry::vector::{
    are_parallel, are_perpendicular, constant_point, cross, degrees_between, dihedral_angle,
    dot, interior_angle, nominal_point, norm, sub, Point, Scalar,
};
use crate::models::Uncertain;

use nalgebra::{DMatrix, Vector3};

/// 形状类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Spatial,
    Axial,
    Planar,
}

/// 显式的直线或平面
#[derive(Debug, Clone, PartialEq)]
pub struct Explicit {
    kind: ShapeKind,
    direction: Vector3<f64>,
    origin: Vector3<f64>,
}

impl Explicit {
    fn new(kind: ShapeKind, direction: Vector3<f64>, origin: Vector3<f64>) -> Result<Self> {
        let length = direction.norm();
        if !(length > 0.0) || !length.is_finite() {
            return Err(PicometerError::DegenerateGeometry(format!(
                "{:?} direction must be a non-zero vector",
                kind
            )));
        }
        Ok(Explicit {
            kind,
            direction: direction / length,
            origin,
        })
    }

    /// 直线：方向为轴向
    pub fn line(direction: Vector3<f64>, origin: Vector3<f64>) -> Result<Self> {
        Self::new(ShapeKind::Axial, direction, origin)
    }

    /// 平面：方向为法向
    pub fn plane(normal: Vector3<f64>, origin: Vector3<f64>) -> Result<Self> {
        Self::new(ShapeKind::Planar, normal, origin)
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }

    pub fn origin(&self) -> &Vector3<f64> {
        &self.origin
    }

    /// 同方向、原点移到 `origin` 的副本
    pub fn at(&self, origin: Vector3<f64>) -> Self {
        Explicit {
            kind: self.kind,
            direction: self.direction,
            origin,
        }
    }

    /// 两个显式形状之间的距离
    ///
    /// 非平行（或直线与平面不平行）时二者相交，距离为 0。
    pub fn distance(&self, other: &Explicit) -> f64 {
        let delta = other.origin - self.origin;
        match (self.kind, other.kind) {
            (ShapeKind::Axial, ShapeKind::Axial) => {
                if are_parallel(&self.direction, &other.direction) {
                    delta.cross(&self.direction).norm()
                } else {
                    let normal = self.direction.cross(&other.direction);
                    delta.dot(&normal).abs() / normal.norm()
                }
            }
            (ShapeKind::Planar, ShapeKind::Planar) => {
                if are_parallel(&self.direction, &other.direction) {
                    self.direction.dot(&delta).abs()
                } else {
                    0.0
                }
            }
            _ => {
                let (line, plane) = if self.kind == ShapeKind::Axial {
                    (self, other)
                } else {
                    (other, self)
                };
                if are_perpendicular(&line.direction, &plane.direction) {
                    plane.direction.dot(&(line.origin - plane.origin)).abs()
                } else {
                    0.0
                }
            }
        }
    }

    /// 两个显式形状之间的夹角（度），折叠到 [0, 90]
    ///
    /// 同类形状取方向夹角；直线与平面取直线与平面本身的夹角，即 90° 减去与法向的夹角。
    pub fn angle(&self, other: &Explicit) -> f64 {
        let theta = degrees_between(
            &[self.direction.x, self.direction.y, self.direction.z],
            &[other.direction.x, other.direction.y, other.direction.z],
        );
        let folded = theta.min(180.0 - theta);
        if self.kind == other.kind {
            folded
        } else {
            90.0 - folded
        }
    }

    /// 点到形状的垂直距离
    fn offset<T: Scalar>(&self, point: &Point<T>) -> T {
        let relative = sub(point, &constant_point(&self.origin));
        let direction = constant_point(&self.direction);
        match self.kind {
            ShapeKind::Axial => norm(&cross(&relative, &direction)),
            _ => dot(&relative, &direction).abs(),
        }
    }
}

/// 参与度量的形状
#[derive(Debug, Clone)]
pub enum Shape {
    /// 笛卡尔坐标点集（原子或质心）
    Nodes(Vec<Point<Uncertain>>),
    Explicit(Explicit),
}

impl Shape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Nodes(_) => ShapeKind::Spatial,
            Shape::Explicit(e) => e.kind(),
        }
    }

    /// 两个形状之间的距离
    pub fn distance(&self, other: &Shape) -> Result<Uncertain> {
        match (self, other) {
            (Shape::Nodes(a), Shape::Nodes(b)) => nodes_distance(a, b),
            (Shape::Nodes(points), Shape::Explicit(e))
            | (Shape::Explicit(e), Shape::Nodes(points)) => {
                if points.is_empty() {
                    return Err(empty_operand("distance"));
                }
                let nominal_offset = |p: &Point<Uncertain>| {
                    let n = nominal_point(p);
                    e.offset(&[n.x, n.y, n.z])
                };
                let nearest = points
                    .iter()
                    .min_by(|p, q| nominal_offset(p).total_cmp(&nominal_offset(q)))
                    .ok_or_else(|| empty_operand("distance"))?;
                Ok(e.offset(nearest))
            }
            (Shape::Explicit(a), Shape::Explicit(b)) => Ok(Uncertain::exact(a.distance(b))),
        }
    }

    /// 若干形状之间的夹角（度）
    ///
    /// 全部为点集时合并为恰好 3 个点，取中间点处的夹角；
    /// 否则必须恰好是两个显式形状。
    pub fn angle(shapes: &[Shape]) -> Result<Uncertain> {
        if let Some(points) = combined_nodes(shapes) {
            return match points.as_slice() {
                [x0, x1, x2] => Ok(interior_angle(x0, x1, x2)),
                _ => Err(PicometerError::UnsupportedOperands {
                    operation: "angle".to_string(),
                    reason: format!("needs exactly 3 atoms, got {}", points.len()),
                }),
            };
        }
        match shapes {
            [Shape::Explicit(a), Shape::Explicit(b)] => Ok(Uncertain::exact(a.angle(b))),
            _ => Err(PicometerError::UnsupportedOperands {
                operation: "angle".to_string(),
                reason: format!(
                    "expected atoms only, or exactly two lines/planes, got {}",
                    kinds(shapes)
                ),
            }),
        }
    }

    /// 四个点之间的有符号二面角（度）
    pub fn dihedral(shapes: &[Shape]) -> Result<Uncertain> {
        match combined_nodes(shapes).as_deref() {
            Some([x0, x1, x2, x3]) => Ok(dihedral_angle(x0, x1, x2, x3)),
            Some(points) => Err(PicometerError::UnsupportedOperands {
                operation: "dihedral".to_string(),
                reason: format!("needs exactly 4 atoms, got {}", points.len()),
            }),
            None => Err(PicometerError::UnsupportedOperands {
                operation: "dihedral".to_string(),
                reason: format!("only defined between atoms, got {}", kinds(shapes)),
            }),
        }
    }
}

fn empty_operand(operation: &str) -> PicometerError {
    PicometerError::UnsupportedOperands {
        operation: operation.to_string(),
        reason: "an operand contains no atoms".to_string(),
    }
}

fn kinds(shapes: &[Shape]) -> String {
    let kinds: Vec<String> = shapes.iter().map(|s| format!("{:?}", s.kind())).collect();
    format!("[{}]", kinds.join(", "))
}

/// 所有形状均为点集时返回合并后的点
fn combined_nodes(shapes: &[Shape]) -> Option<Vec<Point<Uncertain>>> {
    let mut points = Vec::new();
    for shape in shapes {
        match shape {
            Shape::Nodes(p) => points.extend(p.iter().cloned()),
            Shape::Explicit(_) => return None,
        }
    }
    Some(points)
}

/// 两个点集之间的最短距离；按标称值选出最近的一对后计算不确定度
fn nodes_distance(a: &[Point<Uncertain>], b: &[Point<Uncertain>]) -> Result<Uncertain> {
    let mut best: Option<(f64, usize, usize)> = None;
    for (i, p) in a.iter().enumerate() {
        let p_nominal = nominal_point(p);
        for (j, q) in b.iter().enumerate() {
            let d = (nominal_point(q) - p_nominal).norm();
            if best.map_or(true, |(current, _, _)| d < current) {
                best = Some((d, i, j));
            }
        }
    }
    let (_, i, j) = best.ok_or_else(|| empty_operand("distance"))?;
    Ok(norm(&sub(&b[j], &a[i])))
}

// ─────────────────────────────────────────────────────────────
// 最小二乘拟合
// ─────────────────────────────────────────────────────────────

/// 中心化后的坐标矩阵的 SVD；返回 (质心, 奇异值, 右奇异向量)
fn centered_svd(points: &[Vector3<f64>]) -> Result<(Vector3<f64>, Vec<f64>, Vec<Vector3<f64>>)> {
    let centroid = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
    let rows = points.len().max(3);
    let mut matrix = DMatrix::<f64>::zeros(rows, 3);
    for (i, p) in points.iter().enumerate() {
        let centered = p - centroid;
        for k in 0..3 {
            matrix[(i, k)] = centered[k];
        }
    }

    let svd = matrix.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        PicometerError::DegenerateGeometry("singular value decomposition failed".to_string())
    })?;
    let values = svd.singular_values.iter().copied().collect();
    let vectors = (0..3)
        .map(|i| Vector3::new(v_t[(i, 0)], v_t[(i, 1)], v_t[(i, 2)]))
        .collect();
    Ok((centroid, values, vectors))
}

fn index_by<F: Fn(f64, f64) -> bool>(values: &[f64], better: F) -> usize {
    let mut index = 0;
    for (i, &v) in values.iter().enumerate() {
        if better(v, values[index]) {
            index = i;
        }
    }
    index
}

/// 拟合直线：方向为最大奇异值对应的右奇异向量，原点为质心
pub fn fit_line(points: &[Vector3<f64>]) -> Result<Explicit> {
    if points.len() < 2 {
        return Err(PicometerError::DegenerateGeometry(format!(
            "a line needs at least 2 atoms, got {}",
            points.len()
        )));
    }
    let (centroid, values, vectors) = centered_svd(points)?;
    let best = index_by(&values, |a, b| a > b);
    if values[best] < 1e-12 {
        return Err(PicometerError::DegenerateGeometry(
            "all atoms of the line coincide".to_string(),
        ));
    }
    Explicit::line(vectors[best], centroid)
}

/// 拟合平面：法向为最小奇异值对应的右奇异向量，原点为质心
pub fn fit_plane(points: &[Vector3<f64>]) -> Result<Explicit> {
    if points.len() < 3 {
        return Err(PicometerError::DegenerateGeometry(format!(
            "a plane needs at least 3 atoms, got {}",
            points.len()
        )));
    }
    let (centroid, values, vectors) = centered_svd(points)?;
    let worst = index_by(&values, |a, b| a < b);
    let mut sorted = values.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted[1] < 1e-12 {
        return Err(PicometerError::DegenerateGeometry(
            "atoms of the plane are collinear".to_string(),
        ));
    }
    Explicit::plane(vectors[worst], centroid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB_DEGREES: f64 = 106.60154959902023;

    fn v_a() -> Vector3<f64> {
        Vector3::new(1.0, 2.0, 3.0)
    }

    // 与 v_a 成 106.6°
    fn v_b() -> Vector3<f64> {
        Vector3::new(1.0, 2.0, -3.0)
    }

    // 与 v_a 垂直
    fn v_c() -> Vector3<f64> {
        Vector3::new(0.0, -3.0, 2.0)
    }

    // 与 v_a 反平行
    fn v_d() -> Vector3<f64> {
        Vector3::new(-1.0, -2.0, -3.0)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_line_line_metrics() {
        let zero = Vector3::zeros();
        let line_a = Explicit::line(v_a(), v_b()).unwrap();
        let line_b = Explicit::line(v_b(), zero).unwrap();
        let line_c = Explicit::line(v_c(), zero).unwrap();
        let line_d = Explicit::line(v_d(), zero).unwrap();

        assert!(close(line_a.distance(&line_b), 0.0));
        assert!(close(line_a.distance(&line_c), 1.3342487699899823));
        assert!(close(line_a.distance(&line_d), 3.5856858280031814));
        assert!(close(line_a.angle(&line_b), 180.0 - AB_DEGREES));
        assert!(close(line_a.angle(&line_c), 90.0));
        assert!(close(line_a.angle(&line_d), 0.0));
    }

    #[test]
    fn test_line_plane_metrics() {
        let zero = Vector3::zeros();
        let line_a = Explicit::line(v_a(), v_b()).unwrap();
        let plane_b = Explicit::plane(v_b(), zero).unwrap();
        let plane_c = Explicit::plane(v_c(), zero).unwrap();
        let plane_d = Explicit::plane(v_d(), zero).unwrap();

        assert!(close(line_a.distance(&plane_b), 0.0));
        assert!(close(line_a.distance(&plane_c), 3.328201177351375));
        assert!(close(plane_c.distance(&line_a), 3.328201177351375));
        assert!(close(line_a.distance(&plane_d), 0.0));
        assert!(close(line_a.angle(&plane_b), AB_DEGREES - 90.0));
        assert!(close(line_a.angle(&plane_c), 0.0));
        assert!(close(line_a.angle(&plane_d), 90.0));

        // 直线与平面的夹角和直线与法线的夹角互余
        let normal_line = Explicit::line(v_b(), zero).unwrap();
        assert!(close(
            line_a.angle(&plane_b) + line_a.angle(&normal_line),
            90.0
        ));
    }

    #[test]
    fn test_plane_plane_metrics() {
        let zero = Vector3::zeros();
        let plane_a = Explicit::plane(v_a(), v_b()).unwrap();
        let plane_b = Explicit::plane(v_b(), zero).unwrap();
        let plane_c = Explicit::plane(v_c(), zero).unwrap();
        let plane_d = Explicit::plane(v_d(), zero).unwrap();

        assert!(close(plane_a.distance(&plane_b), 0.0));
        assert!(close(plane_a.distance(&plane_c), 0.0));
        assert!(close(plane_a.distance(&plane_d), 1.0690449676496976));
        assert!(close(plane_a.angle(&plane_b), 180.0 - AB_DEGREES));
        assert!(close(plane_a.angle(&plane_c), 90.0));
        assert!(close(plane_a.angle(&plane_d), 0.0));
    }

    #[test]
    fn test_line_plane_at() {
        let line = Explicit::line(v_a(), v_b()).unwrap();
        let plane = Explicit::plane(v_c(), v_d()).unwrap();
        assert!(close(line.distance(&plane), 3.328201177351375));

        let line = line.at(-v_c());
        assert!(close(line.distance(&plane), 3.6055512754639896));
        assert_eq!(line.direction(), Explicit::line(v_a(), v_b()).unwrap().direction());

        let line = line.at(Vector3::zeros());
        assert!(close(line.distance(&plane), 0.0));

        let plane = plane.at(v_c());
        assert!(close(line.distance(&plane), 3.6055512754639896));
    }

    #[test]
    fn test_zero_direction_is_rejected() {
        assert!(Explicit::line(Vector3::zeros(), v_a()).is_err());
    }

    #[test]
    fn test_fit_plane_and_line() {
        let square = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(0.0, 1.0, 1.0),
        ];
        let plane = fit_plane(&square).unwrap();
        assert!(are_parallel(plane.direction(), &Vector3::z()));
        assert!((plane.origin() - Vector3::new(0.5, 0.5, 1.0)).norm() < 1e-12);

        let rod = vec![Vector3::zeros(), Vector3::new(2.0, 2.0, 0.0)];
        let line = fit_line(&rod).unwrap();
        assert!(are_parallel(line.direction(), &Vector3::new(1.0, 1.0, 0.0)));

        assert!(fit_plane(&rod).is_err());
        assert!(fit_line(&rod[..1]).is_err());
    }

    fn node(x: f64, y: f64, z: f64) -> Point<Uncertain> {
        [Uncertain::exact(x), Uncertain::exact(y), Uncertain::exact(z)]
    }

    #[test]
    fn test_nodes_metrics() {
        let a = Shape::Nodes(vec![node(0.0, 0.0, 0.0), node(5.0, 0.0, 0.0)]);
        let b = Shape::Nodes(vec![node(1.0, 0.0, 0.0)]);
        assert!(close(a.distance(&b).unwrap().nominal(), 1.0));

        let plane = Shape::Explicit(Explicit::plane(Vector3::x(), Vector3::new(3.0, 0.0, 0.0)).unwrap());
        assert!(close(a.distance(&plane).unwrap().nominal(), 2.0));

        let apex = Shape::Nodes(vec![node(0.0, 0.0, 0.0)]);
        let c = Shape::Nodes(vec![node(0.0, 1.0, 0.0)]);
        let angle = Shape::angle(&[b.clone(), apex, c]).unwrap();
        assert!(close(angle.nominal(), 90.0));
    }

    #[test]
    fn test_angle_combines_node_sets() {
        let a = Shape::Nodes(vec![node(1.0, 0.0, 0.0), node(0.0, 0.0, 0.0)]);
        let b = Shape::Nodes(vec![node(0.0, 1.0, 0.0)]);
        let angle = Shape::angle(&[a, b]).unwrap();
        assert!(close(angle.nominal(), 90.0));
    }

    #[test]
    fn test_unsupported_operands() {
        let a = Shape::Nodes(vec![node(0.0, 0.0, 0.0), node(5.0, 0.0, 0.0)]);
        let b = Shape::Nodes(vec![node(1.0, 0.0, 0.0)]);
        let plane = Shape::Explicit(Explicit::plane(Vector3::x(), Vector3::zeros()).unwrap());

        assert!(Shape::angle(&[a.clone()]).is_err());
        assert!(Shape::angle(&[a.clone(), b.clone(), b.clone()]).is_err());
        assert!(Shape::angle(&[a.clone(), plane.clone()]).is_err());
        assert!(Shape::dihedral(&[a.clone(), b.clone()]).is_err());
        assert!(Shape::dihedral(&[a, plane.clone()]).is_err());
        assert!(Shape::Nodes(Vec::new()).distance(&b).is_err());

        let err = Shape::angle(&[b, plane]).unwrap_err();
        assert!(err.to_string().contains("[Spatial, Planar]"));
    }
}
