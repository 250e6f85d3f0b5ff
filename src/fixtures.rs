//! # 测试数据
//!
//! 二茂铁样式的合成结构：Fe 位于原点，两个平行的正五元碳环
//! C1..C5（z = 0.188）与 C6..C10（z = -0.142），立方晶胞 a = 10 Å。
//!
//! 碳环中心为分数坐标 (0.1145, 0.156)，半径 1.2 Å，
//! 两环平面间距 3.30 Å。

use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const FERROCENE_CIF: &str = "\
data_ferrocene
_cell_length_a    10.000(1)
_cell_length_b    10.000(1)
_cell_length_c    10.000(1)
_cell_angle_alpha 90
_cell_angle_beta  90
_cell_angle_gamma 90
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_U_iso_or_equiv
Fe  0.0000     0.0000     0.0000     0.0200(2)
C1  0.2345(3)  0.1560(3)  0.1880(3)  0.0300(5)
C2  0.151582(3)  0.2701268(3)  0.1880(3)  0.0300(5)
C3  0.017418(3)  0.2265342(3)  0.1880(3)  0.0300(5)
C4  0.017418(3)  0.0854658(3)  0.1880(3)  0.0300(5)
C5  0.151582(3)  0.0418732(3)  0.1880(3)  0.0300(5)
C6  0.2345(3)  0.1560(3)  -0.1420(3)  0.0300(5)
C7  0.151582(3)  0.2701268(3)  -0.1420(3)  0.0300(5)
C8  0.017418(3)  0.2265342(3)  -0.1420(3)  0.0300(5)
C9  0.017418(3)  0.0854658(3)  -0.1420(3)  0.0300(5)
C10 0.151582(3)  0.0418732(3)  -0.1420(3)  0.0300(5)
loop_
_atom_site_aniso_label
_atom_site_aniso_U_11
_atom_site_aniso_U_22
_atom_site_aniso_U_33
_atom_site_aniso_U_12
_atom_site_aniso_U_13
_atom_site_aniso_U_23
Fe 0.0210(2) 0.0190(2) 0.0200(2) 0.0010(1) 0.0000(1) 0.0000(1)
";

/// 在目录中写出结构文件，返回其路径
pub(crate) fn write_ferrocene(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, FERROCENE_CIF).unwrap();
    path
}
