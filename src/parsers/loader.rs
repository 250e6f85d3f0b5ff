//! # 结构加载
//!
//! 把 CIF 数据块转换为 `AtomSet`：晶胞参数构造坐标系，
//! `_atom_site_*` 与 `_atom_site_aniso_*` 表构造原子。
//!
//! 默认只保留标称值；`propagate_uncertainty` 打开时附带文件中的标准不确定度。
//! 提供协方差矩阵时，矩阵中列出的参数改为相关的不确定度数值。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `parsers/cif.rs`, `parsers/covariance.rs`, `models/`

use crate::error::{PicometerError, Result};
use crate::models::{
    correlated_values, parse_cif_number, Atom, AtomSet, CoordinateFrame, Uncertain, U_COMPONENTS,
};
use crate::parsers::cif::{parse_cif_file, CifBlock};
use crate::parsers::covariance::{read_olex2_covariance, CovarianceMatrix};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

struct BlockReader<'a> {
    block: &'a CifBlock,
    source: &'a str,
    propagate: bool,
}

impl<'a> BlockReader<'a> {
    fn error(&self, reason: String) -> PicometerError {
        PicometerError::ParseError {
            format: "CIF".to_string(),
            path: format!("{}:{}", self.source, self.block.name),
            reason,
        }
    }

    /// 必需的单值数字
    fn number(&self, tag: &str) -> Result<f64> {
        let text = self
            .block
            .value(tag)
            .ok_or_else(|| self.error(format!("missing {}", tag)))?;
        parse_cif_number(text)?
            .map(|(nominal, _)| nominal)
            .ok_or_else(|| self.error(format!("{} is undefined", tag)))
    }

    fn uncertain(&self, text: &str) -> Result<Option<Uncertain>> {
        Ok(parse_cif_number(text)?.map(|(nominal, su)| {
            if self.propagate {
                Uncertain::new(nominal, su)
            } else {
                Uncertain::exact(nominal)
            }
        }))
    }

    /// 与标签列等长的列；缺失时返回 None
    fn column(&self, tag: &str, len: usize) -> Result<Option<&'a [String]>> {
        match self.block.get(tag) {
            None => Ok(None),
            Some(values) if values.len() == len => Ok(Some(values)),
            Some(values) => Err(self.error(format!(
                "{} has {} values but the table has {} rows",
                tag,
                values.len(),
                len
            ))),
        }
    }

    fn frame(&self) -> Result<CoordinateFrame> {
        CoordinateFrame::from_parameters(
            self.number("_cell_length_a")?,
            self.number("_cell_length_b")?,
            self.number("_cell_length_c")?,
            self.number("_cell_angle_alpha")?,
            self.number("_cell_angle_beta")?,
            self.number("_cell_angle_gamma")?,
        )
    }

    fn atoms(&self) -> Result<Vec<Atom>> {
        let Some(labels) = self.block.get("_atom_site_label") else {
            log::warn!("{}: block '{}' lists no atoms", self.source, self.block.name);
            return Ok(Vec::new());
        };
        let n = labels.len();

        let mut coordinates = Vec::with_capacity(3);
        for axis in ["x", "y", "z"] {
            let tag = format!("_atom_site_fract_{}", axis);
            coordinates.push(
                self.column(&tag, n)?
                    .ok_or_else(|| self.error(format!("missing {}", tag)))?,
            );
        }
        let u_isos = self.column("_atom_site_U_iso_or_equiv", n)?;

        let mut atoms = Vec::with_capacity(n);
        for (i, label) in labels.iter().enumerate() {
            let mut fract = Vec::with_capacity(3);
            for column in &coordinates {
                fract.push(self.uncertain(&column[i])?.ok_or_else(|| {
                    self.error(format!("atom {} has an undefined coordinate", label))
                })?);
            }
            let [x, y, z]: [Uncertain; 3] = fract
                .try_into()
                .map_err(|_| self.error(format!("atom {} has malformed coordinates", label)))?;
            let mut atom = Atom::with_fract(label.clone(), [x, y, z]);
            if let Some(u_isos) = u_isos {
                atom.u_iso = self.uncertain(&u_isos[i])?;
            }
            atoms.push(atom);
        }

        self.attach_anisotropic(&mut atoms)?;
        Ok(atoms)
    }

    fn attach_anisotropic(&self, atoms: &mut [Atom]) -> Result<()> {
        let Some(labels) = self.block.get("_atom_site_aniso_label") else {
            return Ok(());
        };
        let n = labels.len();
        let mut columns = Vec::with_capacity(6);
        for component in U_COMPONENTS {
            let tag = format!("_atom_site_aniso_{}", component);
            columns.push(
                self.column(&tag, n)?
                    .ok_or_else(|| self.error(format!("missing {}", tag)))?,
            );
        }

        for (i, label) in labels.iter().enumerate() {
            let mut values = Vec::with_capacity(6);
            for column in &columns {
                values.push(self.uncertain(&column[i])?);
            }
            // 任一分量未定义时不附带张量
            let Some(tensor) = values.into_iter().collect::<Option<Vec<_>>>() else {
                log::debug!("Skipping undefined displacement tensor of {}", label);
                continue;
            };
            let tensor: [Uncertain; 6] = match tensor.try_into() {
                Ok(t) => t,
                Err(_) => continue,
            };
            match atoms.iter_mut().find(|a| &a.label == label) {
                Some(atom) => atom.u_aniso = Some(tensor),
                None => log::warn!(
                    "{}: anisotropic parameters given for unknown atom {}",
                    self.source,
                    label
                ),
            }
        }
        Ok(())
    }
}

/// 读取结构文件中的一个数据块，可选附带协方差矩阵
pub fn load_structure(
    path: &Path,
    block: Option<&str>,
    covariance: Option<&Path>,
    propagate_uncertainty: bool,
) -> Result<AtomSet> {
    if !path.exists() {
        return Err(PicometerError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let source = path.display().to_string();
    let cif = parse_cif_file(path)?;
    let data = cif.block(block).ok_or_else(|| PicometerError::ParseError {
        format: "CIF".to_string(),
        path: source.clone(),
        reason: format!(
            "no data block named '{}' (available: {})",
            block.unwrap_or_default(),
            cif.block_names().join(", ")
        ),
    })?;

    let covariance = covariance.map(read_olex2_covariance).transpose()?;
    let atoms = atoms_from_block(data, &source, propagate_uncertainty, covariance)?;
    log::debug!(
        "Loaded {} atoms from {} (block '{}')",
        atoms.len(),
        source,
        data.name
    );
    Ok(atoms)
}

/// 由 CIF 数据块构造原子表
pub fn atoms_from_block(
    block: &CifBlock,
    source: &str,
    propagate_uncertainty: bool,
    covariance: Option<CovarianceMatrix>,
) -> Result<AtomSet> {
    let reader = BlockReader {
        block,
        source,
        propagate: propagate_uncertainty,
    };
    let frame = reader.frame()?;
    let mut atoms = reader.atoms()?;

    if let Some(mut covariance) = covariance {
        covariance.rescale_displacements(&frame);
        apply_covariance(&mut atoms, &covariance)?;
    }

    Ok(AtomSet::new(Arc::new(frame), atoms))
}

/// 参数在原子中的位置
enum Parameter {
    Fract(usize),
    UIso,
    UAniso(usize),
}

fn parameter_slot(name: &str) -> Option<Parameter> {
    match name.to_lowercase().as_str() {
        "x" => Some(Parameter::Fract(0)),
        "y" => Some(Parameter::Fract(1)),
        "z" => Some(Parameter::Fract(2)),
        "uiso" => Some(Parameter::UIso),
        "u11" => Some(Parameter::UAniso(0)),
        "u22" => Some(Parameter::UAniso(1)),
        "u33" => Some(Parameter::UAniso(2)),
        "u12" => Some(Parameter::UAniso(3)),
        "u13" => Some(Parameter::UAniso(4)),
        "u23" => Some(Parameter::UAniso(5)),
        _ => None,
    }
}

fn slot<'a>(atom: &'a mut Atom, parameter: &Parameter) -> Option<&'a mut Uncertain> {
    match parameter {
        Parameter::Fract(k) => Some(&mut atom.fract[*k]),
        Parameter::UIso => atom.u_iso.as_mut(),
        Parameter::UAniso(k) => atom.u_aniso.as_mut().map(|u| &mut u[*k]),
    }
}

/// 用协方差矩阵替换对应参数为相关的不确定度数值
fn apply_covariance(atoms: &mut [Atom], covariance: &CovarianceMatrix) -> Result<()> {
    let index: HashMap<String, usize> = atoms
        .iter()
        .enumerate()
        .map(|(i, a)| (a.label.clone(), i))
        .collect();

    // 每个矩阵行对应的 (原子序号, 参数)；不认识的参数只参与分解
    let mut targets = Vec::with_capacity(covariance.len());
    let mut nominals = Vec::with_capacity(covariance.len());
    for label in covariance.labels() {
        let (atom_label, name) = label.rsplit_once('.').ok_or_else(|| {
            PicometerError::CovarianceError(format!("malformed parameter label '{}'", label))
        })?;
        let atom_index = *index.get(atom_label).ok_or_else(|| {
            PicometerError::CovarianceError(format!(
                "parameter '{}' refers to unknown atom '{}'",
                label, atom_label
            ))
        })?;
        match parameter_slot(name) {
            Some(parameter) => {
                let value = slot(&mut atoms[atom_index], &parameter).ok_or_else(|| {
                    PicometerError::CovarianceError(format!(
                        "atom '{}' has no value for parameter '{}'",
                        atom_label, name
                    ))
                })?;
                nominals.push(value.nominal());
                targets.push(Some((atom_index, parameter)));
            }
            None => {
                log::debug!("Ignoring covariance of unsupported parameter '{}'", label);
                nominals.push(0.0);
                targets.push(None);
            }
        }
    }

    let values = correlated_values(&nominals, covariance.matrix())?;
    for (target, value) in targets.into_iter().zip(values) {
        if let Some((atom_index, parameter)) = target {
            if let Some(slot) = slot(&mut atoms[atom_index], &parameter) {
                *slot = value;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::cif::parse_cif_content;
    use crate::parsers::covariance::{encode_olex2_covariance, parse_olex2_covariance};

    const BLOCK: &str = "\
data_test
_cell_length_a 10.0(1)
_cell_length_b 10.0
_cell_length_c 10.0
_cell_angle_alpha 90
_cell_angle_beta 90
_cell_angle_gamma 90
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_fract_y
_atom_site_fract_z
_atom_site_U_iso_or_equiv
Fe 0.0 0.0 0.0 0.0250(2)
C1 0.2345(3) 0.1560(3) 0.1880(4) ?
loop_
_atom_site_aniso_label
_atom_site_aniso_U_11
_atom_site_aniso_U_22
_atom_site_aniso_U_33
_atom_site_aniso_U_12
_atom_site_aniso_U_13
_atom_site_aniso_U_23
Fe 0.021(1) 0.022(1) 0.023(1) 0.001(1) 0.002(1) 0.003(1)
";

    fn block() -> CifBlock {
        parse_cif_content(BLOCK, "test.cif").unwrap().blocks.remove(0)
    }

    #[test]
    fn test_atoms_without_uncertainty() {
        let atoms = atoms_from_block(&block(), "test.cif", false, None).unwrap();
        assert_eq!(atoms.len(), 2);

        let c1 = &atoms.atoms()[1];
        assert_eq!(c1.label, "C1");
        assert!((c1.fract[0].nominal() - 0.2345).abs() < 1e-12);
        assert!(c1.fract[0].is_exact());
        assert!(c1.u_iso.is_none());
        assert!(c1.u_aniso.is_none());

        let fe = &atoms.atoms()[0];
        assert!((fe.u_iso.as_ref().unwrap().nominal() - 0.025).abs() < 1e-12);
        assert!((fe.u_aniso.as_ref().unwrap()[5].nominal() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_atoms_with_uncertainty() {
        let atoms = atoms_from_block(&block(), "test.cif", true, None).unwrap();
        let c1 = &atoms.atoms()[1];
        assert!((c1.fract[2].std_dev() - 0.0004).abs() < 1e-12);
        let fe = &atoms.atoms()[0];
        assert!((fe.u_aniso.as_ref().unwrap()[0].std_dev() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_missing_cell_is_an_error() {
        let content = "data_x\n_cell_length_a 5\nloop_\n_atom_site_label\nFe\n";
        let block = parse_cif_content(content, "x.cif").unwrap().blocks.remove(0);
        assert!(atoms_from_block(&block, "x.cif", false, None).is_err());
    }

    #[test]
    fn test_covariance_makes_values_correlated() {
        let bytes = encode_olex2_covariance(
            &["C1.x", "C1.y", "Fe.u11"],
            &[1e-6, 5e-7, 0.0, 1e-6, 0.0, 1e-8],
        );
        let covariance = parse_olex2_covariance(&bytes, "test.vcov").unwrap();
        let atoms = atoms_from_block(&block(), "test.cif", false, Some(covariance)).unwrap();

        let c1 = &atoms.atoms()[1];
        assert!((c1.fract[0].std_dev() - 1e-3).abs() < 1e-12);
        assert!((c1.fract[0].covariance(&c1.fract[1]) - 5e-7).abs() < 1e-15);
        assert!((c1.fract[0].nominal() - 0.2345).abs() < 1e-12);

        // u11 在 a* = 0.1 下放大 100 倍：方差 1e-8 × 100²
        let fe = &atoms.atoms()[0];
        let u11 = &fe.u_aniso.as_ref().unwrap()[0];
        assert!((u11.std_dev() - 1e-2).abs() < 1e-9);
    }

    #[test]
    fn test_covariance_for_unknown_atom() {
        let bytes = encode_olex2_covariance(&["Zn.x"], &[1e-6]);
        let covariance = parse_olex2_covariance(&bytes, "test.vcov").unwrap();
        assert!(atoms_from_block(&block(), "test.cif", false, Some(covariance)).is_err());
    }
}
