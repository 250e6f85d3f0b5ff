//! # atoms 子命令实现
//!
//! 打印结构文件的晶胞参数与原子表。
//!
//! ## 依赖关系
//! - 使用 `cli/atoms.rs` 定义的 AtomsArgs
//! - 使用 `parsers/loader.rs` 读取结构
//! - 使用 `tabled` 生成表格

use crate::cli::atoms::AtomsArgs;
use crate::error::{PicometerError, Result};
use crate::models::AtomSet;
use crate::parsers::load_structure;
use crate::processor::format_value;
use crate::utils::output;

use tabled::builder::Builder;
use tabled::Table;

/// 执行 atoms 命令
pub fn execute(args: AtomsArgs) -> Result<()> {
    output::print_header("Structure Overview");

    let atoms = load_structure(&args.input, args.block.as_deref(), None, args.uncertainty)?;
    let frame = atoms.frame().ok_or_else(|| {
        PicometerError::InvalidCell(format!("{} has no unit cell", args.input.display()))
    })?;

    let (a, b, c, alpha, beta, gamma) = frame.parameters();
    output::print_info(&format!(
        "Cell: a={:.4} b={:.4} c={:.4} Å, α={:.3} β={:.3} γ={:.3}°",
        a, b, c, alpha, beta, gamma
    ));
    output::print_info(&format!("Volume: {:.3} Å³", frame.volume()));
    output::print_separator();
    println!("{}", atom_table(&atoms));
    output::print_success(&format!("{} atoms", atoms.len()));
    Ok(())
}

/// 原子表：标签、分数坐标、U_iso 与是否有各向异性参数
pub fn atom_table(atoms: &AtomSet) -> Table {
    let mut builder = Builder::default();
    builder.push_record(["label", "x", "y", "z", "U_iso", "aniso"]);
    for atom in atoms.atoms() {
        builder.push_record([
            atom.label.clone(),
            format_value(&atom.fract[0]),
            format_value(&atom.fract[1]),
            format_value(&atom.fract[2]),
            atom.u_iso.as_ref().map(format_value).unwrap_or_else(|| "-".to_string()),
            if atom.u_aniso.is_some() { "yes" } else { "-" }.to_string(),
        ]);
    }
    builder.build()
}
