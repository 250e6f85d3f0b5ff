//! # 指令处理器
//!
//! 持有全部运行状态：结构状态、当前选择、结果表、历史、设置、组注册表。
//! 指令逐条执行，每条执行完毕后才开始下一条。
//!
//! 执行失败时立即返回错误；之前已完成指令的效果保留，不做回滚。
//! 成功执行的指令（`clear` 除外）按原样记入历史。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `routine/`, `locator/`, `models/`, `geometry/`, `parsers/`
//! - 子模块: results

pub mod results;

pub use results::{format_value, EvaluationTable};

use crate::error::{PicometerError, Result};
use crate::geometry::{Explicit, Shape};
use crate::locator::{GroupRegistry, Locator, Resolver};
use crate::models::{AtomSet, ModelState, ModelStates, Uncertain};
use crate::parsers::load_structure;
use crate::routine::{Instruction, Routine, Settings};

use std::path::{Path, PathBuf};

/// 指令处理器
#[derive(Debug, Clone, Default)]
pub struct Processor {
    model_states: ModelStates,
    selection: Vec<Locator>,
    evaluation_table: EvaluationTable,
    history: Routine,
    settings: Settings,
    groups: GroupRegistry,
    diagnostics: Vec<String>,
    base_dir: Option<PathBuf>,
}

impl Processor {
    pub fn new() -> Self {
        log::info!("Initialized instruction processor");
        Self::default()
    }

    /// 相对路径（`load`、`write`）以此目录为基准
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn model_states(&self) -> &ModelStates {
        &self.model_states
    }

    pub fn selection(&self) -> &[Locator] {
        &self.selection
    }

    pub fn evaluation_table(&self) -> &EvaluationTable {
        &self.evaluation_table
    }

    pub fn history(&self) -> &Routine {
        &self.history
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// 解析过程中的非致命问题（例如未匹配任何原子的定位器）
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// 依次执行例程中的全部指令，遇到第一个错误即停止
    pub fn process_routine(&mut self, routine: &Routine) -> Result<()> {
        for (index, instruction) in routine.iter().enumerate() {
            if let Err(e) = self.process(instruction) {
                log::error!("Instruction #{} '{}' failed: {}", index + 1, instruction, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// 执行单条指令
    pub fn process(&mut self, instruction: &Instruction) -> Result<()> {
        log::debug!("Processing '{}'", instruction);
        match instruction {
            Instruction::Clear => {
                self.clear();
                log::info!("Cleared processor state");
                return Ok(());
            }
            Instruction::Load { path, block, cov } => {
                self.load(path, block.as_deref(), cov.as_deref())?
            }
            Instruction::Select(None) => self.selection.clear(),
            Instruction::Select(Some(locator)) => self.selection.push(locator.clone()),
            Instruction::Recenter(target) => {
                for locator in &mut self.selection {
                    locator.at = Some(vec![target.clone()]);
                }
            }
            Instruction::Group { label } => {
                self.groups.define(label.clone(), self.selection.clone());
                self.consume_selection();
            }
            Instruction::Centroid { label } => self.centroid(label)?,
            Instruction::Line { label } => self.fit(label, AtomSet::line)?,
            Instruction::Plane { label } => self.fit(label, AtomSet::plane)?,
            Instruction::Distance { label } => self.evaluate(label, |shapes| match shapes {
                [a, b] => a.distance(b),
                _ => Err(PicometerError::UnsupportedOperands {
                    operation: "distance".to_string(),
                    reason: format!("needs exactly 2 selected items, got {}", shapes.len()),
                }),
            })?,
            Instruction::Angle { label } => self.evaluate(label, Shape::angle)?,
            Instruction::Dihedral { label } => self.evaluate(label, Shape::dihedral)?,
            Instruction::Write { path } => {
                let path = self.resolve_path(path);
                self.evaluation_table.write_csv(&path)?;
                log::info!("Wrote results to {}", path.display());
            }
            Instruction::Set(pairs) => self.settings.update(pairs)?,
        }

        self.history.push(instruction.clone());
        log::info!(
            "Processed '{}' ({} structures, {} selected)",
            instruction,
            self.model_states.len(),
            self.selection.len()
        );
        Ok(())
    }

    /// 重置全部状态；基准目录保留
    pub fn clear(&mut self) {
        self.model_states = ModelStates::new();
        self.selection.clear();
        self.evaluation_table.clear();
        self.history.clear();
        self.settings = Settings::default();
        self.groups.clear();
        self.diagnostics.clear();
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn consume_selection(&mut self) {
        if self.settings.clear_selection_after_use {
            self.selection.clear();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // 指令实现
    // ─────────────────────────────────────────────────────────────

    fn load(&mut self, path: &str, block: Option<&str>, cov: Option<&str>) -> Result<()> {
        let cov_path = cov.map(|c| self.resolve_path(c));
        let atoms = load_structure(
            &self.resolve_path(path),
            block,
            cov_path.as_deref(),
            self.settings.propagate_uncertainty,
        )?;

        let label = match block {
            Some(block) => format!("{}:{}", path, block),
            None => path.to_string(),
        };
        log::info!("Loaded structure '{}' with {} atoms", label, atoms.len());
        self.model_states.insert(label, ModelState::new(atoms));
        Ok(())
    }

    fn centroid(&mut self, label: &str) -> Result<()> {
        for (structure, state) in self.model_states.iter_mut() {
            let nodes = state.nodes();
            let selected = resolve(
                structure,
                &nodes,
                &self.selection,
                &self.groups,
                &mut self.diagnostics,
            )?;
            let fract = selected.fract_centroid().ok_or_else(|| {
                PicometerError::DegenerateGeometry(format!(
                    "centroid '{}' of structure '{}' has no atoms",
                    label, structure
                ))
            })?;
            state.add_centroid(label, fract)?;
        }
        self.consume_selection();
        Ok(())
    }

    fn fit<F>(&mut self, label: &str, fit: F) -> Result<()>
    where
        F: Fn(&AtomSet) -> Result<Explicit>,
    {
        for (structure, state) in self.model_states.iter_mut() {
            let nodes = state.nodes();
            let selected = resolve(
                structure,
                &nodes,
                &self.selection,
                &self.groups,
                &mut self.diagnostics,
            )?;
            let shape = fit(&selected)?;
            log::debug!("Stored {:?} '{}' in structure '{}'", shape.kind(), label, structure);
            state.shapes.insert(label.to_string(), shape);
        }
        self.consume_selection();
        Ok(())
    }

    /// 在每个结构上求值并写入结果表
    fn evaluate<F>(&mut self, label: &str, measure: F) -> Result<()>
    where
        F: Fn(&[Shape]) -> Result<Uncertain>,
    {
        if self.model_states.is_empty() {
            log::warn!("No structures loaded; '{}' is not evaluated", label);
        }

        let mut values = Vec::with_capacity(self.model_states.len());
        for (structure, state) in self.model_states.iter() {
            let nodes = state.nodes();
            let mut shapes = Vec::with_capacity(self.selection.len());
            for locator in &self.selection {
                let shape = match state.shapes.get(&locator.label) {
                    Some(explicit) => Shape::Explicit(explicit.clone()),
                    None => {
                        let atoms = resolve(
                            structure,
                            &nodes,
                            std::slice::from_ref(locator),
                            &self.groups,
                            &mut self.diagnostics,
                        )?;
                        Shape::Nodes(atoms.cart_points())
                    }
                };
                shapes.push(shape);
            }
            let value = measure(&shapes)?;
            log::debug!("{} [{}] = {}", label, structure, value);
            values.push((structure.to_string(), value));
        }

        for (structure, value) in values {
            self.evaluation_table.set(&structure, label, value);
        }
        self.consume_selection();
        Ok(())
    }
}

/// 解析定位器，并把未匹配的标签记入诊断
fn resolve(
    structure: &str,
    nodes: &AtomSet,
    locators: &[Locator],
    groups: &GroupRegistry,
    diagnostics: &mut Vec<String>,
) -> Result<AtomSet> {
    let mut resolver = Resolver::new(nodes, groups);
    let atoms = resolver.locate(locators)?;
    for label in resolver.into_unmatched() {
        diagnostics.push(format!(
            "{}: locator '{}' matched no atoms",
            structure, label
        ));
    }
    Ok(atoms)
}

/// 以全新的处理器执行例程
pub fn process(routine: &Routine) -> Result<Processor> {
    let mut processor = Processor::new();
    processor.process_routine(routine)?;
    Ok(processor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_ferrocene;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Processor) {
        let dir = tempfile::tempdir().unwrap();
        write_ferrocene(dir.path(), "ferrocene.cif");
        let processor = Processor::new().with_base_dir(dir.path());
        (dir, processor)
    }

    fn run(processor: &mut Processor, text: &str) -> Result<()> {
        let routine: Routine = text.parse().unwrap();
        processor.process_routine(&routine)
    }

    fn value(processor: &Processor, column: &str) -> Uncertain {
        processor
            .evaluation_table()
            .get("ferrocene.cif", column)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_ring_centroid() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "instructions:\n  - load: ferrocene.cif\n  - select: C.+\n  - centroid: ring_centroid\n",
        )
        .unwrap();

        let state = processor.model_states().get("ferrocene.cif").unwrap();
        let centroid = &state.centroids.atoms()[0];
        assert_eq!(centroid.label, "ring_centroid");
        let x = centroid.fract[0].nominal();
        assert!((0.113..=0.116).contains(&x), "x = {}", x);
        assert!(centroid.fract[2].nominal().abs() < 0.03);
        assert!(processor.selection().is_empty());
    }

    #[test]
    fn test_distance_between_ring_planes() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: C[1-5]
  - plane: top
  - select: C([6-9]|10)
  - plane: bottom
  - select: top
  - select: bottom
  - distance: separation
  - select: top
  - select: bottom
  - angle: tilt
",
        )
        .unwrap();

        let separation = value(&processor, "separation").nominal();
        assert!((separation - 3.30).abs() / 3.30 < 1e-9);
        assert!(value(&processor, "tilt").nominal().abs() < 1e-6);
    }

    #[test]
    fn test_atom_geometry() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: C5
  - select: C1
  - select: C2
  - angle: ring_angle
  - select: C1
  - select: C2
  - select: C3
  - select: C4
  - dihedral: ring_torsion
  - select: C1
  - select: C2
  - distance: bond
  - select: Fe
  - select: C[1-5]
  - distance: fe_c
",
        )
        .unwrap();

        assert!((value(&processor, "ring_angle").nominal() - 108.0).abs() < 1e-3);
        assert!(value(&processor, "ring_torsion").nominal().abs() < 1e-3);
        let bond = 2.0 * 1.2 * 36f64.to_radians().sin();
        assert!((value(&processor, "bond").nominal() - bond).abs() < 1e-4);

        // 最近的碳原子：到环中心的水平距离 1.2 Å 中最小者
        let fe_c = value(&processor, "fe_c").nominal();
        assert!(fe_c > 1.88 && fe_c < 3.0);
        assert!(value(&processor, "bond").is_exact());
    }

    #[test]
    fn test_uncertainty_propagation() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
settings:
  propagate_uncertainty: true
instructions:
  - load: ferrocene.cif
  - select: C1
  - select: C2
  - distance: bond
",
        )
        .unwrap();

        let bond = value(&processor, "bond");
        assert!(!bond.is_exact());
        assert!(bond.std_dev() > 0.0 && bond.std_dev() < 0.01);
    }

    #[test]
    fn test_group_and_recenter() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: C[1-5]
  - group: top_ring
  - select: {label: top_ring, symm: '-x,-y,-z'}
  - recenter: Fe
  - centroid: moved
  - select: top_ring
  - centroid: direct
  - select: C[1-5]
  - centroid: reference
",
        )
        .unwrap();

        assert!(processor.groups().contains("top_ring"));
        let state = processor.model_states().get("ferrocene.cif").unwrap();
        let centroids = state.centroids.atoms();
        assert_eq!(centroids.len(), 3);
        for k in 0..3 {
            assert!(centroids[0].fract[k].nominal().abs() < 1e-6);
            assert!((centroids[1].fract[k].nominal() - centroids[2].fract[k].nominal()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_group_is_fixed_when_defined() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: C[1-5]
  - group: ring
  - select: ring
  - group: cp
  - select: Fe
  - group: ring
  - select: cp
  - centroid: via_cp
  - select: C[1-5]
  - centroid: reference
  - select: ring
  - centroid: metal
",
        )
        .unwrap();

        let state = processor.model_states().get("ferrocene.cif").unwrap();
        let centroids = state.centroids.atoms();
        assert_eq!(centroids.len(), 3);
        for k in 0..3 {
            assert!((centroids[0].fract[k].nominal() - centroids[1].fract[k].nominal()).abs() < 1e-12);
            assert!(centroids[2].fract[k].nominal().abs() < 1e-12);
        }
    }

    #[test]
    fn test_keep_selection_when_configured() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
settings:
  clear_selection_after_use: false
instructions:
  - load: ferrocene.cif
  - select: C[1-5]
  - centroid: top
  - line: axis
",
        )
        .unwrap();
        assert_eq!(processor.selection().len(), 1);

        run(&mut processor, "- select").unwrap();
        assert!(processor.selection().is_empty());
    }

    #[test]
    fn test_clear_resets_everything() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - set: {clear_selection_after_use: false}
  - select: Fe
  - select: C1
  - group: pair
  - distance: d
",
        )
        .unwrap();
        assert!(!processor.evaluation_table().is_empty());

        processor.process(&Instruction::Clear).unwrap();
        assert!(processor.model_states().is_empty());
        assert!(processor.selection().is_empty());
        assert!(processor.evaluation_table().is_empty());
        assert!(processor.history().is_empty());
        assert!(processor.groups().is_empty());
        assert_eq!(processor.settings(), &Settings::default());
    }

    #[test]
    fn test_failure_keeps_earlier_effects() {
        let (_dir, mut processor) = setup();
        let result = run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: C1
  - select: C2
  - angle: too_few
",
        );
        assert!(matches!(
            result,
            Err(PicometerError::UnsupportedOperands { .. })
        ));
        assert_eq!(processor.model_states().len(), 1);
        assert_eq!(processor.history().len(), 3);
        assert!(processor.evaluation_table().is_empty());
    }

    #[test]
    fn test_operand_kinds() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "instructions:\n  - load: ferrocene.cif\n  - select: C[1-5]\n  - plane: top\n",
        )
        .unwrap();

        let three = run(&mut processor, "- select: top\n- select: Fe\n- select: C1\n- distance: d\n");
        assert!(three.is_err());
        processor.process(&Instruction::Select(None)).unwrap();

        let dihedral = run(&mut processor, "- select: top\n- select: Fe\n- dihedral: t\n");
        assert!(dihedral.is_err());
    }

    #[test]
    fn test_unmatched_locator_is_a_diagnostic() {
        let (_dir, mut processor) = setup();
        run(
            &mut processor,
            "instructions:\n  - load: ferrocene.cif\n  - select: Xx\n  - select: Fe\n  - centroid: c\n",
        )
        .unwrap();
        assert_eq!(processor.diagnostics().len(), 1);
        assert!(processor.diagnostics()[0].contains("Xx"));
    }

    #[test]
    fn test_group_cycle_is_an_error() {
        let (_dir, mut processor) = setup();
        let result = run(
            &mut processor,
            "\
instructions:
  - load: ferrocene.cif
  - select: loop
  - group: loop
  - select: loop
  - centroid: c
",
        );
        assert!(matches!(result, Err(PicometerError::GroupCycle { .. })));
    }

    #[test]
    fn test_history_and_results_output() {
        let (dir, mut processor) = setup();
        let text = "\
instructions:
  - load: ferrocene.cif
  - load: {path: ferrocene.cif, block: ferrocene}
  - select: Fe
  - select: C1
  - distance: d
  - write: results.csv
";
        run(&mut processor, text).unwrap();

        let rows = processor.evaluation_table().rows().to_vec();
        assert_eq!(rows, vec!["ferrocene.cif", "ferrocene.cif:ferrocene"]);
        assert!(dir.path().join("results.csv").exists());

        let reloaded: Routine = processor.history().to_yaml_string().unwrap().parse().unwrap();
        assert_eq!(&reloaded, processor.history());
        assert_eq!(reloaded.len(), 6);
    }

    #[test]
    fn test_process_fresh_routine() {
        let routine: Routine = "- select: Fe\n- clear\n- set: {propagate_uncertainty: true}\n"
            .parse()
            .unwrap();
        let processor = process(&routine).unwrap();
        assert!(processor.settings().propagate_uncertainty);
        assert_eq!(processor.history().len(), 1);
    }

    #[test]
    fn test_missing_structure_file() {
        let (_dir, mut processor) = setup();
        assert!(run(&mut processor, "- load: missing.cif\n").is_err());
        assert!(processor.model_states().is_empty());
    }
}
