//! # run 子命令实现
//!
//! 读取例程文件，在新的处理器中执行，并打印结果表。
//! 例程中的相对路径以例程文件所在目录为基准。
//!
//! 执行失败时仍打印已得到的部分结果，并按需写出结果与历史，
//! 然后返回错误。
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的 RunArgs
//! - 使用 `routine/`, `processor/`

use crate::cli::run::RunArgs;
use crate::error::{PicometerError, Result};
use crate::processor::Processor;
use crate::routine::Routine;
use crate::utils::output;

use std::path::Path;

/// 执行 run 命令
pub fn execute(args: RunArgs) -> Result<()> {
    output::print_header("Picometer Routine");

    let (processor, outcome) = run_routine_file(&args.routine)?;
    report(&processor);

    if let Some(path) = &args.results {
        processor.evaluation_table().write_csv(path)?;
        output::print_written("results", &path.display().to_string());
    }
    if let Some(path) = &args.history {
        processor.history().write_yaml(path)?;
        output::print_written("history", &path.display().to_string());
    }

    outcome?;
    output::print_done(&format!(
        "Processed {} instructions on {} structures",
        processor.history().len(),
        processor.model_states().len()
    ));
    Ok(())
}

/// 在独立的处理器中执行例程文件
///
/// 外层错误表示例程无法读取；内层结果为执行结果，失败时处理器保留部分状态。
pub fn run_routine_file(path: &Path) -> Result<(Processor, Result<()>)> {
    if !path.is_file() {
        return Err(PicometerError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let routine = Routine::from_path(path)?;
    log::info!(
        "Read {} instructions from '{}'",
        routine.len(),
        path.display()
    );

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().map_err(|e| PicometerError::FileReadError {
            path: ".".to_string(),
            source: e,
        })?,
    };

    let mut processor = Processor::new().with_base_dir(base_dir);
    let outcome = processor.process_routine(&routine);
    Ok((processor, outcome))
}

/// 打印结果表与诊断信息
fn report(processor: &Processor) {
    for diagnostic in processor.diagnostics() {
        output::print_warning(diagnostic);
    }

    let table = processor.evaluation_table();
    if table.is_empty() {
        output::print_info("No measurements were recorded");
    } else {
        println!("{}", table.to_table());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_ferrocene;
    use std::fs;

    #[test]
    fn test_run_routine_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_ferrocene(dir.path(), "ferrocene.cif");
        let routine = dir.path().join("routine.yaml");
        fs::write(
            &routine,
            "instructions:\n  - load: ferrocene.cif\n  - select: Fe\n  - select: C1\n  - distance: d\n  - write: d.csv\n",
        )
        .unwrap();

        let (processor, outcome) = run_routine_file(&routine).unwrap();
        outcome.unwrap();
        assert!(processor.evaluation_table().get("ferrocene.cif", "d").is_some());
        assert!(dir.path().join("d.csv").exists());
    }

    #[test]
    fn test_failed_routine_keeps_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        write_ferrocene(dir.path(), "ferrocene.cif");
        let routine = dir.path().join("routine.yaml");
        fs::write(
            &routine,
            "- load: ferrocene.cif\n- select: Fe\n- select: C1\n- distance: d\n- bogus: x\n",
        )
        .unwrap();

        // 未知指令在读取例程时即被拒绝
        assert!(run_routine_file(&routine).is_err());

        fs::write(
            &routine,
            "- load: ferrocene.cif\n- select: Fe\n- select: C1\n- distance: d\n- angle: a\n",
        )
        .unwrap();
        let (processor, outcome) = run_routine_file(&routine).unwrap();
        assert!(outcome.is_err());
        assert_eq!(processor.evaluation_table().len(), 1);
    }

    #[test]
    fn test_missing_routine() {
        assert!(run_routine_file(Path::new("/nonexistent/routine.yaml")).is_err());
    }
}
