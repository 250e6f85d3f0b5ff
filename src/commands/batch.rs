//! # batch 子命令实现
//!
//! 并行执行多个例程文件。每个例程在独立的处理器中运行，
//! 组定义、设置与结果互不影响。
//!
//! ## 依赖关系
//! - 使用 `cli/batch.rs` 定义的 BatchArgs
//! - 使用 `batch/` 模块进行批量处理
//! - 使用 `commands/run.rs` 执行单个例程

use crate::batch::{BatchResult, BatchRunner, FileCollector, ProcessResult};
use crate::cli::batch::BatchArgs;
use crate::commands::run::run_routine_file;
use crate::error::{PicometerError, Result};
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};

/// 执行 batch 命令
pub fn execute(args: BatchArgs) -> Result<()> {
    output::print_header("Picometer Batch");

    if !args.input.exists() {
        return Err(PicometerError::DirectoryNotFound {
            path: args.input.display().to_string(),
        });
    }

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect();

    if files.is_empty() {
        output::print_warning(&format!(
            "No routine files found with pattern '{}'",
            args.pattern
        ));
        return Ok(());
    }
    output::print_info(&format!("Found {} routine files", files.len()));

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).map_err(|e| PicometerError::FileWriteError {
            path: dir.display().to_string(),
            source: e,
        })?;
    }

    let config = BatchConfig {
        output_dir: args.output.clone(),
        overwrite: args.overwrite,
    };
    let result = BatchRunner::new(args.jobs)
        .with_progress(!args.no_progress)
        .run(files, |file| process_routine(file, &config));

    summarize(&result)
}

/// 批量处理配置
struct BatchConfig {
    output_dir: Option<PathBuf>,
    overwrite: bool,
}

fn results_path(output_dir: &Path, routine: &Path) -> PathBuf {
    let stem = routine
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("routine");
    output_dir.join(format!("{}.csv", stem))
}

/// 处理批量模式中的单个例程
fn process_routine(routine: &PathBuf, config: &BatchConfig) -> ProcessResult {
    let target = config
        .output_dir
        .as_deref()
        .map(|dir| results_path(dir, routine));

    if let Some(target) = &target {
        if target.exists() && !config.overwrite {
            return ProcessResult::Skipped(format!(
                "Results exist, skipping: {}",
                target.display()
            ));
        }
    }

    let failed = |e: PicometerError| ProcessResult::Failed(routine.display().to_string(), e.to_string());

    let (processor, outcome) = match run_routine_file(routine) {
        Ok(run) => run,
        Err(e) => return failed(e),
    };
    if let Err(e) = outcome {
        return failed(e);
    }

    if let Some(target) = &target {
        if let Err(e) = processor.evaluation_table().write_csv(target) {
            return failed(e);
        }
    }

    ProcessResult::Success(format!(
        "{}: {} values",
        routine.display(),
        processor.evaluation_table().len()
    ))
}

/// 打印统计；有失败时返回错误
fn summarize(result: &BatchResult) -> Result<()> {
    output::print_separator();
    output::print_success(&format!(
        "Batch complete: {} success, {} skipped, {} failed",
        result.success, result.skipped, result.failed
    ));

    if result.failures.is_empty() {
        return Ok(());
    }

    output::print_warning("Failed routines:");
    for (path, err) in result.failures.iter().take(10) {
        output::print_error(&format!("  {}: {}", path, err));
    }
    if result.failures.len() > 10 {
        output::print_warning(&format!("  ... and {} more", result.failures.len() - 10));
    }

    Err(PicometerError::Other(format!(
        "{} of {} routines failed",
        result.failed,
        result.total()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_ferrocene;

    const ROUTINE: &str =
        "- load: ferrocene.cif\n- select: C[1-5]\n- plane: p\n- select: p\n- select: Fe\n- distance: d\n";

    #[test]
    fn test_batch_isolates_routines() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        write_ferrocene(dir.path(), "ferrocene.cif");
        fs::write(dir.path().join("good.yaml"), ROUTINE).unwrap();
        // 组只在定义它的例程中可见
        fs::write(
            dir.path().join("bad.yaml"),
            "- load: ferrocene.cif\n- select: p\n- select: Fe\n- distance: d\n",
        )
        .unwrap();

        let args = BatchArgs {
            input: dir.path().to_path_buf(),
            pattern: "*.yaml".to_string(),
            recursive: false,
            jobs: 2,
            output: Some(out.clone()),
            overwrite: false,
            no_progress: true,
        };
        assert!(execute(args).is_err());

        let csv = fs::read_to_string(out.join("good.csv")).unwrap();
        assert!(csv.contains("ferrocene.cif"));
        assert!(!out.join("bad.csv").exists());
    }

    #[test]
    fn test_existing_results_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_ferrocene(dir.path(), "ferrocene.cif");
        let routine = dir.path().join("good.yaml");
        fs::write(&routine, ROUTINE).unwrap();
        fs::write(dir.path().join("good.csv"), "").unwrap();

        let config = BatchConfig {
            output_dir: Some(dir.path().to_path_buf()),
            overwrite: false,
        };
        assert!(matches!(
            process_routine(&routine, &config),
            ProcessResult::Skipped(_)
        ));

        let config = BatchConfig {
            output_dir: Some(dir.path().to_path_buf()),
            overwrite: true,
        };
        assert!(matches!(
            process_routine(&routine, &config),
            ProcessResult::Success(_)
        ));
    }
}
