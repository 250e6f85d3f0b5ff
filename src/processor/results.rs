//! # 结果表
//!
//! 稀疏的 (结构标签, 测量标签) → 数值表，保持行列的插入顺序。
//! 同一键重复写入时覆盖。
//!
//! ## 依赖关系
//! - 被 `processor/mod.rs`, `commands/` 使用
//! - 使用 `csv` 导出，`tabled` 生成终端表格

use crate::error::{PicometerError, Result};
use crate::models::Uncertain;

use std::collections::HashMap;
use std::path::Path;
use tabled::builder::Builder;
use tabled::Table;

/// 测量结果表
#[derive(Debug, Clone, Default)]
pub struct EvaluationTable {
    rows: Vec<String>,
    columns: Vec<String>,
    cells: HashMap<(String, String), Uncertain>,
}

impl EvaluationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入单元格，已存在时覆盖
    pub fn set(&mut self, row: &str, column: &str, value: Uncertain) {
        if !self.rows.iter().any(|r| r == row) {
            self.rows.push(row.to_string());
        }
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        self.cells
            .insert((row.to_string(), column.to_string()), value);
    }

    pub fn get(&self, row: &str, column: &str) -> Option<&Uncertain> {
        self.cells.get(&(row.to_string(), column.to_string()))
    }

    /// 某一列按行顺序的值
    pub fn column(&self, column: &str) -> Vec<Option<&Uncertain>> {
        self.rows.iter().map(|row| self.get(row, column)).collect()
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.columns.clear();
        self.cells.clear();
    }

    fn column_is_uncertain(&self, column: &str) -> bool {
        self.rows
            .iter()
            .filter_map(|row| self.get(row, column))
            .any(|v| !v.is_exact())
    }

    /// 导出为 CSV；含不确定度的列后附 `<label>_su` 列
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        let uncertain: Vec<bool> = self
            .columns
            .iter()
            .map(|c| self.column_is_uncertain(c))
            .collect();

        let mut header = vec![String::new()];
        for (column, &has_su) in self.columns.iter().zip(&uncertain) {
            header.push(column.clone());
            if has_su {
                header.push(format!("{}_su", column));
            }
        }
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.clone()];
            for (column, &has_su) in self.columns.iter().zip(&uncertain) {
                let value = self.get(row, column);
                record.push(value.map(|v| v.nominal().to_string()).unwrap_or_default());
                if has_su {
                    record.push(value.map(|v| v.std_dev().to_string()).unwrap_or_default());
                }
            }
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(|e| PicometerError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// 终端表格，数值以 `1.234(5)` 记法显示
    pub fn to_table(&self) -> Table {
        let mut builder = Builder::default();
        let mut header = vec!["structure".to_string()];
        header.extend(self.columns.iter().cloned());
        builder.push_record(header);

        for row in &self.rows {
            let mut record = vec![row.clone()];
            for column in &self.columns {
                record.push(
                    self.get(row, column)
                        .map(format_value)
                        .unwrap_or_default(),
                );
            }
            builder.push_record(record);
        }
        builder.build()
    }
}

/// 单元格文本：精确值保留四位小数，否则用 `1.234(5)` 记法
pub fn format_value(value: &Uncertain) -> String {
    if value.is_exact() {
        format!("{:.4}", value.nominal())
    } else {
        value.to_string()
    }
}
