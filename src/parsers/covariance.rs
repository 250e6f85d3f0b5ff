//! # 协方差矩阵读取
//!
//! 读取 Olex2 导出的 VCOV 文件：第一行为 `VCOV`，第二行为空白分隔的
//! 参数标签（`ATOM.param`），其后是一个 NumPy `.npy` 数组，
//! 按行保存对称矩阵的上三角。
//!
//! Olex2 中 `u11..u23` 的协方差按倒易轴约定给出，
//! 使用前需按 `1/a*_i · 1/a*_j` 缩放到 CIF 约定。
//!
//! ## 依赖关系
//! - 被 `parsers/loader.rs` 使用
//! - 使用 `nalgebra` 存储矩阵

use crate::error::{PicometerError, Result};
use crate::models::CoordinateFrame;

use nalgebra::DMatrix;
use regex::Regex;
use std::fs;
use std::path::Path;

/// 带参数标签的协方差矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    labels: Vec<String>,
    matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    pub fn new(labels: Vec<String>, matrix: DMatrix<f64>) -> Result<Self> {
        if matrix.nrows() != labels.len() || matrix.ncols() != labels.len() {
            return Err(PicometerError::CovarianceError(format!(
                "{} labels do not match a {}x{} matrix",
                labels.len(),
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        Ok(CovarianceMatrix { labels, matrix })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 把 `uij` 行列从倒易轴约定缩放到 CIF 约定
    pub fn rescale_displacements(&mut self, frame: &CoordinateFrame) {
        let r = frame.reciprocal_lengths();
        let n = [1.0 / r[0], 1.0 / r[1], 1.0 / r[2]];
        let factors: Vec<f64> = self
            .labels
            .iter()
            .map(|label| {
                let param = label.rsplit('.').next().unwrap_or_default().to_lowercase();
                match param.as_str() {
                    "u11" => n[0] * n[0],
                    "u22" => n[1] * n[1],
                    "u33" => n[2] * n[2],
                    "u12" => n[0] * n[1],
                    "u13" => n[0] * n[2],
                    "u23" => n[1] * n[2],
                    _ => 1.0,
                }
            })
            .collect();

        for i in 0..self.len() {
            for j in 0..self.len() {
                self.matrix[(i, j)] *= factors[i] * factors[j];
            }
        }
    }
}

/// 读取 Olex2 VCOV 文件
pub fn read_olex2_covariance(path: &Path) -> Result<CovarianceMatrix> {
    let bytes = fs::read(path).map_err(|e| PicometerError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_olex2_covariance(&bytes, &path.display().to_string())
}

/// 解析 VCOV 字节内容
pub fn parse_olex2_covariance(bytes: &[u8], name: &str) -> Result<CovarianceMatrix> {
    let error = |reason: String| PicometerError::ParseError {
        format: "VCOV".to_string(),
        path: name.to_string(),
        reason,
    };

    let (first, rest) = split_line(bytes).ok_or_else(|| error("file is empty".into()))?;
    if trim_ascii(first) != b"VCOV" {
        return Err(error("first line must be 'VCOV'".into()));
    }
    let (label_line, npy) =
        split_line(rest).ok_or_else(|| error("missing parameter label line".into()))?;
    let labels: Vec<String> = String::from_utf8_lossy(label_line)
        .split_whitespace()
        .map(String::from)
        .collect();

    let triangle = parse_npy(npy).map_err(error)?;
    let n = labels.len();
    if triangle.len() != n * (n + 1) / 2 {
        return Err(error(format!(
            "{} labels need {} upper-triangle values, found {}",
            n,
            n * (n + 1) / 2,
            triangle.len()
        )));
    }

    let mut matrix = DMatrix::<f64>::zeros(n, n);
    let mut values = triangle.into_iter();
    for i in 0..n {
        for j in i..n {
            let value = values.next().unwrap_or_default();
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }
    }

    CovarianceMatrix::new(labels, matrix)
}

fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    if bytes.is_empty() {
        return None;
    }
    match bytes.iter().position(|&b| b == b'\n') {
        Some(end) => Some((&bytes[..end], &bytes[end + 1..])),
        None => Some((bytes, &[])),
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end.max(start)]
}

/// 解析一维小端 float64 的 `.npy` 数组
fn parse_npy(bytes: &[u8]) -> std::result::Result<Vec<f64>, String> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err("missing NumPy array header".to_string());
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated NumPy header".to_string());
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(format!("unsupported NumPy format version {}", v)),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err("truncated NumPy header".to_string());
    }
    let header = String::from_utf8_lossy(&bytes[header_start..data_start]);

    let descr = Regex::new(r"'descr':\s*'([^']*)'")
        .ok()
        .and_then(|re| re.captures(&header).map(|c| c[1].to_string()))
        .ok_or_else(|| "NumPy header has no dtype".to_string())?;
    if descr != "<f8" {
        return Err(format!("unsupported dtype '{}', expected '<f8'", descr));
    }
    if header.contains("'fortran_order': True") {
        return Err("Fortran-ordered arrays are not supported".to_string());
    }
    let shape = Regex::new(r"'shape':\s*\(([^)]*)\)")
        .ok()
        .and_then(|re| re.captures(&header).map(|c| c[1].to_string()))
        .ok_or_else(|| "NumPy header has no shape".to_string())?;
    let dims: Vec<usize> = shape
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| format!("bad shape '{}'", shape)))
        .collect::<std::result::Result<_, _>>()?;
    if dims.len() != 1 {
        return Err(format!("expected a 1-D array, got shape ({})", shape));
    }

    let data = &bytes[data_start..];
    if data.len() < dims[0] * 8 {
        return Err(format!(
            "array declares {} values but holds {} bytes",
            dims[0],
            data.len()
        ));
    }
    Ok(data
        .chunks_exact(8)
        .take(dims[0])
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// 生成 VCOV 文件内容（测试用）
#[cfg(test)]
pub(crate) fn encode_olex2_covariance(labels: &[&str], triangle: &[f64]) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        triangle.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"VCOV\n".to_vec();
    bytes.extend(labels.join(" ").as_bytes());
    bytes.push(b'\n');
    bytes.extend(b"\x93NUMPY\x01\x00");
    bytes.extend((header.len() as u16).to_le_bytes());
    bytes.extend(header.as_bytes());
    for value in triangle {
        bytes.extend(value.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_olex2_covariance() {
        let bytes = encode_olex2_covariance(&["C1.x", "C1.y", "C1.u11"], &[4.0, 1.0, 0.5, 9.0, 0.0, 1.0]);
        let cov = parse_olex2_covariance(&bytes, "test.vcov").unwrap();

        assert_eq!(cov.labels(), &["C1.x", "C1.y", "C1.u11"]);
        let m = cov.matrix();
        assert_eq!(m[(0, 0)], 4.0);
        assert_eq!(m[(0, 1)], 1.0);
        assert_eq!(m[(1, 0)], 1.0);
        assert_eq!(m[(2, 0)], 0.5);
        assert_eq!(m[(1, 1)], 9.0);
        assert_eq!(m[(2, 2)], 1.0);
    }

    #[test]
    fn test_rescale_displacements() {
        let bytes = encode_olex2_covariance(&["C1.x", "C1.u11"], &[1.0, 1.0, 1.0]);
        let mut cov = parse_olex2_covariance(&bytes, "test.vcov").unwrap();
        let frame = CoordinateFrame::from_parameters(5.0, 6.0, 7.0, 90.0, 90.0, 90.0).unwrap();
        cov.rescale_displacements(&frame);

        // a* = 1/5，故 u11 缩放 25 倍
        let m = cov.matrix();
        assert!((m[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((m[(0, 1)] - 25.0).abs() < 1e-9);
        assert!((m[(1, 1)] - 625.0).abs() < 1e-9);
    }

    #[test]
    fn test_reject_malformed_files() {
        assert!(parse_olex2_covariance(b"", "a").is_err());
        assert!(parse_olex2_covariance(b"COVV\nC1.x\n", "b").is_err());

        let short = encode_olex2_covariance(&["C1.x", "C1.y"], &[1.0, 2.0]);
        assert!(parse_olex2_covariance(&short, "c").is_err());

        let mut bad_magic = encode_olex2_covariance(&["C1.x"], &[1.0]);
        let offset = "VCOV\nC1.x\n".len();
        bad_magic[offset] = b'X';
        assert!(parse_olex2_covariance(&bad_magic, "d").is_err());
    }
}
