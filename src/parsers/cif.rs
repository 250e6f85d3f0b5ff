//! # CIF 文件解析器
//!
//! 解析 CIF 1.1 格式的数据块：`data_` 块、单值标签、`loop_` 表、
//! 引号与分号界定的文本值、注释。标签与块名不区分大小写。
//!
//! ## 格式示例
//! ```text
//! data_ferrocene
//! _cell_length_a   10.0
//! loop_
//! _atom_site_label
//! _atom_site_fract_x
//! Fe  0.0
//! C1  0.2345(3)
//! ```
//!
//! ## 依赖关系
//! - 被 `parsers/loader.rs` 使用
//! - 无外部模块依赖

use crate::error::{PicometerError, Result};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// 单个数据块
#[derive(Debug, Clone, Default)]
pub struct CifBlock {
    pub name: String,
    items: HashMap<String, Vec<String>>,
}

impl CifBlock {
    fn new(name: &str) -> Self {
        CifBlock {
            name: name.to_string(),
            items: HashMap::new(),
        }
    }

    /// 标签对应的全部值（单值标签长度为 1）
    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.items.get(&tag.to_lowercase()).map(Vec::as_slice)
    }

    /// 标签的第一个值
    pub fn value(&self, tag: &str) -> Option<&str> {
        self.get(tag).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.items.contains_key(&tag.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// CIF 文件
#[derive(Debug, Clone, Default)]
pub struct CifFile {
    pub blocks: Vec<CifBlock>,
}

impl CifFile {
    /// 按名称查找数据块；未指定名称时返回第一个
    pub fn block(&self, name: Option<&str>) -> Option<&CifBlock> {
        match name {
            Some(name) => self
                .blocks
                .iter()
                .find(|b| b.name.eq_ignore_ascii_case(name)),
            None => self.blocks.first(),
        }
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }
}

/// 词法单元；`quoted` 的值不会被当作关键字或标签
#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
    line: usize,
}

impl Token {
    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn keyword(&self) -> Option<&'static str> {
        if self.quoted {
            return None;
        }
        let lower = self.text.to_lowercase();
        if lower.starts_with("data_") {
            Some("data_")
        } else if lower == "loop_" {
            Some("loop_")
        } else if lower.starts_with("save_") {
            Some("save_")
        } else if lower == "global_" {
            Some("global_")
        } else if lower == "stop_" {
            Some("stop_")
        } else {
            None
        }
    }

    fn is_value(&self) -> bool {
        !self.is_tag() && self.keyword().is_none()
    }
}

/// 解析 CIF 文件
pub fn parse_cif_file(path: &Path) -> Result<CifFile> {
    let content = fs::read_to_string(path).map_err(|e| PicometerError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_cif_content(&content, &path.display().to_string())
}

/// 解析 CIF 内容
pub fn parse_cif_content(content: &str, name: &str) -> Result<CifFile> {
    let error = |line: usize, reason: String| PicometerError::ParseError {
        format: "CIF".to_string(),
        path: name.to_string(),
        reason: format!("line {}: {}", line, reason),
    };

    let tokens = tokenize(content).map_err(|(line, reason)| error(line, reason))?;

    let mut file = CifFile::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match token.keyword() {
            Some("data_") => {
                file.blocks.push(CifBlock::new(&token.text[5..]));
                i += 1;
                continue;
            }
            Some("save_") | Some("global_") | Some("stop_") => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let block = file
            .blocks
            .last_mut()
            .ok_or_else(|| error(token.line, "data found before the first data_ block".into()))?;

        if token.keyword() == Some("loop_") {
            i += 1;
            let mut tags = Vec::new();
            while i < tokens.len() && tokens[i].is_tag() {
                tags.push(tokens[i].text.to_lowercase());
                i += 1;
            }
            if tags.is_empty() {
                return Err(error(token.line, "loop_ without tags".into()));
            }
            let mut values = Vec::new();
            while i < tokens.len() && tokens[i].is_value() {
                values.push(tokens[i].text.clone());
                i += 1;
            }
            if values.len() % tags.len() != 0 {
                return Err(error(
                    token.line,
                    format!(
                        "loop with {} tags has {} values, not a whole number of rows",
                        tags.len(),
                        values.len()
                    ),
                ));
            }
            let mut columns: Vec<Vec<String>> = vec![Vec::new(); tags.len()];
            for (k, value) in values.into_iter().enumerate() {
                columns[k % tags.len()].push(value);
            }
            for (tag, column) in tags.into_iter().zip(columns) {
                block.items.insert(tag, column);
            }
        } else if token.is_tag() {
            let value = tokens
                .get(i + 1)
                .filter(|t| t.is_value())
                .ok_or_else(|| error(token.line, format!("tag {} has no value", token.text)))?;
            block
                .items
                .insert(token.text.to_lowercase(), vec![value.text.clone()]);
            i += 2;
        } else {
            return Err(error(
                token.line,
                format!("unexpected value '{}' outside a loop", token.text),
            ));
        }
    }

    if file.blocks.is_empty() {
        return Err(error(0, "no data_ block found".into()));
    }

    Ok(file)
}

fn tokenize(content: &str) -> std::result::Result<Vec<Token>, (usize, String)> {
    let mut tokens = Vec::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let line_no = index + 1;

        // 分号文本字段
        if let Some(first) = line.strip_prefix(';') {
            let mut text = vec![first.to_string()];
            let mut closed = false;
            for (_, next) in lines.by_ref() {
                if next.starts_with(';') {
                    closed = true;
                    break;
                }
                text.push(next.to_string());
            }
            if !closed {
                return Err((line_no, "unterminated text field".to_string()));
            }
            tokens.push(Token {
                text: text.join("\n").trim().to_string(),
                quoted: true,
                line: line_no,
            });
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut pos = 0;
        while pos < chars.len() {
            let c = chars[pos];
            if c.is_whitespace() {
                pos += 1;
                continue;
            }
            if c == '#' {
                break;
            }
            if c == '\'' || c == '"' {
                // 引号仅在其后为空白或行尾时结束
                let start = pos + 1;
                let mut end = start;
                loop {
                    if end >= chars.len() {
                        return Err((line_no, "unterminated quoted value".to_string()));
                    }
                    if chars[end] == c
                        && (end + 1 == chars.len() || chars[end + 1].is_whitespace())
                    {
                        break;
                    }
                    end += 1;
                }
                tokens.push(Token {
                    text: chars[start..end].iter().collect(),
                    quoted: true,
                    line: line_no,
                });
                pos = end + 1;
                continue;
            }
            let start = pos;
            while pos < chars.len() && !chars[pos].is_whitespace() {
                pos += 1;
            }
            tokens.push(Token {
                text: chars[start..pos].iter().collect(),
                quoted: false,
                line: line_no,
            });
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# comment line
data_first
_cell_length_a     10.123(4)
_symmetry_space_group_name_H-M  'P 21/c'
_publ_section_title
;
A multi-line
title
;
loop_
_atom_site_label
_atom_site_fract_x
_atom_site_U_iso_or_equiv
Fe  0.0  0.012(1)
C1  0.2345(3)  ?   # trailing comment
data_SECOND
_Cell_Length_A 5
"#;

    #[test]
    fn test_parse_blocks_and_items() {
        let cif = parse_cif_content(SAMPLE, "sample.cif").unwrap();
        assert_eq!(cif.block_names(), vec!["first", "SECOND"]);

        let block = cif.block(None).unwrap();
        assert_eq!(block.value("_cell_length_a"), Some("10.123(4)"));
        assert_eq!(block.value("_symmetry_space_group_name_H-M"), Some("P 21/c"));
        assert_eq!(block.value("_publ_section_title"), Some("A multi-line\ntitle"));
        assert_eq!(
            block.get("_atom_site_label").unwrap(),
            &["Fe".to_string(), "C1".to_string()]
        );
        assert_eq!(block.get("_atom_site_U_iso_or_equiv").unwrap()[1], "?");
    }

    #[test]
    fn test_block_lookup_is_case_insensitive() {
        let cif = parse_cif_content(SAMPLE, "sample.cif").unwrap();
        let second = cif.block(Some("second")).unwrap();
        assert_eq!(second.value("_cell_length_a"), Some("5"));
        assert!(cif.block(Some("third")).is_none());
    }

    #[test]
    fn test_quotes_inside_values() {
        let cif = parse_cif_content("data_x\n_name 'O'Neil ring'\n", "q.cif").unwrap();
        assert_eq!(cif.blocks[0].value("_name"), Some("O'Neil ring"));
    }

    #[test]
    fn test_malformed_content() {
        assert!(parse_cif_content("_cell_length_a 5\n", "a.cif").is_err());
        assert!(parse_cif_content("data_x\nloop_\n_a\n_b\n1 2 3\n", "b.cif").is_err());
        assert!(parse_cif_content("data_x\n_a\n", "c.cif").is_err());
        assert!(parse_cif_content("data_x\n_a\n;\nnever closed\n", "d.cif").is_err());
        assert!(parse_cif_content("# nothing\n", "e.cif").is_err());
    }
}
