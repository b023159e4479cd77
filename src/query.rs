//! 查询行：普通肽段，以及带质量缺口的序列标签。

use std::fmt;

use crate::error::{MapError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TagSegment {
    /// 大写的残基片段
    Literal(Vec<u8>),
    /// 未鉴定的残基段，只知总质量（Da）
    Gap(f64),
}

/// 部分鉴定的序列：残基片段与质量缺口交替。
/// 非空，且不含相邻的两个缺口。
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    segments: Vec<TagSegment>,
}

impl Tag {
    /// 构造标签，合并相邻的缺口和相邻的片段。
    pub fn new(segments: Vec<TagSegment>) -> Option<Self> {
        let mut merged: Vec<TagSegment> = Vec::with_capacity(segments.len());
        for seg in segments {
            match seg {
                TagSegment::Literal(l) if l.is_empty() => {}
                TagSegment::Gap(g) => {
                    if let Some(TagSegment::Gap(m)) = merged.last_mut() {
                        *m += g;
                    } else {
                        merged.push(TagSegment::Gap(g));
                    }
                }
                TagSegment::Literal(l) => {
                    if let Some(TagSegment::Literal(prev)) = merged.last_mut() {
                        prev.extend_from_slice(&l);
                    } else {
                        merged.push(TagSegment::Literal(l));
                    }
                }
            }
        }
        if merged.is_empty() {
            None
        } else {
            Some(Self { segments: merged })
        }
    }

    pub fn segments(&self) -> &[TagSegment] {
        &self.segments
    }

    /// 所有片段残基按序拼接，用于估算歧义展开预算
    pub fn literal_residues(&self) -> Vec<u8> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                TagSegment::Literal(l) => Some(l.as_slice()),
                TagSegment::Gap(_) => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match seg {
                TagSegment::Literal(l) => f.write_str(&String::from_utf8_lossy(l))?,
                TagSegment::Gap(m) => write!(f, "{}", m)?,
            }
        }
        Ok(())
    }
}

fn syntax_error(line_no: usize, content: &str, reason: impl Into<String>) -> MapError {
    MapError::InputSyntax {
        line: line_no,
        content: content.to_string(),
        reason: reason.into(),
    }
}

/// 解析肽段行：只允许字母，转为大写。空行返回 `None`。
pub fn parse_peptide_line(line: &str, line_no: usize) -> Result<Option<Vec<u8>>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_alphabetic()) {
        return Err(syntax_error(line_no, line, format!("'{}' is not an amino acid", bad)));
    }
    Ok(Some(trimmed.to_ascii_uppercase().into_bytes()))
}

/// 解析标签行：逗号分隔的残基片段和质量。空行返回 `None`。
pub fn parse_tag_line(line: &str, line_no: usize) -> Result<Option<Tag>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let mut segments = Vec::new();
    for token in trimmed.split(',').map(str::trim) {
        if token.is_empty() {
            return Err(syntax_error(line_no, line, "empty tag token"));
        }
        if token.bytes().all(|b| b.is_ascii_alphabetic()) {
            segments.push(TagSegment::Literal(token.to_ascii_uppercase().into_bytes()));
            continue;
        }
        match token.parse::<f64>() {
            Ok(mass) if mass.is_finite() && mass > 0.0 => segments.push(TagSegment::Gap(mass)),
            Ok(_) => return Err(syntax_error(line_no, line, format!("mass gap '{}' must be positive", token))),
            Err(_) => {
                return Err(syntax_error(
                    line_no,
                    line,
                    format!("'{}' is neither an amino acid run nor a mass", token),
                ))
            }
        }
    }
    Tag::new(segments)
        .map(Some)
        .ok_or_else(|| syntax_error(line_no, line, "tag has no segments"))
}
