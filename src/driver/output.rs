use std::borrow::Cow;

use crate::index::Corpus;
use crate::mapper::ProteinMapping;

/// 字段含逗号、引号或换行时按 CSV 规则加引号。
pub fn csv_field(s: &str) -> Cow<'_, str> {
    if s.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// 一次运行中所有结果行共用的列布局。
#[derive(Debug, Clone, Copy, Default)]
pub struct RowLayout {
    pub flanking: bool,
    pub modifications: bool,
}

impl RowLayout {
    /// `[tag,]peptide[,flanked],accession,start_index[,modifications]`，起点从 1 开始。
    pub fn format(&self, tag: Option<&str>, m: &ProteinMapping, corpus: &Corpus) -> String {
        let mut cols: Vec<Cow<'_, str>> = Vec::with_capacity(6);
        if let Some(t) = tag {
            cols.push(csv_field(t));
        }
        cols.push(Cow::Borrowed(m.peptide.as_str()));
        if self.flanking {
            cols.push(Cow::Owned(m.flanked_peptide(corpus)));
        }
        cols.push(csv_field(&m.accession));
        cols.push(Cow::Owned((m.start + 1).to_string()));
        if self.modifications {
            cols.push(Cow::Owned(csv_field(&m.modifications.join(",")).into_owned()));
        }
        cols.join(",")
    }
}
