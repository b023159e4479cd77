use std::collections::HashSet;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::io::fasta::FastaReader;
use crate::util::aa;

/// 单个蛋白在拼接文本中的区间 [offset, offset + len)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProteinRange {
    pub accession: String,
    pub offset: u32,
    pub len: u32,
}

/// 拼接后的蛋白库：`P1|P2|...|Pn|`，每个蛋白后跟一个分隔符。
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Corpus {
    text: Vec<u8>,
    proteins: Vec<ProteinRange>,
    accessions: HashSet<String>,
}

impl Corpus {
    /// 文本长度上限：编码后还要追加结束符，且偏移量用 u32 表示。
    pub const MAX_TEXT_LEN: usize = (u32::MAX - 1) as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个蛋白。重复的 accession 或非法残基返回 `MapError::Corpus`。
    pub fn push(&mut self, accession: &str, seq: &[u8]) -> Result<()> {
        if self.accessions.contains(accession) {
            return Err(MapError::Corpus(format!("duplicate accession '{}'", accession)));
        }
        if let Some(&bad) = seq.iter().find(|&&b| !aa::is_residue(b)) {
            return Err(MapError::Corpus(format!(
                "protein '{}' contains invalid residue '{}'",
                accession, bad as char
            )));
        }
        if self.text.len() + seq.len() + 1 > Self::MAX_TEXT_LEN {
            return Err(MapError::Corpus(format!(
                "database exceeds {} residues, the limit of 32-bit offsets",
                Self::MAX_TEXT_LEN
            )));
        }
        let offset = self.text.len() as u32;
        self.text.extend(seq.iter().map(u8::to_ascii_uppercase));
        self.text.push(aa::DELIMITER);
        self.accessions.insert(accession.to_string());
        self.proteins.push(ProteinRange {
            accession: accession.to_string(),
            offset,
            len: seq.len() as u32,
        });
        Ok(())
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut corpus = Self::new();
        for (acc, seq) in pairs {
            corpus.push(acc, seq)?;
        }
        corpus.validate()?;
        Ok(corpus)
    }

    /// 读入 FASTA 流中的全部蛋白，跳过空记录。
    pub fn from_fasta<R: BufRead>(reader: R) -> Result<Self> {
        let mut fasta = FastaReader::new(reader);
        let mut corpus = Self::new();
        while let Some(rec) = fasta.next_record()? {
            if rec.seq.is_empty() {
                log::warn!("skipping protein {} with an empty sequence", rec.accession);
                continue;
            }
            corpus.push(&rec.accession, &rec.seq)?;
        }
        corpus.validate()?;
        Ok(corpus)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.proteins.is_empty() || self.residue_count() == 0 {
            return Err(MapError::Corpus("protein database contains no sequences".to_string()));
        }
        Ok(())
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    pub fn proteins(&self) -> &[ProteinRange] {
        &self.proteins
    }

    pub fn protein(&self, idx: usize) -> &ProteinRange {
        &self.proteins[idx]
    }

    pub fn sequence(&self, idx: usize) -> &[u8] {
        let p = &self.proteins[idx];
        &self.text[p.offset as usize..(p.offset + p.len) as usize]
    }

    pub fn residue_count(&self) -> usize {
        self.text.len() - self.proteins.len()
    }

    /// 将文本位置映射到 (protein_index, protein_offset)。落在分隔符上返回 None。
    pub fn locate_protein(&self, pos: u32) -> Option<(usize, u32)> {
        let idx = self.proteins.partition_point(|p| p.offset <= pos).checked_sub(1)?;
        let p = &self.proteins[idx];
        if pos < p.offset + p.len {
            Some((idx, pos - p.offset))
        } else {
            None
        }
    }

    /// 匹配起点前一个字符；位于蛋白起点时返回分隔符。
    pub fn char_before(&self, pos: u32) -> u8 {
        if pos == 0 {
            return aa::DELIMITER;
        }
        self.text.get(pos as usize - 1).copied().unwrap_or(aa::DELIMITER)
    }

    /// 长度为 `len` 的匹配之后一个字符；越过蛋白末端时返回分隔符。
    pub fn char_after(&self, pos: u32, len: usize) -> u8 {
        self.text.get(pos as usize + len).copied().unwrap_or(aa::DELIMITER)
    }
}
