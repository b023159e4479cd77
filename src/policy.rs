//! 遍历索引时使用的氨基酸等价规则。
//!
//! 查询残基 `q` 与库中残基 `s` 各自可代表的字面残基集合有交集时即匹配。
//! 该关系对称，库中的歧义码与查询中的歧义码作用相同。

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::util::aa;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchingMode {
    /// Literal string equality.
    #[default]
    Exact,
    /// `X` = any residue, `B` = N/D, `J` = I/L, `Z` = Q/E.
    #[value(alias = "aa-ambiguity")]
    Ambiguity,
    /// As `Ambiguity`, and literal I and L match each other.
    #[value(alias = "il")]
    Indistinguishable,
}

pub const DEFAULT_MAX_CANDIDATES: u64 = 1 << 20;
pub const DEFAULT_CROSS_PRODUCT_LIMIT: u64 = 64;

/// 预计算的匹配表：compat[q] 的第 s 位表示查询残基 q 可以匹配库中残基 s。
#[derive(Debug, Clone)]
pub struct MatchingPolicy {
    mode: MatchingMode,
    max_candidates: u64,
    cross_product_limit: u64,
    compat: [u32; 26],
}

impl MatchingPolicy {
    pub fn new(mode: MatchingMode) -> Self {
        let mut compat = [0u32; 26];
        for q in b'A'..=b'Z' {
            for s in b'A'..=b'Z' {
                let hit = match mode {
                    MatchingMode::Exact => q == s,
                    _ => {
                        let sq = expand_mode(mode, q);
                        expand_mode(mode, s).iter().any(|r| sq.contains(r))
                    }
                };
                if hit {
                    compat[(q - b'A') as usize] |= 1 << (s - b'A');
                }
            }
        }
        Self {
            mode,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            cross_product_limit: DEFAULT_CROSS_PRODUCT_LIMIT,
            compat,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    pub fn with_cross_product_limit(mut self, limit: u64) -> Self {
        self.cross_product_limit = limit;
        self
    }

    pub fn mode(&self) -> MatchingMode {
        self.mode
    }

    pub fn max_candidates(&self) -> u64 {
        self.max_candidates
    }

    pub fn cross_product_limit(&self) -> u64 {
        self.cross_product_limit
    }

    /// 当前模式下 `residue` 可代表的字面残基
    pub fn expand(&self, residue: u8) -> &'static [u8] {
        expand_mode(self.mode, residue.to_ascii_uppercase())
    }

    #[inline]
    pub fn matches(&self, query: u8, subject: u8) -> bool {
        match (letter_index(query), letter_index(subject)) {
            (Some(q), Some(s)) => self.compat[q] >> s & 1 == 1,
            _ => false,
        }
    }

    /// 与 `query` 兼容的库中残基（大写 ASCII），按字母序
    pub fn subject_residues(&self, query: u8) -> SubjectResidues {
        SubjectResidues {
            mask: letter_index(query).map_or(0, |q| self.compat[q]),
        }
    }

    /// 查询可匹配的字面串个数，饱和计算
    pub fn candidate_count(&self, query: &[u8]) -> u64 {
        query.iter().fold(1u64, |acc, &q| {
            let n = letter_index(q).map_or(0, |i| self.compat[i].count_ones());
            acc.saturating_mul(u64::from(n))
        })
    }

    /// 查询超出候选上限时返回 `AmbiguityOverflow`
    pub fn check_budget(&self, query: &[u8]) -> Result<u64> {
        let candidates = self.candidate_count(query);
        if candidates > self.max_candidates {
            return Err(MapError::AmbiguityOverflow {
                query: String::from_utf8_lossy(query).into_owned(),
                candidates,
                limit: self.max_candidates,
            });
        }
        Ok(candidates)
    }

    /// 候选较少时直接枚举字面串再精确搜索，否则在索引上回溯。
    pub fn prefers_cross_product(&self, candidates: u64) -> bool {
        candidates <= self.cross_product_limit
    }

    /// 查询可匹配的全部字面串。调用方需先检查上限，结果共 `candidate_count(query)` 项。
    pub fn literal_expansions(&self, query: &[u8]) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = vec![Vec::with_capacity(query.len())];
        for &q in query {
            let options: Vec<u8> = self.subject_residues(q).collect();
            let mut next = Vec::with_capacity(out.len() * options.len());
            for prefix in &out {
                for &s in &options {
                    let mut cand = prefix.clone();
                    cand.push(s);
                    next.push(cand);
                }
            }
            out = next;
        }
        out
    }
}

/// 遍历兼容掩码中的置位
#[derive(Debug, Clone, Copy)]
pub struct SubjectResidues {
    mask: u32,
}

impl Iterator for SubjectResidues {
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8> {
        if self.mask == 0 {
            return None;
        }
        let bit = self.mask.trailing_zeros();
        self.mask &= self.mask - 1;
        Some(b'A' + bit as u8)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.mask.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SubjectResidues {}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self::new(MatchingMode::Exact)
    }
}

#[inline]
fn letter_index(b: u8) -> Option<usize> {
    let up = b.to_ascii_uppercase();
    up.is_ascii_uppercase().then(|| (up - b'A') as usize)
}

fn expand_mode(mode: MatchingMode, residue: u8) -> &'static [u8] {
    if mode == MatchingMode::Exact {
        return literal(residue);
    }
    match residue {
        b'X' => aa::STANDARD_RESIDUES,
        b'B' => b"ND",
        b'J' => b"IL",
        b'Z' => b"QE",
        b'I' | b'L' if mode == MatchingMode::Indistinguishable => b"IL",
        other => literal(other),
    }
}

fn literal(residue: u8) -> &'static [u8] {
    const LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    match letter_index(residue) {
        Some(i) => &LETTERS[i..i + 1],
        None => &[],
    }
}
