//! 肽段与标签到蛋白库的映射。
//!
//! - [`PeptideMapper`]: the mapping contract
//! - [`fm::FmMapper`]: FM-index implementation used in production
//! - [`scan::ScanMapper`]: linear scan over the corpus, kept as a reference

pub mod fm;
pub mod scan;

use crate::error::Result;
use crate::index::Corpus;
use crate::policy::MatchingPolicy;
use crate::query::Tag;
use crate::util::aa;
use crate::util::mass::{Tolerance, VariableModification};

pub use fm::FmMapper;
pub use scan::ScanMapper;

/// 某个位点上质量缺口对应的残基。
#[derive(Debug, Clone, PartialEq)]
pub struct GapResolution {
    /// 标签中写明的缺口目标质量
    pub mass: f64,
    pub residues: String,
}

/// 查询在某个蛋白中的一次出现。
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinMapping {
    pub accession: String,
    pub protein_index: usize,
    /// 0-based offset of the first residue within the protein.
    pub start: u32,
    /// 首个残基在拼接文本中的偏移
    pub text_offset: u32,
    /// 实际匹配到的库中残基
    pub peptide: String,
    /// 按标签顺序的各缺口解析结果，肽段查询为空
    pub gaps: Vec<GapResolution>,
    /// 缺口内放置的可变修饰，形如 `name@position`（从 1 开始）
    pub modifications: Vec<String>,
}

impl ProteinMapping {
    pub(crate) fn new(corpus: &Corpus, text_offset: u32, peptide: String) -> Option<Self> {
        let (protein_index, start) = corpus.locate_protein(text_offset)?;
        Some(Self {
            accession: corpus.protein(protein_index).accession.clone(),
            protein_index,
            start,
            text_offset,
            peptide,
            gaps: Vec::new(),
            modifications: Vec::new(),
        })
    }

    /// 匹配前后的侧翼残基；位于蛋白末端时为 None。
    pub fn flanking(&self, corpus: &Corpus) -> (Option<u8>, Option<u8>) {
        let before = corpus.char_before(self.text_offset);
        let after = corpus.char_after(self.text_offset, self.peptide.len());
        let residue = |b: u8| (b != aa::DELIMITER).then_some(b);
        (residue(before), residue(after))
    }

    /// `prefix.PEPTIDE.suffix`，蛋白末端记为 `-`。
    pub fn flanked_peptide(&self, corpus: &Corpus) -> String {
        let (before, after) = self.flanking(corpus);
        let show = |r: Option<u8>| r.map_or(aa::TERMINUS, char::from);
        format!("{}.{}.{}", show(before), self.peptide, show(after))
    }
}

/// 质量缺口搜索参数
#[derive(Debug, Clone)]
pub struct TagParams {
    pub tolerance: Tolerance,
    pub variable_modifications: Vec<VariableModification>,
    /// 单个缺口内可放置的修饰数上限
    pub max_gap_modifications: usize,
}

impl Default for TagParams {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            variable_modifications: Vec::new(),
            max_gap_modifications: 1,
        }
    }
}

/// 查询到蛋白位置的映射。实现构造后不可变，在各 worker 线程间共享。
pub trait PeptideMapper: Send + Sync {
    fn corpus(&self) -> &Corpus;

    /// `peptide` 的全部出现，按 accession、偏移排序。
    fn map_peptide(&self, peptide: &[u8], policy: &MatchingPolicy) -> Result<Vec<ProteinMapping>>;

    /// 标签所有片段连续对齐的全部位点。无匹配返回空结果而不是错误。
    fn map_tag(&self, tag: &Tag, policy: &MatchingPolicy, params: &TagParams) -> Result<Vec<ProteinMapping>>;
}

/// 统一排序与去重：accession 升序，再按蛋白内偏移、肽段、修饰。
pub(crate) fn finalize(mut hits: Vec<ProteinMapping>) -> Vec<ProteinMapping> {
    hits.sort_by(|a, b| {
        a.accession
            .cmp(&b.accession)
            .then(a.start.cmp(&b.start))
            .then_with(|| a.peptide.cmp(&b.peptide))
            .then_with(|| a.modifications.cmp(&b.modifications))
    });
    hits.dedup_by(|a, b| {
        a.protein_index == b.protein_index
            && a.start == b.start
            && a.peptide == b.peptide
            && a.modifications == b.modifications
    });
    hits
}

pub(crate) fn modification_label(m: &VariableModification, position: usize) -> String {
    format!("{}@{}", m.name, position)
}
