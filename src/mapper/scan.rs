use crate::error::Result;
use crate::index::Corpus;
use crate::policy::MatchingPolicy;
use crate::query::{Tag, TagSegment};
use crate::util::mass::{self, VariableModification};

use super::{finalize, modification_label, GapResolution, PeptideMapper, ProteinMapping, TagParams};

/// 暴力映射器：逐个蛋白、逐个起点比对，O(|库| · |查询|)。
/// 用于小库以及核对 FM 索引的结果。
pub struct ScanMapper {
    corpus: Corpus,
}

impl ScanMapper {
    pub fn new(corpus: Corpus) -> Self {
        Self { corpus }
    }
}

impl PeptideMapper for ScanMapper {
    fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    fn map_peptide(&self, peptide: &[u8], policy: &MatchingPolicy) -> Result<Vec<ProteinMapping>> {
        policy.check_budget(peptide)?;
        let mut hits = Vec::new();
        if peptide.is_empty() {
            return Ok(hits);
        }
        for (pi, protein) in self.corpus.proteins().iter().enumerate() {
            let seq = self.corpus.sequence(pi);
            if seq.len() < peptide.len() {
                continue;
            }
            for start in 0..=seq.len() - peptide.len() {
                let window = &seq[start..start + peptide.len()];
                if peptide.iter().zip(window).all(|(&q, &s)| policy.matches(q, s)) {
                    let text = String::from_utf8_lossy(window).into_owned();
                    if let Some(m) = ProteinMapping::new(&self.corpus, protein.offset + start as u32, text) {
                        hits.push(m);
                    }
                }
            }
        }
        Ok(finalize(hits))
    }

    fn map_tag(&self, tag: &Tag, policy: &MatchingPolicy, params: &TagParams) -> Result<Vec<ProteinMapping>> {
        policy.check_budget(&tag.literal_residues())?;
        let min_step = mass::min_option_mass(&params.variable_modifications);
        let mut hits = Vec::new();
        for (pi, protein) in self.corpus.proteins().iter().enumerate() {
            let seq = self.corpus.sequence(pi);
            for start in 0..seq.len() {
                let mut walk = Walk {
                    seq,
                    start,
                    policy,
                    params,
                    min_step,
                    gaps: Vec::new(),
                    mods: Vec::new(),
                    ends: Vec::new(),
                };
                walk.run(tag.segments());
                for end in walk.ends {
                    let text = String::from_utf8_lossy(&seq[start..end.end]).into_owned();
                    if let Some(mut m) = ProteinMapping::new(&self.corpus, protein.offset + start as u32, text) {
                        m.gaps = end.gaps;
                        m.modifications = end.modifications;
                        hits.push(m);
                    }
                }
            }
        }
        Ok(finalize(hits))
    }
}

struct Completed {
    end: usize,
    gaps: Vec<GapResolution>,
    modifications: Vec<String>,
}

#[derive(Clone, Copy)]
enum Stage {
    /// 下一个待处理片段的下标
    Segment(usize),
    /// 第 `seg` 个缺口从 `gap_start` 开始，已累计 `acc` 质量
    Gap { seg: usize, gap_start: usize, acc: f64, n_mods: usize },
}

enum Step<'a> {
    Plain,
    Modified(usize, &'a VariableModification),
    CloseGap(GapResolution),
}

/// 待展开的分支；`gaps_len` / `mods_len` 为分支点时缓冲区长度
struct Task<'a> {
    stage: Stage,
    pos: usize,
    gaps_len: usize,
    mods_len: usize,
    step: Step<'a>,
}

/// 从一个起点向右的遍历，分支放在显式工作栈上。
struct Walk<'a> {
    seq: &'a [u8],
    start: usize,
    policy: &'a MatchingPolicy,
    params: &'a TagParams,
    min_step: f64,
    gaps: Vec<GapResolution>,
    /// (蛋白内 0 起始位置, 修饰)
    mods: Vec<(usize, &'a VariableModification)>,
    ends: Vec<Completed>,
}

impl<'a> Walk<'a> {
    fn run(&mut self, segs: &[TagSegment]) {
        let mut stack = vec![Task {
            stage: Stage::Segment(0),
            pos: self.start,
            gaps_len: 0,
            mods_len: 0,
            step: Step::Plain,
        }];
        while let Some(task) = stack.pop() {
            self.gaps.truncate(task.gaps_len);
            self.mods.truncate(task.mods_len);
            match task.step {
                Step::Plain => {}
                Step::Modified(pos, m) => self.mods.push((pos, m)),
                Step::CloseGap(g) => self.gaps.push(g),
            }
            self.expand(segs, task.stage, task.pos, &mut stack);
        }
    }

    fn expand(&mut self, segs: &[TagSegment], mut stage: Stage, mut pos: usize, stack: &mut Vec<Task<'a>>) {
        loop {
            match stage {
                Stage::Segment(i) if i == segs.len() => {
                    self.complete(pos);
                    return;
                }
                Stage::Segment(i) => match &segs[i] {
                    TagSegment::Literal(lit) => {
                        let end = pos + lit.len();
                        if end > self.seq.len()
                            || !lit.iter().zip(&self.seq[pos..end]).all(|(&q, &s)| self.policy.matches(q, s))
                        {
                            return;
                        }
                        pos = end;
                        stage = Stage::Segment(i + 1);
                    }
                    TagSegment::Gap(_) => stage = Stage::Gap { seg: i, gap_start: pos, acc: 0.0, n_mods: 0 },
                },
                Stage::Gap { seg, gap_start, acc, n_mods } => {
                    let TagSegment::Gap(target) = segs[seg] else {
                        return;
                    };
                    let tolerance = self.params.tolerance;
                    let (_, hi) = tolerance.bounds(target);
                    let (gaps_len, mods_len) = (self.gaps.len(), self.mods.len());
                    if pos > gap_start && tolerance.contains(target, acc) {
                        let residues = String::from_utf8_lossy(&self.seq[gap_start..pos]).into_owned();
                        stack.push(Task {
                            stage: Stage::Segment(seg + 1),
                            pos,
                            gaps_len,
                            mods_len,
                            step: Step::CloseGap(GapResolution { mass: target, residues }),
                        });
                    }
                    if pos >= self.seq.len() || acc + self.min_step > hi {
                        return;
                    }
                    let params: &'a TagParams = self.params;
                    let allow_mod = n_mods < params.max_gap_modifications;
                    for opt in mass::residue_options(self.seq[pos], &params.variable_modifications, allow_mod) {
                        let total = acc + opt.mass;
                        if total > hi {
                            continue;
                        }
                        let (step, n_mods) = match opt.modification {
                            Some(m) => (Step::Modified(pos, m), n_mods + 1),
                            None => (Step::Plain, n_mods),
                        };
                        stack.push(Task {
                            stage: Stage::Gap { seg, gap_start, acc: total, n_mods },
                            pos: pos + 1,
                            gaps_len,
                            mods_len,
                            step,
                        });
                    }
                    return;
                }
            }
        }
    }

    fn complete(&mut self, end: usize) {
        let start = self.start;
        let mut mods: Vec<(usize, String)> = self
            .mods
            .iter()
            .map(|&(p, m)| (p - start + 1, modification_label(m, p - start + 1)))
            .collect();
        mods.sort();
        self.ends.push(Completed {
            end,
            gaps: self.gaps.clone(),
            modifications: mods.into_iter().map(|(_, l)| l).collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MatchingMode;
    use crate::query::parse_tag_line;
    use crate::util::aa;

    fn scan(pairs: &[(&str, &[u8])]) -> ScanMapper {
        ScanMapper::new(Corpus::from_pairs(pairs.iter().copied()).unwrap())
    }

    #[test]
    fn finds_overlapping_occurrences() {
        let m = scan(&[("P1", b"AAAA"), ("P2", b"KAAK")]);
        let hits = m.map_peptide(b"AA", &MatchingPolicy::default()).unwrap();
        let got: Vec<(&str, u32)> = hits.iter().map(|h| (h.accession.as_str(), h.start)).collect();
        assert_eq!(got, vec![("P1", 0), ("P1", 1), ("P1", 2), ("P2", 1)]);
    }

    #[test]
    fn ambiguity_codes_match_both_directions() {
        let m = scan(&[("P1", b"PEPTIDE"), ("P2", b"PBPTIDE")]);
        let policy = MatchingPolicy::new(MatchingMode::Ambiguity);
        let hits = m.map_peptide(b"PEPTIDE", &policy).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].accession, "P1");
        // B = N|D，与 E 无交集
        let hits = m.map_peptide(b"PNPTIDE", &policy).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].peptide, "PBPTIDE");
    }

    #[test]
    fn tag_gap_does_not_cross_protein_boundary() {
        let m = scan(&[("P1", b"MKTAY"), ("P2", b"IAKQRQ")]);
        let gap = aa::sequence_mass(b"IAK").unwrap();
        let tag = parse_tag_line(&format!("TAY,{}", gap), 1).unwrap().unwrap();
        assert!(m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap().is_empty());

        let tag = parse_tag_line(&format!("{},QRQ", gap), 1).unwrap().unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].accession.as_str(), hits[0].start), ("P2", 0));
        assert_eq!(hits[0].gaps[0].residues, "IAK");
    }

    #[test]
    fn modification_positions_are_relative_to_the_peptide() {
        let m = scan(&[("P1", b"KLMSEK")]);
        let ox = VariableModification { name: "Oxidation".into(), residues: "M".into(), mass_delta: 15.994_915 };
        let params = TagParams { variable_modifications: vec![ox], ..TagParams::default() };
        let gap = aa::sequence_mass(b"LM").unwrap() + 15.994_915;
        let tag = parse_tag_line(&format!("K,{:.4},SEK", gap), 1).unwrap().unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &params).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].peptide, "KLMSEK");
        assert_eq!(hits[0].modifications, vec!["Oxidation@3"]);
    }

    #[test]
    fn long_literal_and_long_gap() {
        let mut x = 3u32;
        let seq: Vec<u8> = (0..12_000)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACDEFGHIKLMNPQRSTVWY"[(x >> 16) as usize % 20]
            })
            .collect();
        let m = scan(&[("P1", &seq[..])]);
        let tag = Tag::new(vec![
            TagSegment::Literal(seq[..5_000].to_vec()),
            TagSegment::Gap(aa::sequence_mass(&seq[5_000..9_000]).unwrap()),
        ])
        .unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].start, 0);
        assert_eq!(hits[0].gaps[0].residues.len(), 4_000);
    }
}
