use crate::error::Result;
use crate::index::{Corpus, FmIndex, SaInterval};
use crate::policy::MatchingPolicy;
use crate::query::{Tag, TagSegment};
use crate::util::aa;
use crate::util::mass::{self, VariableModification};

use super::{finalize, modification_label, GapResolution, PeptideMapper, ProteinMapping, TagParams};

/// FM 索引上的映射器。所有搜索都从模式右端开始，用 `extend_front` 逐字符向左扩展。
pub struct FmMapper {
    index: FmIndex,
}

impl FmMapper {
    pub fn new(index: FmIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &FmIndex {
        &self.index
    }

    fn emit(&self, iv: SaInterval, peptide: &[u8], out: &mut Vec<ProteinMapping>) {
        let peptide = String::from_utf8_lossy(peptide).into_owned();
        for pos in self.index.interval_positions(iv) {
            if let Some(m) = ProteinMapping::new(self.index.corpus(), pos, peptide.clone()) {
                out.push(m);
            }
        }
    }
}

impl PeptideMapper for FmMapper {
    fn corpus(&self) -> &Corpus {
        self.index.corpus()
    }

    fn map_peptide(&self, peptide: &[u8], policy: &MatchingPolicy) -> Result<Vec<ProteinMapping>> {
        if peptide.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = policy.check_budget(peptide)?;
        let mut hits = Vec::new();
        if policy.prefers_cross_product(candidates) {
            for literal in policy.literal_expansions(peptide) {
                for pos in self.index.locate_exact(&literal) {
                    let text = String::from_utf8_lossy(&literal).into_owned();
                    if let Some(m) = ProteinMapping::new(self.index.corpus(), pos, text) {
                        hits.push(m);
                    }
                }
            }
        } else {
            let segments = [TagSegment::Literal(peptide.to_vec())];
            let params = TagParams::default();
            let mut search = TagSearch::new(self, policy, &params, &segments);
            search.run();
            hits = search.hits;
        }
        Ok(finalize(hits))
    }

    fn map_tag(&self, tag: &Tag, policy: &MatchingPolicy, params: &TagParams) -> Result<Vec<ProteinMapping>> {
        policy.check_budget(&tag.literal_residues())?;
        let mut search = TagSearch::new(self, policy, params, tag.segments());
        search.run();
        log::trace!("tag {} -> {} loci", tag, search.hits.len());
        Ok(finalize(search.hits))
    }
}

/// 已接受的质量缺口：在反向残基缓冲区中的区间 [rev_start, rev_end)
#[derive(Clone, Copy)]
struct GapTrace {
    mass: f64,
    rev_start: usize,
    rev_end: usize,
}

/// 搜索位置
#[derive(Clone, Copy)]
enum State {
    /// 还剩 `remaining` 个片段未处理；0 表示整个 tag 已对齐
    Segment { remaining: usize },
    /// 第 `seg` 个字面片段还有 `left` 个残基待匹配
    Literal { seg: usize, left: usize },
    /// 第 `seg` 个缺口已累计 `acc` 质量
    Gap { seg: usize, acc: f64, n_mods: usize, rev_start: usize },
}

/// 分支点时共享缓冲区的长度
#[derive(Clone, Copy)]
struct Mark {
    rev: usize,
    gaps: usize,
    mods: usize,
}

/// 恢复分支后要追加的一步
#[derive(Clone, Copy)]
enum Step<'a> {
    Start,
    Residue(u8),
    Modified(u8, &'a VariableModification),
    CloseGap(GapTrace),
}

/// 待展开的分支
struct Task<'a> {
    state: State,
    iv: SaInterval,
    mark: Mark,
    step: Step<'a>,
}

/// 从右到左的搜索状态。`rev` 按逆序保存已匹配的库残基。
/// 分支放在显式的工作栈上；只有一个非空扩展时原地推进，不压栈。
struct TagSearch<'a> {
    mapper: &'a FmMapper,
    policy: &'a MatchingPolicy,
    params: &'a TagParams,
    segments: &'a [TagSegment],
    min_step: f64,
    rev: Vec<u8>,
    gaps: Vec<GapTrace>,
    /// (rev 下标, 修饰)
    mods: Vec<(usize, &'a VariableModification)>,
    hits: Vec<ProteinMapping>,
}

impl<'a> TagSearch<'a> {
    fn new(
        mapper: &'a FmMapper,
        policy: &'a MatchingPolicy,
        params: &'a TagParams,
        segments: &'a [TagSegment],
    ) -> Self {
        Self {
            mapper,
            policy,
            params,
            segments,
            min_step: mass::min_option_mass(&params.variable_modifications),
            rev: Vec::new(),
            gaps: Vec::new(),
            mods: Vec::new(),
            hits: Vec::new(),
        }
    }

    fn run(&mut self) {
        let mut stack = vec![Task {
            state: State::Segment { remaining: self.segments.len() },
            iv: self.mapper.index.full_interval(),
            mark: self.mark(),
            step: Step::Start,
        }];
        while let Some(task) = stack.pop() {
            self.restore(task.mark, task.step);
            self.expand(task.state, task.iv, &mut stack);
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            rev: self.rev.len(),
            gaps: self.gaps.len(),
            mods: self.mods.len(),
        }
    }

    fn restore(&mut self, mark: Mark, step: Step<'a>) {
        self.rev.truncate(mark.rev);
        self.gaps.truncate(mark.gaps);
        self.mods.truncate(mark.mods);
        match step {
            Step::Start => {}
            Step::Residue(s) => self.rev.push(s),
            Step::Modified(s, m) => {
                self.rev.push(s);
                self.mods.push((self.rev.len() - 1, m));
            }
            Step::CloseGap(trace) => self.gaps.push(trace),
        }
    }

    /// 从 `state` 推进到下一个分支点，分支压入 `stack`。
    fn expand(&mut self, mut state: State, mut iv: SaInterval, stack: &mut Vec<Task<'a>>) {
        let segments = self.segments;
        loop {
            match state {
                State::Segment { remaining: 0 } => {
                    self.accept(iv);
                    return;
                }
                State::Segment { remaining } => {
                    let seg = remaining - 1;
                    state = match &segments[seg] {
                        TagSegment::Literal(lit) => State::Literal { seg, left: lit.len() },
                        TagSegment::Gap(_) => State::Gap {
                            seg,
                            acc: 0.0,
                            n_mods: 0,
                            rev_start: self.rev.len(),
                        },
                    };
                }
                State::Literal { seg, left: 0 } => state = State::Segment { remaining: seg },
                State::Literal { seg, left } => {
                    let TagSegment::Literal(lit) = &segments[seg] else {
                        return;
                    };
                    let mut ext = [(0u8, iv); 26];
                    let mut n = 0;
                    for s in self.policy.subject_residues(lit[left - 1]) {
                        let next = self.mapper.index.extend_front(iv, aa::to_alphabet(s));
                        if !next.is_empty() {
                            ext[n] = (s, next);
                            n += 1;
                        }
                    }
                    let next_state = State::Literal { seg, left: left - 1 };
                    match n {
                        0 => return,
                        1 => {
                            self.rev.push(ext[0].0);
                            iv = ext[0].1;
                            state = next_state;
                        }
                        _ => {
                            let mark = self.mark();
                            for &(s, next) in &ext[..n] {
                                stack.push(Task { state: next_state, iv: next, mark, step: Step::Residue(s) });
                            }
                            return;
                        }
                    }
                }
                State::Gap { seg, acc, n_mods, rev_start } => {
                    if let TagSegment::Gap(target) = segments[seg] {
                        self.gap(seg, target, iv, acc, n_mods, rev_start, stack);
                    }
                    return;
                }
            }
        }
    }

    /// 缺口的全部后继：在容差内收口，或再向左加一个（可能带修饰的）残基。
    fn gap(
        &mut self,
        seg: usize,
        target: f64,
        iv: SaInterval,
        acc: f64,
        n_mods: usize,
        rev_start: usize,
        stack: &mut Vec<Task<'a>>,
    ) {
        let tolerance = self.params.tolerance;
        let (_, hi) = tolerance.bounds(target);
        let mark = self.mark();
        if self.rev.len() > rev_start && tolerance.contains(target, acc) {
            let trace = GapTrace { mass: target, rev_start, rev_end: self.rev.len() };
            stack.push(Task {
                state: State::Segment { remaining: seg },
                iv,
                mark,
                step: Step::CloseGap(trace),
            });
        }
        if acc + self.min_step > hi {
            return;
        }
        let params: &'a TagParams = self.params;
        let allow_mod = n_mods < params.max_gap_modifications;
        for &s in aa::STANDARD_RESIDUES {
            let next = self.mapper.index.extend_front(iv, aa::to_alphabet(s));
            if next.is_empty() {
                continue;
            }
            for opt in mass::residue_options(s, &params.variable_modifications, allow_mod) {
                let total = acc + opt.mass;
                if total > hi {
                    continue;
                }
                let (step, n_mods) = match opt.modification {
                    Some(m) => (Step::Modified(s, m), n_mods + 1),
                    None => (Step::Residue(s), n_mods),
                };
                stack.push(Task {
                    state: State::Gap { seg, acc: total, n_mods, rev_start },
                    iv: next,
                    mark,
                    step,
                });
            }
        }
    }

    fn accept(&mut self, iv: SaInterval) {
        let len = self.rev.len();
        if len == 0 || iv.is_empty() {
            return;
        }
        let peptide: Vec<u8> = self.rev.iter().rev().copied().collect();
        // rev 下标 k 对应正向下标 len - 1 - k
        let mut gaps: Vec<GapResolution> = self
            .gaps
            .iter()
            .map(|g| GapResolution {
                mass: g.mass,
                residues: String::from_utf8_lossy(&peptide[len - g.rev_end..len - g.rev_start]).into_owned(),
            })
            .collect();
        gaps.reverse();
        let mut mods: Vec<(usize, String)> = self
            .mods
            .iter()
            .map(|&(k, m)| (len - k, modification_label(m, len - k)))
            .collect();
        mods.sort();
        let modifications: Vec<String> = mods.into_iter().map(|(_, label)| label).collect();

        let mut found = Vec::new();
        self.mapper.emit(iv, &peptide, &mut found);
        for mut m in found {
            m.gaps = gaps.clone();
            m.modifications = modifications.clone();
            self.hits.push(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FmParams;
    use crate::policy::MatchingMode;
    use crate::query::parse_tag_line;
    use crate::util::mass::Tolerance;

    fn mapper(pairs: &[(&str, &[u8])]) -> FmMapper {
        let corpus = Corpus::from_pairs(pairs.iter().copied()).unwrap();
        FmMapper::new(FmIndex::build(corpus, FmParams { occ_block: 8, sa_sample_rate: 4 }).unwrap())
    }

    fn random_protein(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                aa::STANDARD_RESIDUES[(x >> 16) as usize % 20]
            })
            .collect()
    }

    fn starts(hits: &[ProteinMapping]) -> Vec<(&str, u32)> {
        hits.iter().map(|m| (m.accession.as_str(), m.start)).collect()
    }

    #[test]
    fn verbatim_peptide_maps_back() {
        let m = mapper(&[("P1", b"MKTAYIAKQRQISFVK"), ("P2", b"AKQRQ")]);
        let policy = MatchingPolicy::new(MatchingMode::Exact);
        let hits = m.map_peptide(b"AKQRQ", &policy).unwrap();
        assert_eq!(starts(&hits), vec![("P1", 6), ("P2", 0)]);
        assert_eq!(hits[0].peptide, "AKQRQ");
        assert!(m.map_peptide(b"AKQRW", &policy).unwrap().is_empty());
    }

    #[test]
    fn cross_product_and_backtracking_agree() {
        let m = mapper(&[("P1", b"PEPTIDEKPEPTLDEKPXPTIDE"), ("P2", b"BEPTIDE")]);
        let backtrack = MatchingPolicy::new(MatchingMode::Indistinguishable).with_cross_product_limit(0);
        let expand = MatchingPolicy::new(MatchingMode::Indistinguishable).with_cross_product_limit(u64::MAX);
        for q in [&b"PEPTIDE"[..], b"PXPTJDE", b"BEPTIDE", b"XEPTLDE"] {
            let a = m.map_peptide(q, &backtrack).unwrap();
            let b = m.map_peptide(q, &expand).unwrap();
            assert_eq!(a, b, "query {:?}", String::from_utf8_lossy(q));
        }
        let hits = m.map_peptide(b"PEPTIDE", &backtrack).unwrap();
        assert_eq!(starts(&hits), vec![("P1", 0), ("P1", 8), ("P1", 16)]);
        assert_eq!(hits[1].peptide, "PEPTLDE");
        assert_eq!(hits[2].peptide, "PXPTIDE");
    }

    #[test]
    fn single_substitution_never_matches() {
        let m = mapper(&[("P1", b"AAATESTLKTETTAAA")]);
        for mode in [MatchingMode::Exact, MatchingMode::Ambiguity, MatchingMode::Indistinguishable] {
            let policy = MatchingPolicy::new(mode);
            assert!(m.map_peptide(b"TESTIKTEST", &policy).unwrap().is_empty(), "{:?}", mode);
        }
    }

    #[test]
    fn tag_with_gap_resolves_middle_residues() {
        let m = mapper(&[("P1", b"MKTAYIAKQRQISFVK")]);
        let gap = aa::sequence_mass(b"IAK").unwrap();
        let tag = parse_tag_line(&format!("TAY,{},QRQ", gap), 1).unwrap().unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        assert_eq!(starts(&hits), vec![("P1", 2)]);
        assert_eq!(hits[0].peptide, "TAYIAKQRQ");
        assert_eq!(hits[0].gaps, vec![GapResolution { mass: gap, residues: "IAK".into() }]);
    }

    #[test]
    fn tag_gaps_at_both_ends() {
        let m = mapper(&[("P1", b"GGKPEPTIDEAR")]);
        let lead = aa::sequence_mass(b"GK").unwrap();
        let trail = aa::sequence_mass(b"AR").unwrap();
        let tag = parse_tag_line(&format!("{},PEPTIDE,{}", lead, trail), 1).unwrap().unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        // GK 与 KG 质量相同，但库中只有 GK
        assert_eq!(starts(&hits), vec![("P1", 1)]);
        assert_eq!(hits[0].gaps[0].residues, "GK");
        assert_eq!(hits[0].gaps[1].residues, "AR");
    }

    #[test]
    fn gap_may_carry_a_variable_modification() {
        let m = mapper(&[("P1", b"KLMSEK")]);
        let ox = VariableModification { name: "Oxidation".into(), residues: "M".into(), mass_delta: 15.994_915 };
        let gap = aa::sequence_mass(b"MS").unwrap() + ox.mass_delta;
        let tag = parse_tag_line(&format!("KL,{},EK", gap), 1).unwrap().unwrap();
        let plain = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        assert!(plain.is_empty());
        let params = TagParams {
            tolerance: Tolerance::Da(0.01),
            variable_modifications: vec![ox],
            max_gap_modifications: 1,
        };
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &params).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].modifications, vec!["Oxidation@3".to_string()]);
    }

    #[test]
    fn overflowing_query_is_rejected() {
        let m = mapper(&[("P1", b"MKTAYIAK")]);
        let policy = MatchingPolicy::new(MatchingMode::Ambiguity).with_max_candidates(100);
        assert!(m.map_peptide(b"XXK", &policy).is_err());
        assert!(m.map_peptide(b"XK", &policy).is_ok());
    }

    #[test]
    fn protein_length_literal_is_extended_in_place() {
        let seq = random_protein(40_000, 7);
        let m = mapper(&[("TITIN", &seq[..])]);
        let tag = Tag::new(vec![
            TagSegment::Literal(seq[10..30_010].to_vec()),
            TagSegment::Gap(aa::residue_mass(seq[30_010]).unwrap()),
        ])
        .unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::new(MatchingMode::Indistinguishable), &TagParams::default()).unwrap();
        assert_eq!(starts(&hits), vec![("TITIN", 10)]);
        assert_eq!(hits[0].peptide.len(), 30_001);
    }

    #[test]
    fn gap_spanning_thousands_of_residues() {
        let seq = random_protein(6_000, 11);
        let m = mapper(&[("P1", &seq[..])]);
        let tag = Tag::new(vec![
            TagSegment::Gap(aa::sequence_mass(&seq[5..3_005]).unwrap()),
            TagSegment::Literal(seq[3_005..3_100].to_vec()),
        ])
        .unwrap();
        let hits = m.map_tag(&tag, &MatchingPolicy::default(), &TagParams::default()).unwrap();
        assert_eq!(starts(&hits), vec![("P1", 5)]);
        assert_eq!(hits[0].gaps[0].residues.len(), 3_000);
    }
}
