//! 在生成的蛋白库上对照 FM 映射器与线性扫描映射器。

use peptide_mapper::index::{Corpus, FmIndex, FmParams};
use peptide_mapper::mapper::{FmMapper, PeptideMapper, ProteinMapping, ScanMapper, TagParams};
use peptide_mapper::policy::{MatchingMode, MatchingPolicy};
use peptide_mapper::query::{parse_tag_line, Tag};
use peptide_mapper::util::aa;
use peptide_mapper::MapError;

const RESIDUES: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> usize {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.0 >> 16) as usize
    }

    fn pick(&mut self, alphabet: &[u8]) -> u8 {
        alphabet[self.next() % alphabet.len()]
    }
}

fn make_corpus(seed: u32, proteins: usize, len: usize) -> Vec<(String, Vec<u8>)> {
    let mut rng = Lcg(seed);
    (0..proteins)
        .map(|i| {
            let n = len / 2 + rng.next() % len;
            let mut seq: Vec<u8> = (0..n).map(|_| rng.pick(RESIDUES)).collect();
            // 偶尔混入 I/L 互换和模糊残基，覆盖各匹配模式
            if i % 3 == 0 && n > 10 {
                seq[n / 2] = b'X';
                seq[n / 3] = b'B';
            }
            (format!("PROT{:03}", i), seq)
        })
        .collect()
}

fn mappers(pairs: &[(String, Vec<u8>)], params: FmParams) -> (FmMapper, ScanMapper) {
    let corpus = Corpus::from_pairs(pairs.iter().map(|(a, s)| (a.as_str(), s.as_slice()))).unwrap();
    let fm = FmMapper::new(FmIndex::build(corpus.clone(), params).unwrap());
    (fm, ScanMapper::new(corpus))
}

fn keys(hits: &[ProteinMapping]) -> Vec<(String, u32, String, Vec<String>)> {
    hits.iter()
        .map(|h| (h.accession.clone(), h.start, h.peptide.clone(), h.modifications.clone()))
        .collect()
}

#[test]
fn peptides_agree_with_linear_scan_in_every_mode() {
    let db = make_corpus(7, 30, 80);
    let (fm, scan) = mappers(&db, FmParams { occ_block: 16, sa_sample_rate: 4 });
    let mut rng = Lcg(99);
    for round in 0..200 {
        let (_, seq) = &db[rng.next() % db.len()];
        let k = 3 + rng.next() % 6;
        let start = rng.next() % (seq.len() - k);
        let mut query = seq[start..start + k].to_vec();
        match round % 4 {
            1 => query[0] = b'X',
            2 => query.iter_mut().filter(|r| **r == b'I').for_each(|r| *r = b'L'),
            3 => query[k - 1] = rng.pick(RESIDUES),
            _ => {}
        }
        for mode in [MatchingMode::Exact, MatchingMode::Ambiguity, MatchingMode::Indistinguishable] {
            for limit in [0, 64] {
                let policy = MatchingPolicy::new(mode).with_cross_product_limit(limit);
                let a = fm.map_peptide(&query, &policy).unwrap();
                let b = scan.map_peptide(&query, &policy).unwrap();
                assert_eq!(keys(&a), keys(&b), "query {} mode {:?}", String::from_utf8_lossy(&query), mode);
            }
        }
    }
}

#[test]
fn every_substring_maps_back_to_its_origin() {
    let db = make_corpus(3, 12, 60);
    let (fm, _) = mappers(&db, FmParams::default());
    let policy = MatchingPolicy::default();
    for (acc, seq) in &db {
        for start in (0..seq.len().saturating_sub(6)).step_by(5) {
            let query = &seq[start..start + 6];
            let hits = fm.map_peptide(query, &policy).unwrap();
            assert!(
                hits.iter().any(|h| &h.accession == acc && h.start as usize == start),
                "{} @ {} not found",
                acc,
                start
            );
            for h in &hits {
                assert_eq!(h.peptide.as_bytes(), query);
            }
        }
    }
}

/// 把一段子串的中间部分替换为其质量，标签应映射回原位置。
fn tag_from_substring(seq: &[u8], start: usize, lead: usize, gap: usize, tail: usize) -> Option<Tag> {
    let lit1 = &seq[start..start + lead];
    let mid = &seq[start + lead..start + lead + gap];
    let lit2 = &seq[start + lead + gap..start + lead + gap + tail];
    let mass = aa::sequence_mass(mid)?;
    let line = format!(
        "{},{:.6},{}",
        String::from_utf8_lossy(lit1),
        mass,
        String::from_utf8_lossy(lit2)
    );
    parse_tag_line(&line, 1).unwrap()
}

#[test]
fn tags_map_back_and_agree_with_linear_scan() {
    let db = make_corpus(11, 10, 50);
    let (fm, scan) = mappers(&db, FmParams { occ_block: 32, sa_sample_rate: 3 });
    let policy = MatchingPolicy::default();
    let params = TagParams::default();
    let mut rng = Lcg(5);
    let mut checked = 0;
    for _ in 0..60 {
        let pi = rng.next() % db.len();
        let (acc, seq) = &db[pi];
        let (lead, gap, tail) = (2 + rng.next() % 2, 1 + rng.next() % 3, 2);
        let total = lead + gap + tail;
        let start = rng.next() % (seq.len() - total);
        let Some(tag) = tag_from_substring(seq, start, lead, gap, tail) else {
            continue;
        };
        let a = fm.map_tag(&tag, &policy, &params).unwrap();
        let b = scan.map_tag(&tag, &policy, &params).unwrap();
        assert_eq!(keys(&a), keys(&b), "tag {}", tag);
        assert!(
            a.iter().any(|h| &h.accession == acc && h.start as usize == start),
            "tag {} lost its origin {}@{}",
            tag,
            acc,
            start
        );
        checked += 1;
    }
    assert!(checked > 30);
}

#[test]
fn leading_and_trailing_gaps_agree_with_linear_scan() {
    let db = make_corpus(21, 6, 40);
    let (fm, scan) = mappers(&db, FmParams::default());
    let policy = MatchingPolicy::new(MatchingMode::Indistinguishable);
    let params = TagParams::default();
    let (_, seq) = &db[2];
    let head = aa::sequence_mass(&seq[4..6]).unwrap();
    let tail = aa::sequence_mass(&seq[9..11]).unwrap();
    let line = format!("{:.5},{},{:.5}", head, String::from_utf8_lossy(&seq[6..9]), tail);
    let tag = parse_tag_line(&line, 1).unwrap().unwrap();
    let a = fm.map_tag(&tag, &policy, &params).unwrap();
    let b = scan.map_tag(&tag, &policy, &params).unwrap();
    assert_eq!(keys(&a), keys(&b));
    assert!(a.iter().any(|h| h.accession == "PROT002" && h.start == 4));
}

#[test]
fn overflow_is_reported_before_any_search() {
    let db = make_corpus(1, 3, 30);
    let (fm, scan) = mappers(&db, FmParams::default());
    let policy = MatchingPolicy::new(MatchingMode::Ambiguity).with_max_candidates(1000);
    for m in [&fm as &dyn PeptideMapper, &scan as &dyn PeptideMapper] {
        match m.map_peptide(b"XXXK", &policy) {
            Err(MapError::AmbiguityOverflow { candidates, limit, .. }) => {
                assert!(candidates > limit);
                assert_eq!(limit, 1000);
            }
            other => panic!("expected overflow, got {:?}", other.map(|h| h.len())),
        }
    }
}

#[test]
fn persisted_index_maps_like_the_fresh_one() {
    let db = make_corpus(17, 8, 40);
    let (fm, _) = mappers(&db, FmParams { occ_block: 8, sa_sample_rate: 5 });
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.pmi");
    let path = path.to_str().unwrap();
    fm.index().save_to_file(path).unwrap();
    let loaded = FmMapper::new(FmIndex::load_from_file(path).unwrap());

    let policy = MatchingPolicy::new(MatchingMode::Ambiguity);
    let (_, seq) = &db[5];
    for k in [3, 5, 8] {
        let query = &seq[1..1 + k];
        assert_eq!(fm.map_peptide(query, &policy).unwrap(), loaded.map_peptide(query, &policy).unwrap());
    }
    assert_eq!(loaded.index().params(), FmParams { occ_block: 8, sa_sample_rate: 5 });
}
