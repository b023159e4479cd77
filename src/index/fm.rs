use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::corpus::Corpus;
use super::{bwt, sa};
use crate::error::Result;
use crate::util::aa;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 索引构建参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FmParams {
    /// Occ 采样间隔（行数）
    pub occ_block: usize,
    /// SA 采样间隔（文本位置），1 表示保存完整 SA
    pub sa_sample_rate: u32,
}

impl Default for FmParams {
    fn default() -> Self {
        Self { occ_block: 64, sa_sample_rate: 8 }
    }
}

/// BWT 行区间 [l, r)，即当前已匹配模式的所有出现。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaInterval {
    pub l: usize,
    pub r: usize,
}

impl SaInterval {
    #[inline]
    pub fn len(&self) -> usize {
        self.r - self.l
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.r <= self.l
    }
}

/// 蛋白库上的 FM 索引：
/// - 字母表见 [`aa::SIGMA`]，0 为唯一结束符，1 为蛋白分隔符；
/// - Occ 按 `occ_block` 行分块采样，块内顺扫补偿；
/// - SA 按文本位置稀疏采样（`sa_sample_rate`），定位时沿 LF 回溯到最近的采样点；
/// - 保留明文库（[`Corpus`]），用于侧翼残基和匹配到的实际残基。
#[derive(Debug, Serialize, Deserialize)]
pub struct FmIndex {
    corpus: Corpus,
    params: FmParams,
    /// C[a] = 文本中编码 < a 的字符数量
    c: Vec<u32>,
    bwt: Vec<u8>,
    /// occ_samples[block_id * SIGMA + a] = BWT[0..block_id*occ_block) 中 a 的个数
    occ_samples: Vec<u32>,
    /// 标记 SA 值被采样的行
    sa_marks: Vec<u64>,
    /// sa_marks 每个字之前的置位数
    sa_mark_rank: Vec<u32>,
    /// 按行顺序存放的采样 SA 值
    sa_samples: Vec<u32>,
    meta: IndexMeta,
}

impl FmIndex {
    /// 从蛋白库构建索引。单线程调用，内部排序使用 rayon 并行。
    pub fn build(corpus: Corpus, params: FmParams) -> Result<Self> {
        corpus.validate()?;
        let params = FmParams {
            occ_block: params.occ_block.max(1),
            sa_sample_rate: params.sa_sample_rate.max(1),
        };
        let started = Instant::now();

        let mut text: Vec<u8> = corpus.text().iter().map(|&b| aa::to_alphabet(b)).collect();
        text.push(aa::SENTINEL);
        let n = text.len();

        let sa_arr = sa::build_sa(&text);
        log::debug!("suffix array: {} rows in {:.2?}", n, started.elapsed());
        let bwt_arr = bwt::build_bwt(&text, &sa_arr);
        drop(text);
        let c = bwt::build_c_table(&bwt_arr, aa::SIGMA);

        // 采样 Occ
        let block = params.occ_block;
        let num_blocks = (n + block - 1) / block;
        let mut occ_samples = vec![0u32; num_blocks * aa::SIGMA];
        let mut running = [0u32; aa::SIGMA];
        for bi in 0..num_blocks {
            occ_samples[bi * aa::SIGMA..(bi + 1) * aa::SIGMA].copy_from_slice(&running);
            let end = ((bi + 1) * block).min(n);
            for &ch in &bwt_arr[bi * block..end] {
                running[ch as usize] += 1;
            }
        }

        // 采样 SA
        let rate = params.sa_sample_rate;
        let words = (n + 63) / 64;
        let mut sa_marks = vec![0u64; words];
        let mut sa_samples = Vec::with_capacity(n / rate as usize + 1);
        for (row, &pos) in sa_arr.iter().enumerate() {
            if pos % rate == 0 {
                sa_marks[row / 64] |= 1u64 << (row % 64);
                sa_samples.push(pos);
            }
        }
        let mut sa_mark_rank = Vec::with_capacity(words);
        let mut acc = 0u32;
        for w in &sa_marks {
            sa_mark_rank.push(acc);
            acc += w.count_ones();
        }
        drop(sa_arr);

        log::info!(
            "FM index built: {} proteins, {} residues, {} SA samples, {:.2?}",
            corpus.proteins().len(),
            corpus.residue_count(),
            sa_samples.len(),
            started.elapsed()
        );

        Ok(Self {
            corpus,
            params,
            c,
            bwt: bwt_arr,
            occ_samples,
            sa_marks,
            sa_mark_rank,
            sa_samples,
            meta: IndexMeta::default(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn params(&self) -> FmParams {
        self.params
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    pub fn len(&self) -> usize {
        self.bwt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bwt.is_empty()
    }

    /// 返回 BWT[0..pos) 中 a 的出现次数
    #[inline]
    pub fn occ(&self, a: u8, pos: usize) -> u32 {
        if pos == 0 {
            return 0;
        }
        let block = self.params.occ_block;
        let bi = (pos - 1) / block; // 所在块编号
        let base = self.occ_samples[bi * aa::SIGMA + a as usize];
        let start = bi * block;
        let add = self.bwt[start..pos].iter().filter(|&&ch| ch == a).count() as u32;
        base + add
    }

    /// 整个 BWT 对应空模式
    #[inline]
    pub fn full_interval(&self) -> SaInterval {
        SaInterval { l: 0, r: self.bwt.len() }
    }

    /// 在当前模式前方扩展一个编码字符，返回新的区间（可能为空）。
    #[inline]
    pub fn extend_front(&self, iv: SaInterval, a: u8) -> SaInterval {
        let c0 = self.c[a as usize] as usize;
        SaInterval {
            l: c0 + self.occ(a, iv.l) as usize,
            r: c0 + self.occ(a, iv.r) as usize,
        }
    }

    /// 反向搜索精确匹配，pat 为编码后的字母表（不应包含 0 或 1）
    pub fn backward_search(&self, pat: &[u8]) -> Option<SaInterval> {
        let mut iv = self.full_interval();
        for &a in pat.iter().rev() {
            iv = self.extend_front(iv, a);
            if iv.is_empty() {
                return None;
            }
        }
        Some(iv)
    }

    #[inline]
    fn is_sampled(&self, row: usize) -> bool {
        (self.sa_marks[row / 64] >> (row % 64)) & 1 == 1
    }

    #[inline]
    fn sample_at(&self, row: usize) -> u32 {
        let w = row / 64;
        let below = self.sa_marks[w] & ((1u64 << (row % 64)) - 1);
        self.sa_samples[(self.sa_mark_rank[w] + below.count_ones()) as usize]
    }

    /// LF 映射：行 row 对应后缀的前一个后缀所在行
    #[inline]
    fn lf(&self, row: usize) -> usize {
        let a = self.bwt[row];
        self.c[a as usize] as usize + self.occ(a, row) as usize
    }

    /// 取回 SA[row]：沿 LF 回溯至采样行，最多 sa_sample_rate - 1 步。
    pub fn locate_row(&self, mut row: usize) -> u32 {
        let mut steps = 0u32;
        while !self.is_sampled(row) {
            row = self.lf(row);
            steps += 1;
        }
        self.sample_at(row) + steps
    }

    /// 区间内所有文本位置，升序
    pub fn interval_positions(&self, iv: SaInterval) -> Vec<u32> {
        let mut out: Vec<u32> = (iv.l..iv.r).map(|row| self.locate_row(row)).collect();
        out.sort_unstable();
        out
    }

    /// 明文模式的全部出现位置（含重叠），升序。空模式或含非残基字符时返回空。
    pub fn locate_exact(&self, pattern: &[u8]) -> Vec<u32> {
        encode_pattern(pattern)
            .and_then(|p| self.backward_search(&p))
            .map(|iv| self.interval_positions(iv))
            .unwrap_or_default()
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let f = std::fs::File::create(path)?;
        let mut w = std::io::BufWriter::new(f);
        bincode::serialize_into(&mut w, self)?;
        Ok(())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path)?;
        let idx: Self = bincode::deserialize_from(std::io::BufReader::new(f))?;
        Ok(idx)
    }
}

/// 明文模式编码为字母表；空模式或含非字母字符返回 None。
pub fn encode_pattern(pattern: &[u8]) -> Option<Vec<u8>> {
    if pattern.is_empty() || !pattern.iter().all(|&b| aa::is_residue(b)) {
        return None;
    }
    Some(pattern.iter().map(|&b| aa::to_alphabet(b)).collect())
}
