use rayon::prelude::*;

/// 构建后缀数组（前缀倍增法，每轮按 (rank[i], rank[i+k]) 并行排序）。
/// 输入为编码后的文本（0:$, 1:|, 2..:残基），要求以唯一的 0 结尾。
/// 文本长度须小于 u32::MAX，由 `Corpus` 在加载时保证。
pub fn build_sa(text: &[u8]) -> Vec<u32> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }
    let mut sa: Vec<u32> = (0..n as u32).collect();
    let mut rank: Vec<u32> = text.iter().map(|&b| u32::from(b)).collect();
    let mut tmp: Vec<u32> = vec![0; n];

    // 越界后缀的次关键字为 0，真实 rank 从 1 开始
    for r in rank.iter_mut() {
        *r += 1;
    }

    let mut k = 1usize;
    loop {
        let key = |i: u32| -> (u32, u32) {
            let i = i as usize;
            let next = if i + k < n { rank[i + k] } else { 0 };
            (rank[i], next)
        };
        sa.par_sort_unstable_by_key(|&i| key(i));

        tmp[sa[0] as usize] = 1;
        for w in 1..n {
            let (a, b) = (sa[w - 1], sa[w]);
            tmp[b as usize] = tmp[a as usize] + u32::from(key(a) != key(b));
        }
        std::mem::swap(&mut rank, &mut tmp);

        if rank[sa[n - 1] as usize] as usize == n || k >= n {
            break;
        }
        k <<= 1;
    }

    sa
}
