/// 根据后缀数组构建 BWT：bwt[i] = text[sa[i] - 1]（sa[i] == 0 时取文本末尾的 $）。
pub fn build_bwt(text: &[u8], sa: &[u32]) -> Vec<u8> {
    let n = text.len();
    sa.iter()
        .map(|&p| if p == 0 { text[n - 1] } else { text[p as usize - 1] })
        .collect()
}

/// C 表：c[a] = 文本中编码小于 a 的字符总数，长度为 sigma + 1。
pub fn build_c_table(bwt: &[u8], sigma: usize) -> Vec<u32> {
    let mut c = vec![0u32; sigma + 1];
    for &ch in bwt {
        c[ch as usize + 1] += 1;
    }
    for a in 1..=sigma {
        c[a] += c[a - 1];
    }
    c
}
