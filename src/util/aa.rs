/// 蛋白字母表：{0:$, 1:|, 2..=27:'A'..='Z'}
/// 0 为全文唯一结束符，1 为蛋白之间的分隔符，两者都不会与查询字符匹配。
pub const SIGMA: usize = 28;

/// 文本结束符编码
pub const SENTINEL: u8 = 0;
/// 蛋白分隔符编码
pub const DELIMITER_CODE: u8 = 1;
/// 蛋白分隔符在明文中的字节
pub const DELIMITER: u8 = b'|';
/// 输出中表示蛋白末端的标记
pub const TERMINUS: char = '-';

/// 20 种标准氨基酸 + 硒代半胱氨酸(U) + 吡咯赖氨酸(O)
pub const STANDARD_RESIDUES: &[u8] = b"ACDEFGHIKLMNOPQRSTUVWY";

#[inline]
pub fn to_alphabet(b: u8) -> u8 {
    match b {
        DELIMITER => DELIMITER_CODE,
        b'A'..=b'Z' => b - b'A' + 2,
        b'a'..=b'z' => b - b'a' + 2,
        _ => SENTINEL,
    }
}

#[inline]
pub fn from_alphabet(a: u8) -> u8 {
    match a {
        SENTINEL => b'$',
        DELIMITER_CODE => DELIMITER,
        2..=27 => a - 2 + b'A',
        _ => b'?',
    }
}

#[inline]
pub fn is_residue(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

/// 单残基单同位素质量（Da）。歧义码（B/J/X/Z）没有确定质量，返回 None。
pub fn residue_mass(residue: u8) -> Option<f64> {
    let m = match residue.to_ascii_uppercase() {
        b'A' => 71.037_113_805,
        b'C' => 103.009_184_505,
        b'D' => 115.026_943_065,
        b'E' => 129.042_593_135,
        b'F' => 147.068_413_945,
        b'G' => 57.021_463_735,
        b'H' => 137.058_911_875,
        b'I' | b'L' => 113.084_064_015,
        b'K' => 128.094_963_050,
        b'M' => 131.040_484_645,
        b'N' => 114.042_927_470,
        b'O' => 237.147_726_925,
        b'P' => 97.052_763_875,
        b'Q' => 128.058_577_540,
        b'R' => 156.101_111_050,
        b'S' => 87.032_028_435,
        b'T' => 101.047_678_505,
        b'U' => 150.953_633_405,
        b'V' => 99.068_413_945,
        b'W' => 186.079_312_980,
        b'Y' => 163.063_328_575,
        _ => return None,
    };
    Some(m)
}

/// 残基串的单同位素质量之和（不含水）
pub fn sequence_mass(seq: &[u8]) -> Option<f64> {
    seq.iter().map(|&b| residue_mass(b)).sum()
}

/// 所有有确定质量的残基中最轻的一个（G），用于质量缺口搜索的剪枝。
pub const MIN_RESIDUE_MASS: f64 = 57.021_463_735;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_round_trip_for_letters_and_delimiter() {
        for b in b'A'..=b'Z' {
            assert_eq!(from_alphabet(to_alphabet(b)), b);
        }
        assert_eq!(to_alphabet(b'k'), to_alphabet(b'K'));
        assert_eq!(to_alphabet(DELIMITER), DELIMITER_CODE);
        assert_eq!(to_alphabet(b'*'), SENTINEL);
        assert!((to_alphabet(b'Z') as usize) < SIGMA);
    }

    #[test]
    fn ambiguity_codes_have_no_mass() {
        for &b in b"BJXZ" {
            assert!(residue_mass(b).is_none());
        }
        for &b in STANDARD_RESIDUES {
            assert!(residue_mass(b).unwrap() >= MIN_RESIDUE_MASS);
        }
    }

    #[test]
    fn sequence_mass_sums_residues() {
        let m = sequence_mass(b"GA").unwrap();
        assert!((m - 128.058_577_54).abs() < 1e-6);
        assert!(sequence_mass(b"GXA").is_none());
    }
}
