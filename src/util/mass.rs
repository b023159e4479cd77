use serde::{Deserialize, Serialize};

use super::aa;

/// 解析标签质量缺口时使用的质量容差。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    /// 绝对窗口，单位 Da
    Da(f64),
    /// 相对窗口，目标质量的 ppm
    Ppm(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Da(0.02)
    }
}

impl Tolerance {
    /// `target` 两侧的 `(lo, hi)` 窗口
    pub fn bounds(&self, target: f64) -> (f64, f64) {
        let delta = match *self {
            Tolerance::Da(da) => da.abs(),
            Tolerance::Ppm(ppm) => target.abs() * ppm.abs() * 1e-6,
        };
        (target - delta, target + delta)
    }

    pub fn contains(&self, target: f64, observed: f64) -> bool {
        let (lo, hi) = self.bounds(target);
        observed >= lo && observed <= hi
    }
}

/// 可出现在质量缺口内某个残基上的可变修饰。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableModification {
    pub name: String,
    /// 可修饰的残基，如 `"M"` 或 `"STY"`
    pub residues: String,
    /// 叠加在残基质量上的质量偏移（Da）
    pub mass_delta: f64,
}

impl VariableModification {
    pub fn targets(&self, residue: u8) -> bool {
        self.residues
            .bytes()
            .any(|r| r.eq_ignore_ascii_case(&residue))
    }
}

/// 库中残基对缺口的一种贡献：原始质量，或带一个修饰后的质量。
#[derive(Debug, Clone, Copy)]
pub struct ResidueOption<'a> {
    pub mass: f64,
    pub modification: Option<&'a VariableModification>,
}

/// 枚举残基在缺口中的所有质量选项：未修饰 + 每个可落在该残基上的可变修饰。
/// 没有确定质量的残基（歧义码）不能出现在缺口中。
pub fn residue_options<'a>(
    residue: u8,
    mods: &'a [VariableModification],
    allow_modified: bool,
) -> Vec<ResidueOption<'a>> {
    let base = match aa::residue_mass(residue) {
        Some(m) => m,
        None => return Vec::new(),
    };
    let mut out = vec![ResidueOption { mass: base, modification: None }];
    if allow_modified {
        for m in mods.iter().filter(|m| m.targets(residue)) {
            out.push(ResidueOption { mass: base + m.mass_delta, modification: Some(m) });
        }
    }
    out
}

/// 任一残基选项的最小质量，用于限定缺口枚举的深度。
pub fn min_option_mass(mods: &[VariableModification]) -> f64 {
    let lightest_mod = mods
        .iter()
        .map(|m| m.mass_delta)
        .fold(0.0_f64, f64::min);
    (aa::MIN_RESIDUE_MASS + lightest_mod).max(f64::EPSILON)
}
