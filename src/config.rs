use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::index::FmParams;
use crate::mapper::TagParams;
use crate::policy::{self, MatchingMode, MatchingPolicy};
use crate::util::mass::{Tolerance, VariableModification};

/// 运行配置。每个字段都有默认值，JSON 文件只需写要改的键；命令行参数再覆盖其上。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MapperConfig {
    pub matching: MatchingMode,
    /// 展开候选数超过该值的查询以 `AmbiguityOverflow` 失败
    pub max_candidates: u64,
    /// 候选数不超过该值时逐个展开搜索
    pub cross_product_limit: u64,
    /// 把 `AmbiguityOverflow` 视为致命错误，而不是跳过该查询
    pub fail_on_overflow: bool,
    pub tolerance: Tolerance,
    pub variable_modifications: Vec<VariableModification>,
    pub max_gap_modifications: usize,
    /// worker 每批读取的行数
    pub batch_size: usize,
    pub threads: usize,
    /// 输出 `prefix.PEPTIDE.suffix` 列
    pub flanking: bool,
    pub occ_block: usize,
    pub sa_sample_rate: u32,
}

impl Default for MapperConfig {
    fn default() -> Self {
        let fm = FmParams::default();
        Self {
            matching: MatchingMode::Exact,
            max_candidates: policy::DEFAULT_MAX_CANDIDATES,
            cross_product_limit: policy::DEFAULT_CROSS_PRODUCT_LIMIT,
            fail_on_overflow: false,
            tolerance: Tolerance::default(),
            variable_modifications: Vec::new(),
            max_gap_modifications: 1,
            batch_size: 1000,
            threads: 1,
            flanking: false,
            occ_block: fm.occ_block,
            sa_sample_rate: fm.sa_sample_rate,
        }
    }
}

impl MapperConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(|e| MapError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s).map_err(|e| match e {
            MapError::Config(msg) => MapError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MapError::Config("batch_size must be at least 1".into()));
        }
        if self.threads == 0 {
            return Err(MapError::Config("threads must be at least 1".into()));
        }
        if self.occ_block == 0 || self.sa_sample_rate == 0 {
            return Err(MapError::Config("occ_block and sa_sample_rate must be positive".into()));
        }
        let tol = match self.tolerance {
            Tolerance::Da(v) | Tolerance::Ppm(v) => v,
        };
        if !tol.is_finite() || tol < 0.0 {
            return Err(MapError::Config(format!("invalid mass tolerance {}", tol)));
        }
        for m in &self.variable_modifications {
            if m.residues.is_empty() || !m.residues.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(MapError::Config(format!(
                    "modification '{}' needs one or more target residues",
                    m.name
                )));
            }
            if !m.mass_delta.is_finite() {
                return Err(MapError::Config(format!("modification '{}' has an invalid mass", m.name)));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> MatchingPolicy {
        MatchingPolicy::new(self.matching)
            .with_max_candidates(self.max_candidates)
            .with_cross_product_limit(self.cross_product_limit)
    }

    pub fn tag_params(&self) -> TagParams {
        TagParams {
            tolerance: self.tolerance,
            variable_modifications: self.variable_modifications.clone(),
            max_gap_modifications: self.max_gap_modifications,
        }
    }

    pub fn fm_params(&self) -> FmParams {
        FmParams {
            occ_block: self.occ_block,
            sa_sample_rate: self.sa_sample_rate,
        }
    }
}
