//! # peptide-mapper
//!
//! 基于 FM 索引的肽段 / 序列标签到蛋白质数据库的映射工具。
//!
//! 本 crate 提供：
//!
//! - **索引构建**：从蛋白质 FASTA 构建 FM 索引（后缀数组 + BWT + 采样 SA）
//! - **肽段映射**：精确、模糊氨基酸（B/J/Z/X）以及 I/L 不可区分三种匹配模式
//! - **标签映射**：残基片段与质量缺口交替的序列标签，可选可变修饰
//! - **批处理**：多线程读取查询文件，按行输出 CSV
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use peptide_mapper::index::{Corpus, FmIndex, FmParams};
//! use peptide_mapper::mapper::{FmMapper, PeptideMapper};
//! use peptide_mapper::policy::{MatchingMode, MatchingPolicy};
//!
//! let corpus = Corpus::from_pairs([("P1", &b"MKTAYIAKQRQISFVKSHFSRQ"[..])]).unwrap();
//! let mapper = FmMapper::new(FmIndex::build(corpus, FmParams::default()).unwrap());
//!
//! let policy = MatchingPolicy::new(MatchingMode::Indistinguishable);
//! for hit in mapper.map_peptide(b"AKQRQLSF", &policy).unwrap() {
//!     println!("{} {} {}", hit.accession, hit.start + 1, hit.peptide);
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`]: FASTA 解析与按行读写
//! - [`index`]: 蛋白质语料与 FM 索引（后缀数组、BWT、Occ、采样 SA）
//! - [`policy`]: 匹配模式与残基兼容性
//! - [`query`]: 肽段 / 标签查询行解析
//! - [`mapper`]: FM 索引映射器与暴力扫描映射器
//! - [`driver`]: 多线程批处理与 CSV 输出
//! - [`util`]: 氨基酸编码、残基质量与质量容差

pub mod config;
pub mod driver;
pub mod error;
pub mod index;
pub mod io;
pub mod logging;
pub mod mapper;
pub mod policy;
pub mod query;
pub mod util;

pub use error::{MapError, Result};
