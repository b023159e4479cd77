//! 蛋白库全文索引：拼接文本（[`corpus`]）、后缀数组（[`sa`]）、BWT（[`bwt`]）与 FM 索引（[`fm`]）。

pub mod bwt;
pub mod corpus;
pub mod fm;
pub mod sa;

pub use corpus::{Corpus, ProteinRange};
pub use fm::{FmIndex, FmParams, IndexMeta, SaInterval};
