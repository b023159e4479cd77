pub mod fasta;
pub mod lines;
