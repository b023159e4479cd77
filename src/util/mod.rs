pub mod aa;
pub mod mass;
