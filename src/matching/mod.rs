// src/matching/mod.rs

pub mod actors;
pub mod scorer;

pub use actors::AliasTable;
pub use scorer::SimilarityScorer;
