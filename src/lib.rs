//! debt-guardian library crate
//!
//! Ranks technical-debt findings, proposes fixes and opens guarded fix PRs.
//! The binary is a thin CLI over [`pipeline::Guardian`]; benchmarks use the
//! scoring and ranking paths directly.

pub mod autofix;
pub mod cache;
pub mod config;
pub mod enrich;
pub mod errors;
pub mod fix;
pub mod github;
pub mod interest;
pub mod issue;
pub mod llm;
pub mod pipeline;
pub mod rank;
pub mod report;
pub mod safe_apply;
pub mod score;
pub mod syntax;
pub mod util;
