//! Post-processing for a cache of verified peephole rewrite rules.
//!
//! A run loads a cache snapshot, optionally reduces, triages, weakens and
//! merges the rules it holds, and ranks the survivors for reporting. Every
//! semantic judgement is delegated to an external verifier (the
//! [`oracle::Oracle`]); the crate itself only ever edits rule text.

pub mod cache;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod merge;
pub mod oracle;
pub mod pipeline;
pub mod profile;
pub mod rank;
pub mod report;
pub mod rule;
pub mod span;
pub mod tools;
pub mod weaken;

pub use cache::CacheSnapshot;
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{run, Collaborators, Options, Outcome};
pub use rule::Rule;
