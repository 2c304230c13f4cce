#![forbid(unsafe_code)]

//! # goldset-harness
//!
//! Builds a human-verified "gold" reference dataset for an LLM normalization
//! oracle and measures how good that oracle actually is.
//!
//! The oracle maps a raw free-text string — an institutional affiliation or a
//! postal address — to a structured canonical value. A human operator reviews
//! every machine output in a resumable, checkpoint-as-you-go session; the
//! resulting labeled records feed an accuracy/error-rate computation, an audit
//! export of everything the oracle got wrong, and a consistency pass that
//! re-invokes the oracle repeatedly at temperature 0 to quantify how
//! non-deterministic "deterministic" sampling really is.
//!
//! The corpus extraction that produces the raw input CSV and the hosted model
//! behind the oracle are external collaborators; this crate owns the
//! validation protocol and the statistics.

pub mod checkpoint;
pub mod consistency;
pub mod corpus;
pub mod export;
pub mod gateway;
pub mod oracle;
pub mod prompts;
pub mod session;
pub mod stats;

pub use checkpoint::{CheckpointStore, Label, StoreError, ValidationRecord};
pub use consistency::{
    run_consistency_check, ConsistencyConfig, ConsistencySample, ConsistencySummary,
};
pub use corpus::{load_corpus, CorpusError, CorpusItem, NormalizationKind};
pub use gateway::{ChatGateway, ProviderError, ProviderGateway};
pub use oracle::{LiveOracle, NormalizationOracle, NormalizedValue, OracleOutcome};
pub use session::{
    Console, PromptReply, SessionConfig, SessionError, SessionOutcome, ValidationSession,
};
pub use stats::{compute_stats, render_report, ValidationStats};
