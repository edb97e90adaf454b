//! The language-model oracle boundary.
//!
//! Everything the engine knows about natural language comes through the
//! [`Oracle`] trait as raw text; this crate turns that text into a closed
//! set of typed outcomes. A response that fails to parse is a value
//! (`OracleOutcome::Unparseable`), not an error — downstream code pattern
//! matches instead of catching.

pub mod ollama;
pub mod prompts;
pub mod provider;
pub mod scripted;
pub mod types;

pub use ollama::OllamaOracle;
pub use provider::{Oracle, OracleError, OracleResult};
pub use scripted::ScriptedOracle;
pub use types::{
    parse_response, OracleClassification, OracleOutcome, OraclePlan, OraclePlanStep,
    ServerSelection,
};
