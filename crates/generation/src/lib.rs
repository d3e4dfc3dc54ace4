//! Course authoring agents
//!
//! Two LLM-backed generators live here:
//! - [`outline`]: plans a week-by-week roadmap outline as strict JSON, with
//!   validation and bounded repair retries.
//! - [`module_writer`]: writes one week's lesson as Markdown with a fixed
//!   heading skeleton, validated, with a single repair retry.

use thiserror::Error;

pub mod module_writer;
pub mod outline;

pub use module_writer::write_module;
pub use outline::{plan_outline, RoadmapOutline, WeekPlan};

use coursecraft_llm::LlmError;

/// Errors from the authoring agents
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("planner output did not validate after {attempts} attempts. Last error: {last_error}")]
    OutlineRetriesExhausted { attempts: usize, last_error: String },

    #[error("module markdown validation failed after repair: {0}")]
    MarkdownRepairFailed(String),
}

/// Result type for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;
