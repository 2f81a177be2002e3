//! Query-generation mode.
//!
//! Instead of exporting fixed tables, a natural-language question is turned into
//! a single query by an external generator, validated against the workspace,
//! executed, and the results handed to an analyzer.
//!
//! - [`prompt`] - Prompt text, table suggestions and reply parsing
//! - [`validate`] - Client-side and server-side query validation
//! - [`generator`] - The generator and analyzer seams and the `claude` backend
//! - [`session`] - The end-to-end flow

pub mod generator;
pub mod prompt;
pub mod session;
pub mod validate;

pub use generator::{ClaudeCli, GeneratorError, QueryGenerator, ResultAnalyzer, CLAUDE_PROGRAM};
pub use prompt::{extract_query, suggest_tables, AI_KNOWN_TABLES};
pub use session::{display_results, AiReport, AiSession, MAX_ATTEMPTS};
pub use validate::{basic_validation, validate_on_server, QueryValidationError};
