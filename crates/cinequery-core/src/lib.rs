//! Core library for cinequery, a conversational assistant over a movie and
//! series collection.
//!
//! A question runs through an orchestration loop: a reasoning oracle plans
//! which retrieval tools to use (SQL over catalogued SQLite sources,
//! semantic similarity search, external metadata lookup, open web search),
//! the tools execute concurrently, the oracle evaluates whether the
//! gathered evidence suffices, and either the loop replans or a final
//! answer is synthesized. Every node degrades to a documented safe default,
//! so a turn always completes with an answer.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod nodes;
pub mod oracle;
pub mod prompts;
pub mod state;
pub mod testing;
pub mod tools;

pub use catalog::SchemaCatalog;
pub use config::Config;
pub use engine::{NullProgress, ProgressSink, TurnEngine, TurnPhase};
pub use models::{Decision, EvaluatorVerdict, ExecutionPlan, ResultSet, ToolRequest, ToolResult};
pub use oracle::{OpenAiOracle, Oracle};
pub use state::{ChatMessage, Role, TurnOutcome, TurnState};
pub use tools::{ToolRuntime, Toolbox};
