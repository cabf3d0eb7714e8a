//! The four loop nodes: plan, execute, evaluate, synthesize.
//!
//! Every node degrades to a documented safe default instead of propagating
//! failure, so the orchestration machine has no terminal failure state.

pub mod evaluator;
pub mod executor;
pub mod planner;
pub mod synthesizer;
