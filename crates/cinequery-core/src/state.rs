//! Per-turn mutable state threaded through the orchestration loop.

use serde::{Deserialize, Serialize};

use crate::models::{EvaluatorVerdict, ExecutionPlan, ResultSet};

/// Who said a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of conversation context. Only resolved question/answer pairs
/// persist across turns; tool results do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything one turn accumulates. Created with iteration 0 at turn start
/// and discarded when the turn completes.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub question: String,
    pub history: Vec<ChatMessage>,
    /// Completed planning passes. Strictly increases by one per pass.
    pub iteration: u32,
    /// Hard cap on planning passes; the evaluator forces synthesis at it.
    pub ceiling: u32,
    /// Plan driving the current execution pass.
    pub plan: Option<ExecutionPlan>,
    /// Every plan tried this turn, in order.
    pub plan_history: Vec<ExecutionPlan>,
    /// Cumulative tool results, merged last-write-wins across passes.
    pub results: ResultSet,
    pub verdict: Option<EvaluatorVerdict>,
    /// Refinement instructions from the latest replan verdict.
    pub replan_instructions: Option<String>,
    /// Tools that contributed at least one non-error result this turn.
    pub sources_used: Vec<String>,
}

impl TurnState {
    pub fn new(question: impl Into<String>, history: Vec<ChatMessage>, ceiling: u32) -> Self {
        Self {
            question: question.into(),
            history,
            iteration: 0,
            ceiling,
            plan: None,
            plan_history: Vec::new(),
            results: ResultSet::new(),
            verdict: None,
            replan_instructions: None,
            sources_used: Vec::new(),
        }
    }

    /// True once any planning pass beyond the first begins.
    pub fn is_replanning(&self) -> bool {
        self.iteration > 0
    }
}

/// What a completed turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub sources_used: Vec<String>,
    pub iterations: u32,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_starts_at_iteration_zero() {
        let state = TurnState::new("q", vec![], 2);
        assert_eq!(state.iteration, 0);
        assert!(!state.is_replanning());
        assert!(state.results.is_empty());
        assert!(state.plan_history.is_empty());
    }
}
