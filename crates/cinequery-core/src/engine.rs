//! The turn orchestration machine.
//!
//! One turn is a loop of plan, execute, evaluate, looping back to planning
//! on a replan verdict, then a single synthesis pass. Every node degrades
//! to a safe default and the evaluator enforces the iteration ceiling, so
//! `run_turn` always completes with an answer.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::SchemaCatalog;
use crate::models::Decision;
use crate::nodes::{evaluator, executor, planner, synthesizer};
use crate::oracle::Oracle;
use crate::state::{ChatMessage, TurnOutcome, TurnState};
use crate::tools::ToolRuntime;

/// Where a running turn currently is. Emitted to the progress sink as each
/// node begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    /// Planning pass about to run (0-based).
    Planning { iteration: u32 },
    /// Tools about to be invoked; empty when the plan selected none.
    Executing { tools: Vec<String> },
    /// Sufficiency check after the given completed pass (1-based).
    Evaluating { iteration: u32 },
    Synthesizing,
    Done,
}

/// Observer for turn progress. All methods have no-op defaults.
pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, _phase: &TurnPhase) {}
}

/// Sink that ignores everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Drives one question through the plan/execute/evaluate/synthesize loop.
pub struct TurnEngine {
    oracle: Arc<dyn Oracle>,
    tools: Arc<dyn ToolRuntime>,
    ceiling: u32,
}

impl TurnEngine {
    /// A ceiling below 1 is clamped to 1; every turn gets at least one full
    /// pass.
    pub fn new(oracle: Arc<dyn Oracle>, tools: Arc<dyn ToolRuntime>, ceiling: u32) -> Self {
        Self {
            oracle,
            tools,
            ceiling: ceiling.max(1),
        }
    }

    /// Answer one question. History is read-only context; the caller owns
    /// appending the new question/answer pair to it afterwards.
    pub async fn run_turn(
        &self,
        question: &str,
        history: Vec<ChatMessage>,
        catalog: &SchemaCatalog,
        progress: &dyn ProgressSink,
    ) -> TurnOutcome {
        let mut state = TurnState::new(question, history, self.ceiling);
        info!(question, ceiling = self.ceiling, "turn started");

        loop {
            progress.on_phase(&TurnPhase::Planning {
                iteration: state.iteration,
            });
            let plan = planner::plan(self.oracle.as_ref(), &state, catalog).await;
            state.iteration += 1;
            state.plan_history.push(plan.clone());

            let tools: Vec<String> = plan
                .tool_requests()
                .iter()
                .map(|r| r.tool_name().to_string())
                .collect();
            progress.on_phase(&TurnPhase::Executing {
                tools: tools.clone(),
            });
            let (merged, contributing) =
                executor::execute(&self.tools, &plan, &state.results).await;
            state.results = merged;
            for tool in contributing {
                if !state.sources_used.contains(&tool) {
                    state.sources_used.push(tool);
                }
            }

            progress.on_phase(&TurnPhase::Evaluating {
                iteration: state.iteration,
            });
            let verdict = evaluator::evaluate(
                self.oracle.as_ref(),
                &state.question,
                &plan,
                &state.results,
                state.iteration,
                state.ceiling,
            )
            .await;
            state.plan = Some(plan);

            let decision = verdict.decision;
            state.replan_instructions = verdict.replan_instructions.clone();
            state.verdict = Some(verdict);

            match decision {
                Decision::Replan => {
                    debug!(iteration = state.iteration, "replanning");
                }
                Decision::Continue => break,
            }
        }

        progress.on_phase(&TurnPhase::Synthesizing);
        let answer = synthesizer::synthesize(
            self.oracle.as_ref(),
            &state.question,
            &state.results,
            &state.sources_used,
        )
        .await;
        progress.on_phase(&TurnPhase::Done);

        let confidence = state
            .verdict
            .as_ref()
            .map(|v| v.confidence)
            .unwrap_or(0.0);
        info!(
            iterations = state.iteration,
            confidence,
            sources = ?state.sources_used,
            "turn completed"
        );

        TurnOutcome {
            answer,
            sources_used: state.sources_used,
            iterations: state.iteration,
            confidence,
        }
    }
}
