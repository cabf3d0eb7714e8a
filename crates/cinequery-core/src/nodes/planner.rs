//! Planning node: ask the oracle which tools to run and with what
//! parameters.

use tracing::{debug, warn};

use crate::catalog::SchemaCatalog;
use crate::models::ExecutionPlan;
use crate::oracle::Oracle;
use crate::prompts;
use crate::state::TurnState;

/// Produce a fresh execution plan.
///
/// Oracle failure or an unparseable response yields the safe default plan
/// (no tools, error text as reasoning, raw question as resolved question)
/// so the loop always has a well-formed plan to execute.
pub async fn plan(
    oracle: &dyn Oracle,
    state: &TurnState,
    catalog: &SchemaCatalog,
) -> ExecutionPlan {
    let prompt = prompts::build_planner_prompt(state, catalog);

    let response = match oracle
        .complete_json(prompts::PLANNER_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "planner oracle call failed, selecting no tools");
            return ExecutionPlan::fallback(&state.question, &format!("planning error: {e}"));
        }
    };

    match ExecutionPlan::parse(&response) {
        Ok(mut plan) => {
            if plan.resolved_question.trim().is_empty() {
                plan.resolved_question = state.question.clone();
            }
            debug!(
                tools = ?plan.tool_requests().iter().map(|r| r.tool_name()).collect::<Vec<_>>(),
                "plan ready"
            );
            plan
        }
        Err(e) => {
            warn!(error = %e, "planner response unparseable, selecting no tools");
            ExecutionPlan::fallback(&state.question, &format!("planning error: {e}"))
        }
    }
}
