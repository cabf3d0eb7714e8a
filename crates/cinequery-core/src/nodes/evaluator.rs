//! Evaluation node: judge whether the gathered evidence suffices, or force
//! synthesis when the iteration ceiling is reached.

use tracing::{debug, warn};

use crate::models::{Decision, EvaluatorVerdict, ExecutionPlan, ResultSet};
use crate::oracle::Oracle;
use crate::prompts;

/// Confidence reported when the ceiling forces synthesis without an oracle
/// assessment.
pub const CEILING_CONFIDENCE: f64 = 0.5;

/// Assess the cumulative results for the question.
///
/// At `iteration >= ceiling` the verdict is `Continue` without consulting
/// the oracle, so a turn can never loop past its budget. Oracle failure or
/// an unparseable response also yields `Continue`, with zero confidence and
/// the failure as reasoning; replanning on a broken evaluator would burn
/// iterations blindly.
pub async fn evaluate(
    oracle: &dyn Oracle,
    question: &str,
    plan: &ExecutionPlan,
    results: &ResultSet,
    iteration: u32,
    ceiling: u32,
) -> EvaluatorVerdict {
    if iteration >= ceiling {
        debug!(iteration, ceiling, "iteration ceiling reached, forcing synthesis");
        return EvaluatorVerdict {
            decision: Decision::Continue,
            reasoning: format!("Iteration ceiling ({ceiling}) reached, proceeding with available data"),
            confidence: CEILING_CONFIDENCE,
            replan_instructions: None,
        };
    }

    let prompt = prompts::build_evaluator_prompt(question, plan, results);
    let response = match oracle
        .complete_json(prompts::EVALUATOR_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "evaluator oracle call failed, proceeding to synthesis");
            return continue_on_failure(format!("evaluation error: {e}"));
        }
    };

    match EvaluatorVerdict::parse(&response) {
        Ok(verdict) => {
            debug!(
                decision = ?verdict.decision,
                confidence = verdict.confidence,
                "verdict ready"
            );
            verdict
        }
        Err(e) => {
            warn!(error = %e, "evaluator response unparseable, proceeding to synthesis");
            continue_on_failure(format!("evaluation error: {e}"))
        }
    }
}

fn continue_on_failure(reasoning: String) -> EvaluatorVerdict {
    EvaluatorVerdict {
        decision: Decision::Continue,
        reasoning,
        confidence: 0.0,
        replan_instructions: None,
    }
}
