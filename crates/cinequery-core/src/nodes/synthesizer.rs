//! Synthesis node: turn the cumulative results into a natural-language
//! answer. Always produces a non-empty string.

use tracing::warn;

use crate::models::ResultSet;
use crate::oracle::Oracle;
use crate::prompts;

/// Compose the final answer from whatever evidence the turn gathered.
///
/// Oracle failure yields an apologetic message that carries the error, and
/// a blank oracle answer is replaced, so the caller always receives
/// something presentable.
pub async fn synthesize(
    oracle: &dyn Oracle,
    question: &str,
    results: &ResultSet,
    sources: &[String],
) -> String {
    let prompt = prompts::build_synthesizer_prompt(question, results, sources);

    match oracle
        .complete_text(prompts::SYNTHESIZER_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
        Ok(_) => {
            warn!("synthesizer returned an empty answer");
            "I gathered some data but could not compose an answer from it. Please try rephrasing your question.".to_string()
        }
        Err(e) => {
            warn!(error = %e, "synthesizer oracle call failed");
            format!("I'm sorry, I was unable to compose an answer: {e}. Please try again.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::testing::ScriptedOracle;

    #[tokio::test]
    async fn oracle_answer_is_passed_through_trimmed() {
        let oracle =
            ScriptedOracle::new(vec![], vec![Ok("  There are 42 movies.  ".to_string())]);
        let answer = synthesize(&oracle, "q", &ResultSet::new(), &[]).await;
        assert_eq!(answer, "There are 42 movies.");
    }

    #[tokio::test]
    async fn empty_answer_is_replaced() {
        let oracle = ScriptedOracle::new(vec![], vec![Ok("   ".to_string())]);
        let answer = synthesize(&oracle, "q", &ResultSet::new(), &[]).await;
        assert!(!answer.trim().is_empty());
    }

    #[tokio::test]
    async fn oracle_error_becomes_apologetic_answer() {
        let oracle = ScriptedOracle::new(
            vec![],
            vec![Err(OracleError::Malformed("connection reset".to_string()))],
        );
        let answer = synthesize(&oracle, "q", &ResultSet::new(), &[]).await;
        assert!(!answer.is_empty());
        assert!(answer.contains("connection reset"));
    }
}
