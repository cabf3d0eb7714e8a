//! Prompt construction for the three oracle request shapes.
//!
//! Cumulative results are serialized under fixed character budgets with a
//! visible truncation marker, so the oracle can tell when it is looking at
//! a prefix. Replanning context summarizes prior results as per-tool sizes
//! instead of raw payloads; the summarization strategy is a tunable, the
//! size bound is not.

use serde_json::json;

use crate::catalog::SchemaCatalog;
use crate::models::{ExecutionPlan, ResultSet};
use crate::state::TurnState;

/// Character budget for result serialization in the evaluator prompt.
pub const EVALUATOR_RESULT_BUDGET: usize = 2000;
/// Character budget for result serialization in the synthesizer prompt.
pub const SYNTHESIZER_RESULT_BUDGET: usize = 3000;
/// How many trailing history messages the planner sees.
pub const HISTORY_WINDOW: usize = 5;
/// Per-message content clip in the rendered history.
pub const HISTORY_CLIP: usize = 200;

pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a planning agent that decides which retrieval tools to use to answer a user's question about a movie and series collection. Respond with a single JSON object and nothing else.";

pub const EVALUATOR_SYSTEM_PROMPT: &str = "You are an evaluation agent that decides whether gathered evidence suffices to answer a question. Respond with a single JSON object and nothing else.";

pub const SYNTHESIZER_SYSTEM_PROMPT: &str = "You are a helpful assistant that synthesizes information from multiple retrieval sources into a clear, natural answer.";

/// Planner request: question, history window, catalog, and on replanning
/// passes the prior plans, a size summary of prior results, and the
/// evaluator's refinement instructions.
pub fn build_planner_prompt(state: &TurnState, catalog: &SchemaCatalog) -> String {
    let mut prompt = format!(
        r#"CURRENT QUESTION: "{question}"

CONVERSATION HISTORY (last {window} messages):
{history}

{catalog}

AVAILABLE TOOLS:
1. sql - structured queries over the catalogued sources (filter by year, type, rating; counting; aggregation)
2. semantic - plot/theme similarity search over title descriptions
3. metadata - detailed metadata lookup for one specific title (actors, awards, full plot, poster)
4. web - open web search, only for current events and trending topics
"#,
        question = state.question,
        window = HISTORY_WINDOW,
        history = render_history(state),
        catalog = catalog.render_for_prompt(),
    );

    if state.is_replanning() {
        let instructions = state.replan_instructions.as_deref().unwrap_or("");
        prompt.push_str(&format!(
            r#"
REPLANNING CONTEXT:
The previous attempt was insufficient. New instructions: {instructions}

Previous plan(s):
{plans}

Previous results summary:
{results}
"#,
            plans = serde_json::to_string_pretty(&state.plan_history)
                .unwrap_or_else(|_| "[]".to_string()),
            results = summarize_results(&state.results),
        ));
    }

    prompt.push_str(
        r#"
YOUR TASK:
1. Analyze the question and decide which tools are needed
2. Prepare a specific query for every selected tool
3. Resolve references from the conversation history

Respond with exactly this JSON shape:
{"use_sql": bool, "use_semantic": bool, "use_metadata": bool, "use_web": bool,
 "sql_query": string or null, "sql_source": string or null,
 "semantic_query": string or null, "semantic_limit": int,
 "metadata_title": string or null,
 "web_query": string or null, "web_limit": int,
 "reasoning": string, "resolved_question": string}

TOOL SELECTION GUIDELINES:
- sql: filtering, counting, aggregating over catalogued columns; queries MUST use exact table and column names from the catalog above
- semantic: plot-based search, "movies like X", theme matching; the query MUST be a descriptive sentence, not a keyword
- metadata: detail about one specific title beyond the catalogued fields
- web: ONLY for "latest", "trending", "news" style questions
- Do not select multiple tools when one is sufficient
"#,
    );

    prompt
}

/// Sufficiency request: question, the plan just executed, and a size-bounded
/// serialization of the cumulative results.
pub fn build_evaluator_prompt(
    question: &str,
    plan: &ExecutionPlan,
    results: &ResultSet,
) -> String {
    format!(
        r#"ORIGINAL QUESTION: "{question}"

EXECUTION PLAN:
{plan}

TOOL RESULTS:
{results}

YOUR TASK:
Decide whether the gathered data is sufficient to answer the question completely and accurately.

Decide "continue" when the question can be fully addressed with the data above and the data quality is good.
Decide "replan" when critical information is missing, tools returned errors or empty results, or different tools would serve the question better.

Respond with exactly this JSON shape:
{{"decision": "continue" or "replan", "reasoning": string, "replan_instructions": string or null, "confidence": number between 0.0 and 1.0}}
"#,
        plan = serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string()),
        results = render_results(results, EVALUATOR_RESULT_BUDGET),
    )
}

/// Synthesis request: question, size-bounded cumulative results, and the
/// tools that contributed.
pub fn build_synthesizer_prompt(question: &str, results: &ResultSet, sources: &[String]) -> String {
    let sources = if sources.is_empty() {
        "None".to_string()
    } else {
        sources.join(", ")
    };
    format!(
        r#"USER QUESTION: "{question}"

AVAILABLE DATA:
{results}

SOURCES USED: {sources}

YOUR TASK:
Write a natural, helpful response that directly answers the question, integrates the available data, and acknowledges limitations when data is missing or marked as an error. Do not dump raw data and do not invent information that is not in the results.
"#,
        results = render_results(results, SYNTHESIZER_RESULT_BUDGET),
    )
}

/// Serialize results and truncate to `budget` characters, keeping the head
/// and appending a visible marker when anything was cut.
pub fn render_results(results: &ResultSet, budget: usize) -> String {
    let serialized =
        serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string());
    truncate_with_marker(&serialized, budget)
}

/// Per-tool size summary used as replanning context. Deliberately lossy:
/// the planner needs to know what was already tried and how much came back,
/// not the payloads themselves.
pub fn summarize_results(results: &ResultSet) -> String {
    let summary: serde_json::Map<String, serde_json::Value> = results
        .iter()
        .map(|(tool, result)| {
            let description = match (&result.payload, &result.error) {
                (Some(payload), _) => {
                    json!(format!("{} chars", payload.to_string().len()))
                }
                (None, Some(error)) => json!(format!("error: {error}")),
                (None, None) => json!("empty"),
            };
            (tool.clone(), description)
        })
        .collect();
    serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
}

/// Truncate to `budget` characters on a char boundary, appending the marker
/// when anything was removed.
pub fn truncate_with_marker(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        None => text.to_string(),
        Some((byte_index, _)) => {
            let mut truncated = text[..byte_index].to_string();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }
}

fn render_history(state: &TurnState) -> String {
    let window = state
        .history
        .iter()
        .rev()
        .take(HISTORY_WINDOW)
        .rev()
        .map(|message| {
            json!({
                "role": message.role,
                "content": truncate_with_marker(&message.content, HISTORY_CLIP),
            })
        })
        .collect::<Vec<_>>();
    serde_json::to_string_pretty(&window).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolResult;
    use crate::state::ChatMessage;
    use std::path::Path;

    fn result_set(entries: &[(&str, ToolResult)]) -> ResultSet {
        entries
            .iter()
            .map(|(name, result)| (name.to_string(), result.clone()))
            .collect()
    }

    #[test]
    fn truncate_short_text_is_identity() {
        assert_eq!(truncate_with_marker("abc", 10), "abc");
        assert_eq!(truncate_with_marker("abc", 3), "abc");
    }

    #[test]
    fn truncate_long_text_keeps_head_and_marks_cut() {
        let text = "x".repeat(50);
        let truncated = truncate_with_marker(&text, 10);
        assert!(truncated.starts_with("xxxxxxxxxx"));
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld".repeat(10);
        let truncated = truncate_with_marker(&text, 7);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        // Must not panic and must keep exactly 7 chars before the marker.
        let head = truncated.trim_end_matches(TRUNCATION_MARKER);
        assert_eq!(head.chars().count(), 7);
    }

    #[test]
    fn evaluator_prompt_truncation_is_visible() {
        let big = serde_json::json!({"rows": vec!["padding"; 500]});
        let results = result_set(&[("sql", ToolResult::ok("sql", big))]);
        let plan = ExecutionPlan::fallback("q", "r");
        let prompt = build_evaluator_prompt("q", &plan, &results);
        assert!(prompt.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn summarize_results_reports_sizes_and_errors() {
        let results = result_set(&[
            ("sql", ToolResult::ok("sql", serde_json::json!({"rows": [1, 2]}))),
            ("web", ToolResult::err("web", "timed out")),
        ]);
        let summary = summarize_results(&results);
        assert!(summary.contains("chars"));
        assert!(summary.contains("error: timed out"));
    }

    #[test]
    fn planner_prompt_gains_replanning_section_on_later_passes() {
        let catalog = SchemaCatalog::unavailable(Path::new("/none"), "unavailable");
        let mut state = TurnState::new("q", vec![ChatMessage::user("hi")], 2);
        let first = build_planner_prompt(&state, &catalog);
        assert!(!first.contains("REPLANNING CONTEXT"));

        state.iteration = 1;
        state.plan_history.push(ExecutionPlan::fallback("q", "r"));
        state.replan_instructions = Some("try the web tool".to_string());
        let second = build_planner_prompt(&state, &catalog);
        assert!(second.contains("REPLANNING CONTEXT"));
        assert!(second.contains("try the web tool"));
    }

    #[test]
    fn history_window_keeps_only_trailing_messages() {
        let catalog = SchemaCatalog::unavailable(Path::new("/none"), "unavailable");
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| ChatMessage::user(format!("message-{i}")))
            .collect();
        let state = TurnState::new("q", history, 2);
        let prompt = build_planner_prompt(&state, &catalog);
        assert!(!prompt.contains("message-2"));
        assert!(prompt.contains("message-3"));
        assert!(prompt.contains("message-7"));
    }
}
