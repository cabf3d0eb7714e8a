//! End-to-end turn loop behavior with scripted oracle and tool doubles.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;

use cinequery_core::error::OracleError;
use cinequery_core::models::ToolResult;
use cinequery_core::testing::{ScriptedOracle, ScriptedRuntime};
use cinequery_core::{
    NullProgress, Oracle, ProgressSink, SchemaCatalog, ToolRuntime, TurnEngine, TurnPhase,
};

fn catalog() -> SchemaCatalog {
    SchemaCatalog::unavailable(Path::new("/none"), "no sources in this test")
}

fn engine(oracle: ScriptedOracle, runtime: Arc<ScriptedRuntime>, ceiling: u32) -> TurnEngine {
    let oracle: Arc<dyn Oracle> = Arc::new(oracle);
    let tools: Arc<dyn ToolRuntime> = runtime;
    TurnEngine::new(oracle, tools, ceiling)
}

fn sql_plan() -> String {
    json!({
        "use_sql": true,
        "sql_query": "SELECT COUNT(*) AS n FROM titles WHERE type = 'Movie'",
        "sql_source": "netflix",
        "reasoning": "counting is a sql job",
        "resolved_question": "How many movies are in the collection?"
    })
    .to_string()
}

fn continue_verdict(confidence: f64) -> String {
    json!({
        "decision": "continue",
        "reasoning": "data answers the question",
        "confidence": confidence,
        "replan_instructions": null
    })
    .to_string()
}

fn replan_verdict(instructions: &str) -> String {
    json!({
        "decision": "replan",
        "reasoning": "evidence is insufficient",
        "confidence": 0.2,
        "replan_instructions": instructions
    })
    .to_string()
}

#[tokio::test]
async fn single_pass_turn_answers_from_one_tool() {
    let oracle = ScriptedOracle::new(
        vec![Ok(sql_plan()), Ok(continue_verdict(0.9))],
        vec![Ok("There are 5 movies in the collection.".to_string())],
    );
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push("sql", ToolResult::ok("sql", json!({"rows": [{"n": 5}], "row_count": 1})));

    let outcome = engine(oracle, Arc::clone(&runtime), 2)
        .run_turn("how many movies?", Vec::new(), &catalog(), &NullProgress)
        .await;

    assert!(outcome.answer.contains('5'));
    assert_eq!(outcome.sources_used, vec!["sql"]);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.confidence, 0.9);
    assert_eq!(runtime.invocations(), vec!["sql"]);
}

#[tokio::test]
async fn replan_verdict_runs_a_second_pass_with_different_tools() {
    let first_plan = json!({
        "use_metadata": true,
        "metadata_title": "Inceptoin",
        "reasoning": "lookup details",
        "resolved_question": "What is the plot of Inception?"
    })
    .to_string();
    let second_plan = json!({
        "use_semantic": true,
        "semantic_query": "a thief who steals secrets through dream sharing",
        "reasoning": "metadata lookup failed, fall back to the description index",
        "resolved_question": "What is the plot of Inception?"
    })
    .to_string();

    let oracle = ScriptedOracle::new(
        vec![
            Ok(first_plan),
            Ok(replan_verdict("the title lookup failed, try semantic search")),
            Ok(second_plan),
            Ok(continue_verdict(0.8)),
        ],
        vec![Ok("Inception follows a thief who infiltrates dreams.".to_string())],
    );
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push(
        "metadata",
        ToolResult::err("metadata", "metadata timed out after 20s"),
    );
    runtime.push(
        "semantic",
        ToolResult::ok("semantic", json!([{"title": "Inception", "score": 0.91}])),
    );

    let outcome = engine(oracle, Arc::clone(&runtime), 2)
        .run_turn("what is it about?", Vec::new(), &catalog(), &NullProgress)
        .await;

    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.sources_used, vec!["semantic"]);
    assert_eq!(outcome.confidence, 0.8);
    assert_eq!(runtime.invocations(), vec!["metadata", "semantic"]);
    assert!(outcome.answer.contains("Inception"));
}

#[tokio::test]
async fn turn_survives_every_component_failing() {
    // Planner gets one response; the tool errors; the ceiling of 1 forces
    // synthesis without an evaluator call; the synthesizer itself fails.
    let oracle = ScriptedOracle::new(
        vec![Ok(json!({
            "use_web": true,
            "web_query": "latest releases",
            "reasoning": "news question",
            "resolved_question": "q"
        })
        .to_string())],
        vec![Err(OracleError::Malformed("connection reset".to_string()))],
    );
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push("web", ToolResult::err("web", "search unreachable"));

    let outcome = engine(oracle, runtime, 1)
        .run_turn("what's new?", Vec::new(), &catalog(), &NullProgress)
        .await;

    assert!(!outcome.answer.trim().is_empty());
    assert!(outcome.answer.contains("connection reset"));
    assert!(outcome.sources_used.is_empty());
    assert_eq!(outcome.iterations, 1);
    // Ceiling verdict, not an oracle assessment.
    assert_eq!(outcome.confidence, 0.5);
}

#[tokio::test]
async fn always_replanning_oracle_still_terminates_at_the_ceiling() {
    let oracle = ScriptedOracle::new(
        vec![
            Ok(sql_plan()),
            Ok(replan_verdict("try again")),
            Ok(sql_plan()),
            Ok(replan_verdict("try again")),
            Ok(sql_plan()),
            // Third evaluation never happens: the ceiling short-circuits it.
        ],
        vec![Ok("best effort answer".to_string())],
    );
    let runtime = Arc::new(ScriptedRuntime::new());
    for _ in 0..3 {
        runtime.push("sql", ToolResult::ok("sql", json!({"rows": [], "row_count": 0})));
    }

    let outcome = engine(oracle, Arc::clone(&runtime), 3)
        .run_turn("q", Vec::new(), &catalog(), &NullProgress)
        .await;

    assert_eq!(outcome.iterations, 3);
    assert_eq!(runtime.invocations().len(), 3);
    assert_eq!(outcome.answer, "best effort answer");
}

#[tokio::test]
async fn unparseable_plan_still_yields_an_answer() {
    let oracle = ScriptedOracle::new(
        vec![
            Ok("I would probably use SQL for this one.".to_string()),
            Ok(continue_verdict(0.1)),
        ],
        vec![Ok("I could not retrieve any data for that question.".to_string())],
    );
    let runtime = Arc::new(ScriptedRuntime::new());

    let outcome = engine(oracle, Arc::clone(&runtime), 2)
        .run_turn("q", Vec::new(), &catalog(), &NullProgress)
        .await;

    assert!(runtime.invocations().is_empty());
    assert!(!outcome.answer.trim().is_empty());
    assert_eq!(outcome.iterations, 1);
}

struct RecordingProgress {
    phases: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingProgress {
    fn on_phase(&self, phase: &TurnPhase) {
        let label = match phase {
            TurnPhase::Planning { .. } => "planning",
            TurnPhase::Executing { .. } => "executing",
            TurnPhase::Evaluating { .. } => "evaluating",
            TurnPhase::Synthesizing => "synthesizing",
            TurnPhase::Done => "done",
        };
        self.phases.lock().unwrap().push(label.to_string());
    }
}

#[tokio::test]
async fn progress_phases_arrive_in_loop_order() {
    let oracle = ScriptedOracle::new(
        vec![Ok(sql_plan()), Ok(continue_verdict(0.9))],
        vec![Ok("answer".to_string())],
    );
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push("sql", ToolResult::ok("sql", json!({"rows": []})));

    let progress = RecordingProgress {
        phases: Mutex::new(Vec::new()),
    };
    engine(oracle, runtime, 2)
        .run_turn("q", Vec::new(), &catalog(), &progress)
        .await;

    assert_eq!(
        *progress.phases.lock().unwrap(),
        vec!["planning", "executing", "evaluating", "synthesizing", "done"]
    );
}
