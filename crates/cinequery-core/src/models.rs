//! Structured shapes exchanged with the reasoning oracle and the tools.
//!
//! Oracle output is parsed defensively: direct serde first, then JSON
//! extraction from prose, then field-by-field recovery with safe defaults.
//! A plan that cannot be recovered at all becomes the caller's fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::oracle::extract_json;

/// Default result count for ranked search tools.
fn default_result_limit() -> usize {
    5
}

/// The planner's structured decision: which tools to run and with what
/// parameters. Produced fresh on every planning pass and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub use_sql: bool,
    #[serde(default)]
    pub use_semantic: bool,
    #[serde(default)]
    pub use_metadata: bool,
    #[serde(default)]
    pub use_web: bool,

    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub sql_source: Option<String>,

    #[serde(default)]
    pub semantic_query: Option<String>,
    #[serde(default = "default_result_limit")]
    pub semantic_limit: usize,

    #[serde(default)]
    pub metadata_title: Option<String>,

    #[serde(default)]
    pub web_query: Option<String>,
    #[serde(default = "default_result_limit")]
    pub web_limit: usize,

    /// Why these tools were selected.
    #[serde(default)]
    pub reasoning: String,
    /// The question restated with references from history resolved.
    #[serde(default)]
    pub resolved_question: String,
}

impl ExecutionPlan {
    /// Safe default plan: no tools selected, the failure as reasoning.
    /// Guarantees the loop always has a well-formed plan to execute.
    pub fn fallback(question: &str, reason: &str) -> Self {
        Self {
            use_sql: false,
            use_semantic: false,
            use_metadata: false,
            use_web: false,
            sql_query: None,
            sql_source: None,
            semantic_query: None,
            semantic_limit: default_result_limit(),
            metadata_title: None,
            web_query: None,
            web_limit: default_result_limit(),
            reasoning: reason.to_string(),
            resolved_question: question.to_string(),
        }
    }

    /// Parse a plan from oracle output.
    pub fn parse(text: &str) -> Result<Self, String> {
        let json = extract_json(text);
        if let Ok(plan) = serde_json::from_str::<ExecutionPlan>(json) {
            return Ok(plan);
        }

        let value: Value = serde_json::from_str(json)
            .map_err(|e| format!("not a JSON object: {e}"))?;
        Ok(Self::from_value(&value))
    }

    /// Field-by-field recovery from a loosely shaped JSON value.
    fn from_value(v: &Value) -> Self {
        Self {
            use_sql: bool_field(v, "use_sql"),
            use_semantic: bool_field(v, "use_semantic"),
            use_metadata: bool_field(v, "use_metadata"),
            use_web: bool_field(v, "use_web"),
            sql_query: string_field(v, "sql_query"),
            sql_source: string_field(v, "sql_source"),
            semantic_query: string_field(v, "semantic_query"),
            semantic_limit: usize_field(v, "semantic_limit", default_result_limit()),
            metadata_title: string_field(v, "metadata_title"),
            web_query: string_field(v, "web_query"),
            web_limit: usize_field(v, "web_limit", default_result_limit()),
            reasoning: string_field(v, "reasoning").unwrap_or_default(),
            resolved_question: string_field(v, "resolved_question").unwrap_or_default(),
        }
    }

    /// Concrete tool requests for this plan.
    ///
    /// A `use` flag only produces a request when its required parameters are
    /// non-empty, so malformed plans degrade to fewer tools instead of
    /// invalid invocations.
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        let mut requests = Vec::new();

        if self.use_sql {
            if let (Some(query), Some(source)) =
                (non_empty(&self.sql_query), non_empty(&self.sql_source))
            {
                requests.push(ToolRequest::Sql { query, source });
            }
        }
        if self.use_semantic {
            if let Some(query) = non_empty(&self.semantic_query) {
                requests.push(ToolRequest::Semantic {
                    query,
                    limit: self.semantic_limit.max(1),
                });
            }
        }
        if self.use_metadata {
            if let Some(title) = non_empty(&self.metadata_title) {
                requests.push(ToolRequest::Metadata { title });
            }
        }
        if self.use_web {
            if let Some(query) = non_empty(&self.web_query) {
                requests.push(ToolRequest::Web {
                    query,
                    limit: self.web_limit.max(1),
                });
            }
        }

        requests
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn bool_field(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn usize_field(v: &Value, key: &str, default: usize) -> usize {
    v.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

/// One invocation of one tool, with its required parameters already
/// validated as non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Sql { query: String, source: String },
    Semantic { query: String, limit: usize },
    Metadata { title: String },
    Web { query: String, limit: usize },
}

impl ToolRequest {
    /// Stable tool name used as the key in the result set.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolRequest::Sql { .. } => "sql",
            ToolRequest::Semantic { .. } => "semantic",
            ToolRequest::Metadata { .. } => "metadata",
            ToolRequest::Web { .. } => "web",
        }
    }
}

/// Outcome of one tool invocation. Exactly one of `payload` and `error` is
/// populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool: impl Into<String>, payload: Value) -> Self {
        Self {
            tool: tool.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Accumulated tool outputs for one turn, keyed by tool name.
///
/// A `BTreeMap` keeps iteration order deterministic for the merge and for
/// prompt serialization.
pub type ResultSet = BTreeMap<String, ToolResult>;

/// The evaluator's routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Evidence suffices; go to synthesis.
    Continue,
    /// Evidence is lacking; loop back to planning.
    Replan,
}

/// The evaluator's assessment of the cumulative results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorVerdict {
    pub decision: Decision,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub replan_instructions: Option<String>,
}

impl EvaluatorVerdict {
    /// Parse a verdict from oracle output.
    ///
    /// Unknown or missing decisions become `Continue`: when the oracle
    /// cannot be understood, looping again would burn iterations for
    /// nothing.
    pub fn parse(text: &str) -> Result<Self, String> {
        let json = extract_json(text);
        let value: Value = serde_json::from_str(json)
            .map_err(|e| format!("not a JSON object: {e}"))?;

        let decision = match value.get("decision").and_then(Value::as_str) {
            Some("replan") => Decision::Replan,
            Some("continue") => Decision::Continue,
            other => {
                tracing::warn!(?other, "unknown evaluator decision, defaulting to continue");
                Decision::Continue
            }
        };

        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Ok(Self {
            decision,
            reasoning: string_field(&value, "reasoning").unwrap_or_default(),
            confidence,
            replan_instructions: string_field(&value, "replan_instructions"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plan_direct() {
        let text = r#"{
            "use_sql": true,
            "sql_query": "SELECT COUNT(*) FROM netflix_titles",
            "sql_source": "netflix",
            "reasoning": "count rows",
            "resolved_question": "How many titles are there?"
        }"#;
        let plan = ExecutionPlan::parse(text).unwrap();
        assert!(plan.use_sql);
        assert!(!plan.use_web);
        assert_eq!(plan.semantic_limit, 5);
        assert_eq!(plan.sql_source.as_deref(), Some("netflix"));
    }

    #[test]
    fn parse_plan_wrapped_in_prose() {
        let text = "Here is my plan:\n{\"use_web\": true, \"web_query\": \"latest releases\", \"reasoning\": \"news\", \"resolved_question\": \"q\"}\nDone.";
        let plan = ExecutionPlan::parse(text).unwrap();
        assert!(plan.use_web);
        assert_eq!(plan.web_query.as_deref(), Some("latest releases"));
    }

    #[test]
    fn parse_plan_with_nulls_and_odd_types() {
        let text = r#"{
            "use_sql": true,
            "sql_query": null,
            "sql_source": null,
            "use_semantic": true,
            "semantic_query": "heist movies",
            "semantic_limit": "not a number",
            "reasoning": null
        }"#;
        let plan = ExecutionPlan::parse(text).unwrap();
        assert!(plan.use_sql);
        assert!(plan.sql_query.is_none());
        assert_eq!(plan.semantic_limit, 5);
        // Flag set but parameters missing: no sql request is produced.
        let requests = plan.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_name(), "semantic");
    }

    #[test]
    fn parse_plan_rejects_non_json() {
        assert!(ExecutionPlan::parse("I will use the SQL tool.").is_err());
    }

    #[test]
    fn fallback_selects_nothing() {
        let plan = ExecutionPlan::fallback("what is this?", "planning error: boom");
        assert!(plan.tool_requests().is_empty());
        assert_eq!(plan.resolved_question, "what is this?");
        assert!(plan.reasoning.contains("boom"));
    }

    #[test]
    fn tool_requests_trims_whitespace_params() {
        let mut plan = ExecutionPlan::fallback("q", "r");
        plan.use_metadata = true;
        plan.metadata_title = Some("   ".to_string());
        assert!(plan.tool_requests().is_empty());
    }

    #[test]
    fn tool_requests_covers_all_four() {
        let mut plan = ExecutionPlan::fallback("q", "r");
        plan.use_sql = true;
        plan.sql_query = Some("SELECT 1".into());
        plan.sql_source = Some("netflix".into());
        plan.use_semantic = true;
        plan.semantic_query = Some("space adventure".into());
        plan.use_metadata = true;
        plan.metadata_title = Some("Inception".into());
        plan.use_web = true;
        plan.web_query = Some("trending shows".into());

        let names: Vec<_> = plan
            .tool_requests()
            .iter()
            .map(|r| r.tool_name())
            .collect();
        assert_eq!(names, vec!["sql", "semantic", "metadata", "web"]);
    }

    #[test]
    fn tool_result_populates_exactly_one_side() {
        let ok = ToolResult::ok("sql", serde_json::json!({"rows": []}));
        assert!(ok.payload.is_some() && ok.error.is_none());

        let err = ToolResult::err("web", "timed out");
        assert!(err.payload.is_none() && err.error.is_some());
        assert!(!err.is_ok());
    }

    #[test]
    fn parse_verdict_replan() {
        let text = r#"{
            "decision": "replan",
            "reasoning": "missing plot data",
            "confidence": 0.3,
            "replan_instructions": "fetch metadata for the title"
        }"#;
        let verdict = EvaluatorVerdict::parse(text).unwrap();
        assert_eq!(verdict.decision, Decision::Replan);
        assert_eq!(
            verdict.replan_instructions.as_deref(),
            Some("fetch metadata for the title")
        );
    }

    #[test]
    fn parse_verdict_unknown_decision_defaults_to_continue() {
        let verdict =
            EvaluatorVerdict::parse(r#"{"decision": "maybe", "confidence": 2.5}"#).unwrap();
        assert_eq!(verdict.decision, Decision::Continue);
        assert_eq!(verdict.confidence, 1.0); // clamped
    }

    #[test]
    fn parse_verdict_rejects_non_json() {
        assert!(EvaluatorVerdict::parse("looks fine to me").is_err());
    }
}
