//! Execution node: fan out to every selected tool concurrently and merge
//! the settled results into the cumulative set.

use std::sync::Arc;

use tracing::{debug, info};

use crate::models::{ExecutionPlan, ResultSet, ToolResult};
use crate::tools::ToolRuntime;

/// Run every tool the plan selects and merge over `previous`.
///
/// Invocations run concurrently and all settle before the merge; a failed
/// or panicked invocation becomes that tool's error result and never
/// disturbs its siblings. New entries overwrite same-named prior entries;
/// entries for tools not invoked this pass carry forward unchanged. The
/// returned names are the tools whose result this pass was non-error.
///
/// A plan selecting zero tools returns `previous` unchanged.
pub async fn execute(
    runtime: &Arc<dyn ToolRuntime>,
    plan: &ExecutionPlan,
    previous: &ResultSet,
) -> (ResultSet, Vec<String>) {
    let requests = plan.tool_requests();
    if requests.is_empty() {
        debug!("plan selects no tools, skipping execution");
        return (previous.clone(), Vec::new());
    }

    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        let tool = request.tool_name();
        let runtime = Arc::clone(runtime);
        handles.push((
            tool,
            tokio::spawn(async move { runtime.invoke(request).await }),
        ));
    }

    let mut fresh = ResultSet::new();
    let mut contributing = Vec::new();
    for (tool, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => ToolResult::err(tool, format!("tool task aborted: {e}")),
        };
        match &result.error {
            None => {
                contributing.push(tool.to_string());
                info!(tool, "tool succeeded");
            }
            Some(error) => info!(tool, error, "tool failed"),
        }
        fresh.insert(tool.to_string(), result);
    }

    let mut merged = previous.clone();
    merged.extend(fresh);
    (merged, contributing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRuntime;
    use serde_json::json;

    fn runtime(scripted: ScriptedRuntime) -> Arc<dyn ToolRuntime> {
        Arc::new(scripted)
    }

    fn plan_with_sql_and_web() -> ExecutionPlan {
        let mut plan = ExecutionPlan::fallback("q", "r");
        plan.use_sql = true;
        plan.sql_query = Some("SELECT 1".into());
        plan.sql_source = Some("netflix".into());
        plan.use_web = true;
        plan.web_query = Some("latest".into());
        plan
    }

    #[tokio::test]
    async fn zero_tools_returns_previous_unchanged() {
        let plan = ExecutionPlan::fallback("q", "r");
        let mut previous = ResultSet::new();
        previous.insert(
            "sql".to_string(),
            ToolResult::ok("sql", json!({"rows": []})),
        );

        let rt = runtime(ScriptedRuntime::new());
        let (merged, contributing) = execute(&rt, &plan, &previous).await;
        assert_eq!(merged, previous);
        assert!(contributing.is_empty());
    }

    #[tokio::test]
    async fn attempted_invocations_match_selected_tools() {
        let scripted = ScriptedRuntime::new();
        scripted.push("sql", ToolResult::ok("sql", json!({"rows": []})));
        scripted.push("web", ToolResult::ok("web", json!([])));
        let rt = Arc::new(scripted);
        let rt_dyn: Arc<dyn ToolRuntime> = rt.clone();

        let (merged, contributing) = execute(&rt_dyn, &plan_with_sql_and_web(), &ResultSet::new()).await;

        let mut invoked = rt.invocations();
        invoked.sort();
        assert_eq!(invoked, vec!["sql", "web"]);
        assert_eq!(merged.len(), 2);
        assert_eq!(contributing, vec!["sql", "web"]);
    }

    #[tokio::test]
    async fn one_failure_never_disturbs_siblings() {
        let scripted = ScriptedRuntime::new();
        scripted.push("sql", ToolResult::err("sql", "disk on fire"));
        scripted.push("web", ToolResult::ok("web", json!([{"title": "t"}])));
        let rt = runtime(scripted);

        let (merged, contributing) = execute(&rt, &plan_with_sql_and_web(), &ResultSet::new()).await;

        assert_eq!(merged.len(), 2);
        assert!(!merged["sql"].is_ok());
        assert!(merged["web"].is_ok());
        assert_eq!(contributing, vec!["web"]);
    }

    #[tokio::test]
    async fn merge_overwrites_same_tool_and_carries_others_forward() {
        let mut previous = ResultSet::new();
        previous.insert("sql".to_string(), ToolResult::err("sql", "old failure"));
        previous.insert(
            "semantic".to_string(),
            ToolResult::ok("semantic", json!([{"title": "kept"}])),
        );

        let scripted = ScriptedRuntime::new();
        scripted.push("sql", ToolResult::ok("sql", json!({"rows": [1]})));
        scripted.push("web", ToolResult::ok("web", json!([])));
        let rt = runtime(scripted);

        let (merged, _) = execute(&rt, &plan_with_sql_and_web(), &previous).await;

        assert_eq!(merged.len(), 3);
        assert!(merged["sql"].is_ok(), "new sql result overwrites the old");
        assert!(merged["semantic"].is_ok(), "uninvoked tool carried forward");
    }

    #[tokio::test]
    async fn every_attempt_yields_exactly_one_result() {
        // The scripted runtime has nothing queued, so both tools fall back
        // to their default error; each still yields exactly one entry.
        let rt = runtime(ScriptedRuntime::new());
        let (merged, contributing) = execute(&rt, &plan_with_sql_and_web(), &ResultSet::new()).await;
        assert_eq!(merged.len(), 2);
        assert!(contributing.is_empty());
        assert!(merged.values().all(|r| r.error.is_some()));
    }
}
