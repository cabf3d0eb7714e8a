//! Scripted test doubles for the oracle and tool runtime seams.
//!
//! Production uses [`crate::oracle::OpenAiOracle`] and
//! [`crate::tools::Toolbox`]; deterministic tests inject these fakes with
//! pre-configured responses and never touch the network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::OracleError;
use crate::models::{ToolRequest, ToolResult};
use crate::oracle::Oracle;
use crate::tools::ToolRuntime;

/// Oracle that replays queued responses.
#[derive(Default)]
pub struct ScriptedOracle {
    json: Mutex<VecDeque<Result<String, OracleError>>>,
    text: Mutex<VecDeque<Result<String, OracleError>>>,
    json_calls: AtomicUsize,
    text_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(
        json: Vec<Result<String, OracleError>>,
        text: Vec<Result<String, OracleError>>,
    ) -> Self {
        Self {
            json: Mutex::new(json.into()),
            text: Mutex::new(text.into()),
            json_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_json(json: Vec<Result<String, OracleError>>) -> Self {
        Self::new(json, vec![])
    }

    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    fn pop(queue: &Mutex<VecDeque<Result<String, OracleError>>>) -> Result<String, OracleError> {
        queue
            .lock()
            .expect("scripted oracle lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(OracleError::Malformed(
                    "no scripted response left".to_string(),
                ))
            })
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete_text(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Self::pop(&self.text)
    }

    async fn complete_json(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        Self::pop(&self.json)
    }
}

/// Tool runtime that replays queued per-tool results and records every
/// invocation.
#[derive(Default)]
pub struct ScriptedRuntime {
    scripts: Mutex<HashMap<String, VecDeque<ToolResult>>>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result for a tool.
    pub fn push(&self, tool: &str, result: ToolResult) {
        self.scripts
            .lock()
            .expect("scripted runtime lock")
            .entry(tool.to_string())
            .or_default()
            .push_back(result);
    }

    /// Tool names in invocation order, across all passes.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .expect("scripted runtime lock")
            .clone()
    }
}

#[async_trait]
impl ToolRuntime for ScriptedRuntime {
    async fn invoke(&self, request: ToolRequest) -> ToolResult {
        let tool = request.tool_name();
        self.invocations
            .lock()
            .expect("scripted runtime lock")
            .push(tool.to_string());

        let scripted = self
            .scripts
            .lock()
            .expect("scripted runtime lock")
            .get_mut(tool)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| ToolResult::err(tool, format!("no scripted result for {tool}")))
    }
}
