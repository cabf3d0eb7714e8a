//! Tool adapters behind a uniform, non-throwing async contract.
//!
//! The executor only ever sees `ToolResult`s: adapter failures, invalid
//! parameters, backend errors and timeouts are all folded into the error
//! side of the result. One tool failing can reduce answer quality but can
//! never crash the turn.

pub mod metadata;
pub mod semantic;
pub mod sql;
pub mod web;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::SchemaCatalog;
use crate::config::Config;
use crate::error::SetupError;
use crate::models::{ToolRequest, ToolResult};

/// Runtime the executor fans out over. Production uses [`Toolbox`]; tests
/// inject scripted implementations.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Invoke one tool. Every failure mode is folded into the returned
    /// result; this never returns out-of-band errors.
    async fn invoke(&self, request: ToolRequest) -> ToolResult;
}

/// Run one adapter future under its own timeout and fold the outcome into a
/// `ToolResult`. A timeout is treated identically to an application error.
pub async fn invoke_with_timeout<F>(tool: &str, timeout: Duration, fut: F) -> ToolResult
where
    F: Future<Output = Result<Value, String>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(payload)) => ToolResult::ok(tool, payload),
        Ok(Err(message)) => ToolResult::err(tool, message),
        Err(_) => ToolResult::err(
            tool,
            format!("{} timed out after {}s", tool, timeout.as_secs()),
        ),
    }
}

/// The four production adapters plus the shared per-invocation timeout.
pub struct Toolbox {
    sql: sql::SqlTool,
    semantic: semantic::SemanticSearch,
    metadata: metadata::MetadataClient,
    web: web::WebSearch,
    timeout: Duration,
}

impl Toolbox {
    pub fn new(config: &Config, catalog: Arc<SchemaCatalog>) -> Result<Self, SetupError> {
        Ok(Self {
            sql: sql::SqlTool::new(catalog),
            semantic: semantic::SemanticSearch::new(
                &config.oracle.base_url,
                &config.oracle.embedding_model,
                &config.oracle.api_key,
                &config.semantic_index,
            )?,
            metadata: metadata::MetadataClient::new(
                &config.metadata.base_url,
                &config.metadata.api_key,
            )?,
            web: web::WebSearch::new()?,
            timeout: config.tools.timeout(),
        })
    }
}

#[async_trait]
impl ToolRuntime for Toolbox {
    async fn invoke(&self, request: ToolRequest) -> ToolResult {
        let tool = request.tool_name();
        match request {
            ToolRequest::Sql { query, source } => {
                invoke_with_timeout(tool, self.timeout, self.sql.run(&query, &source)).await
            }
            ToolRequest::Semantic { query, limit } => {
                invoke_with_timeout(tool, self.timeout, self.semantic.run(&query, limit, None))
                    .await
            }
            ToolRequest::Metadata { title } => {
                invoke_with_timeout(tool, self.timeout, self.metadata.lookup(&title)).await
            }
            ToolRequest::Web { query, limit } => {
                invoke_with_timeout(tool, self.timeout, self.web.search(&query, limit)).await
            }
        }
    }
}
