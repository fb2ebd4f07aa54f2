use std::sync::Arc;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router,
    schemars::JsonSchema,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};

use crate::sync::SyncEngine;

#[derive(Clone)]
pub struct McpServer {
    engine: Arc<SyncEngine>,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DetectChangesRequest {
    #[schemars(description = "The remote task ID to inspect")]
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindConflictsRequest {
    #[schemars(description = "Maximum number of conflicts to return")]
    pub limit: Option<usize>,
}

fn to_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl McpServer {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl McpServer {
    #[tool(description = "Run a synchronization pass now and report what it did")]
    async fn sync_now(&self) -> Result<CallToolResult, McpError> {
        let result = self.engine.sync_now().await;
        to_json(&result)
    }

    #[tool(description = "Show which fields of a task changed since the last sync, whether the changes were manual, and whether it needs reclassification")]
    async fn detect_changes(
        &self,
        params: Parameters<DetectChangesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;

        let analysis = self
            .engine
            .analyze_task(&req.task_id)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .ok_or_else(|| McpError::invalid_params("Task not found", None))?;

        to_json(&analysis)
    }

    #[tool(description = "List open tasks whose project disagrees with their recommended category")]
    async fn find_conflicts(
        &self,
        params: Parameters<FindConflictsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut conflicts = self
            .engine
            .find_conflicts()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        if let Some(limit) = params.0.limit {
            conflicts.truncate(limit);
        }

        to_json(&conflicts)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("tasksync MCP server: sync tasks and inspect manual changes and category conflicts".into()),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(engine: Arc<SyncEngine>) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(engine);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
