// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use ocode_config::McpServerConfig;
use ocode_tools::{PermissionClass, Tool, ToolContext, ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::debug;

use crate::client::{McpClient, McpToolInfo};

/// A remote tool surfaced as a local one. Executions route back to
/// `tools/call` on the owning client.
pub struct McpTool {
    name: String,
    description: String,
    parameters: Value,
    remote_name: String,
    client: Arc<McpClient>,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn permission_class(&self) -> PermissionClass {
        PermissionClass::Mcp
    }

    async fn execute(&self, _ctx: &ToolContext, args: &Value) -> ToolResult {
        match self.client.call_tool(&self.remote_name, args.clone()).await {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::err(format!("MCP tool call failed: {e}")),
        }
    }
}

fn bridge_tool(
    server_name: &str,
    prefix: &str,
    info: McpToolInfo,
    client: Arc<McpClient>,
) -> McpTool {
    McpTool {
        name: format!("{prefix}.{}", info.name),
        description: format!("[MCP:{server_name}] {}", info.description)
            .trim()
            .to_string(),
        parameters: info.input_schema,
        remote_name: info.name,
        client,
    }
}

/// Spawn every configured server, discover its tools, and register them
/// under `<prefix>.<remote-name>`. Returns the live clients so the caller
/// can terminate the children on close.
pub async fn register_mcp_servers(
    registry: &mut ToolRegistry,
    servers: impl IntoIterator<Item = (String, McpServerConfig)>,
) -> anyhow::Result<Vec<Arc<McpClient>>> {
    let mut clients = Vec::new();
    for (name, cfg) in servers {
        let client = Arc::new(McpClient::spawn(
            &cfg.command,
            cfg.cwd.as_deref(),
            cfg.env.clone(),
        )?);
        let prefix = cfg.prefix.clone().unwrap_or_else(|| format!("mcp.{name}"));
        let tools = client.list_tools().await?;
        debug!(server = %name, count = tools.len(), "registering MCP tools");
        for info in tools {
            registry.register(bridge_tool(&name, &prefix, info, Arc::clone(&client)));
        }
        clients.push(client);
    }
    Ok(clients)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
