// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! MCP bridge: JSON-RPC 2.0 over child-process stdio, line-delimited.
//!
//! Each configured server is spawned once; its tools are discovered with
//! `tools/list` and registered in the local tool registry under
//! `<prefix>.<remote-name>` with permission class `mcp`. Invocations route
//! back to `tools/call` on the owning client.

mod bridge;
mod client;

pub use bridge::{register_mcp_servers, McpTool};
pub use client::{McpClient, McpToolInfo, DEFAULT_REQUEST_TIMEOUT};
