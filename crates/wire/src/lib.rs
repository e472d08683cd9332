// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the gateway and its downstream servers.
//!
//! Wire format: newline-delimited JSON-RPC 2.0 frames.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod jsonrpc;
mod mcp;

pub use jsonrpc::{
    decode, encode, read_frame, write_frame, ProtocolError, Request, Response, RpcError,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
pub use mcp::{
    method, ClientCapabilities, Content, Implementation, InitializeParams, InitializeResult,
    ServerCapabilities, Tool, ToolCallParams, ToolCallResult, ToolsCapability, ToolsListResult,
    MCP_PROTOCOL_VERSION,
};
