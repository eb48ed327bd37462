//! JSON-RPC 2.0 surfaces: the A2A task endpoint and the MCP tool endpoint.
//! Both run the same analysis as `POST /analyze`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::export::{headline, to_json};
use crate::report::WalletReport;
use crate::scan::ClassificationError;

use super::handlers::base_url;
use super::types::*;
use super::{AppState, SERVICE_NAME};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const TOOL_NAME: &str = "analyze_wallet";

const DESCRIPTION: &str = "Multi-chain blockchain wallet analyzer. Give it any public wallet \
address (EVM, Solana, Bitcoin, Tron) and get transaction counts, USD volumes, fees, a \
chain-by-chain breakdown sorted by activity and an AI-written briefing.";

/// Decode the body as a JSON-RPC request, or produce the error response.
fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| JsonRpcResponse::err(None, PARSE_ERROR, "Parse error"))?;
    let id = value.get("id").cloned();
    serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::err(id, INVALID_REQUEST, format!("Invalid Request: {}", e))
    })
}

async fn run_analysis(
    state: &AppState,
    address: &str,
    chains: Option<&[String]>,
) -> Result<WalletReport, ClassificationError> {
    let mut report = state
        .analyzer
        .analyze(address, chains, state.analyzer.default_budget())
        .await?;
    state.analyzer.describe(&mut report).await;
    Ok(report)
}

fn report_value(report: &WalletReport) -> Value {
    serde_json::to_value(report).unwrap_or_else(|e| json!({"error": e.to_string()}))
}

// ============================================================
// A2A
// ============================================================

pub async fn agent_card(headers: HeaderMap) -> Json<Value> {
    let base = base_url(&headers);
    Json(json!({
        "name": SERVICE_NAME,
        "description": DESCRIPTION,
        "url": base,
        "version": env!("CARGO_PKG_VERSION"),
        "provider": {"organization": SERVICE_NAME, "url": base},
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
            "stateTransitionHistory": false
        },
        "authentication": {"schemes": []},
        "defaultInputModes": ["application/json"],
        "defaultOutputModes": ["application/json"],
        "skills": [{
            "id": TOOL_NAME,
            "name": "Analyze Wallet",
            "description": "Analyze a public blockchain wallet across every chain its address \
                format supports. Returns per-chain activity sorted by transaction count, USD \
                totals and an optional narrative.",
            "tags": ["web3", "blockchain", "wallet", "analytics", "ethereum", "solana", "bitcoin", "tron"],
            "examples": [
                "Analyze this Ethereum wallet: 0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                "Which chains does this wallet use the most?"
            ],
            "inputModes": ["application/json"],
            "outputModes": ["application/json"]
        }]
    }))
}

/// `tasks/send`: the first text part of the message carries the address.
pub async fn a2a(State(state): State<Arc<AppState>>, body: Bytes) -> Json<JsonRpcResponse> {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return Json(response),
    };
    let id = request.id.clone();

    if request.method != "tasks/send" {
        return Json(JsonRpcResponse::err(
            id,
            METHOD_NOT_FOUND,
            format!("Method '{}' not supported. Use 'tasks/send'.", request.method),
        ));
    }

    let address = request.params["message"]["parts"]
        .as_array()
        .and_then(|parts| {
            parts
                .iter()
                .filter(|p| p["type"] == "text")
                .find_map(|p| p["text"].as_str())
        })
        .map(str::trim)
        .filter(|text| !text.is_empty());
    let Some(address) = address else {
        return Json(JsonRpcResponse::err(
            id,
            INVALID_PARAMS,
            "No text part found. Send a 'text' part containing the wallet address.",
        ));
    };

    let report = match run_analysis(&state, address, None).await {
        Ok(report) => report,
        Err(e) => {
            return Json(JsonRpcResponse::err(
                id,
                INTERNAL_ERROR,
                format!("Analysis failed: {}", e),
            ))
        }
    };

    let task_id = request.params["id"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Json(JsonRpcResponse::ok(
        id,
        json!({
            "id": task_id,
            "status": {
                "state": "completed",
                "timestamp": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
            },
            "artifacts": [{
                "name": "wallet_report",
                "description": format!("Multi-chain wallet analysis for {}", report.address),
                "parts": [{"type": "data", "data": report_value(&report)}]
            }]
        }),
    ))
}

// ============================================================
// MCP
// ============================================================

fn tool_definition() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Analyze a blockchain wallet across multiple chains. Chains are \
            detected from the address format unless a subset is given.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "address": {
                    "type": "string",
                    "description": "Public wallet address (EVM 0x..., Solana, Bitcoin or Tron)"
                },
                "chains": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional chain ids to restrict the scan to"
                }
            },
            "required": ["address"]
        }
    })
}

/// MCP over plain JSON-RPC: `initialize`, `tools/list`, `tools/call`.
/// Notifications (no `id`) are acknowledged with 202 and no body.
pub async fn mcp(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return Json(response).into_response(),
    };
    if request.id.is_none() && request.method.starts_with("notifications/") {
        return StatusCode::ACCEPTED.into_response();
    }
    let id = request.id.clone();

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(
            id,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": SERVICE_NAME, "version": env!("CARGO_PKG_VERSION")},
                "instructions": DESCRIPTION
            }),
        ),
        "ping" => JsonRpcResponse::ok(id, json!({})),
        "tools/list" => JsonRpcResponse::ok(id, json!({"tools": [tool_definition()]})),
        "tools/call" => call_tool(&state, id, &request.params).await,
        other => JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("Method '{}' not found", other)),
    };
    Json(response).into_response()
}

async fn call_tool(state: &AppState, id: Option<Value>, params: &Value) -> JsonRpcResponse {
    let name = params["name"].as_str().unwrap_or_default();
    if name != TOOL_NAME {
        return JsonRpcResponse::err(id, INVALID_PARAMS, format!("Unknown tool '{}'", name));
    }

    let arguments = &params["arguments"];
    let Some(address) = arguments["address"].as_str() else {
        return JsonRpcResponse::err(id, INVALID_PARAMS, "Missing required argument 'address'");
    };
    let chains: Option<Vec<String>> = arguments["chains"].as_array().map(|list| {
        list.iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect()
    });

    // Tool failures are results with isError, not protocol errors.
    match run_analysis(state, address, chains.as_deref()).await {
        Ok(report) => {
            let data = report_value(&report);
            let text = match to_json(&report) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => data.to_string(),
            };
            JsonRpcResponse::ok(
                id,
                json!({
                    "content": [
                        {"type": "text", "text": headline(&report)},
                        {"type": "text", "text": text}
                    ],
                    "structuredContent": data,
                    "isError": false
                }),
            )
        }
        Err(e) => JsonRpcResponse::ok(
            id,
            json!({
                "content": [{"type": "text", "text": e.to_string()}],
                "isError": true
            }),
        ),
    }
}
