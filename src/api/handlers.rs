use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chains::CHAINS;
use crate::export::{to_csv, to_xlsx};

use super::types::*;
use super::AppState;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

/// `http://<Host header>` so advertised URLs match what the caller used.
pub(super) fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

// ============================================================
// Info
// ============================================================

pub async fn root(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<ServiceInfo> {
    let base = base_url(&headers);
    let endpoints: BTreeMap<String, String> = [
        ("health", "/health"),
        ("analyze", "/analyze"),
        ("a2a_card", "/.well-known/agent.json"),
        ("a2a_tasks", "/a2a"),
        ("mcp", "/mcp"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), format!("{}{}", base, path)))
    .collect();

    Json(ServiceInfo {
        name: super::SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        insights_enabled: state.analyzer.insights_enabled(),
        supported_chains: CHAINS
            .iter()
            .map(|c| ChainInfo {
                id: c.id.to_string(),
                name: c.name.to_string(),
                family: c.family.to_string(),
                native_symbol: c.native_symbol.to_string(),
            })
            .collect(),
        endpoints,
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================
// Analyze
// ============================================================

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyzeParams>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<Response> {
    let started = Instant::now();
    let budget = req
        .time_budget_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.analyzer.default_budget());

    let mut report = state
        .analyzer
        .analyze(&req.address, req.chains.as_deref(), budget)
        .await
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    if params.include_insights {
        state.analyzer.describe(&mut report).await;
    }

    let short: String = report.address.chars().take(12).collect();
    match params.format {
        ReportFormat::Json => Ok(Json(AnalyzeResponse {
            success: true,
            address: report.address.clone(),
            error: None,
            report: Some(report),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
        .into_response()),
        ReportFormat::Csv => {
            let body = to_csv(&report, chrono::Utc::now())
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"wallet_{}_report.csv\"", short),
                    ),
                ],
                body,
            )
                .into_response())
        }
        ReportFormat::Excel => {
            let body = to_xlsx(&report, chrono::Utc::now())
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            Ok((
                [
                    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"wallet_{}_report.xlsx\"", short),
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}
