use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tlg_ledger::{
    Block, ChainReport, CommitReceipt, CommitRequest, LedgerService, ListFilter, ListPage,
    LogType, NetworkHealth, RecordView, Statistics, TxRef, VerifyResult,
};
use tracing::Instrument;

use crate::auth::{AuthProvider, Credentials, Identity};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerService>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { ledger, auth }
    }

    async fn caller(&self, headers: &HeaderMap) -> ServerResult<Identity> {
        self.auth.authenticate(&Credentials::from_headers(headers)).await
    }

    async fn commit(&self, caller: &Identity, request: CommitRequest) -> ServerResult<CommitReceipt> {
        let span = tracing::info_span!(
            "commit",
            caller = %caller.name,
            log_id = %request.log_id,
            tx_type = %request.tx_type,
        );
        Ok(self.ledger.commit(request).instrument(span).await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreatBody {
    pub log_id: String,
    pub log_type: LogType,
    pub detection_method: String,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThreatBody {
    pub payload: Value,
    pub detection_method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub current_data: Option<Value>,
}

fn bad_request(e: impl std::fmt::Display) -> ServerError {
    ServerError::BadRequest(e.to_string())
}

pub async fn health_handler(State(state): State<AppState>) -> Json<NetworkHealth> {
    Json(state.ledger.network_health())
}

pub async fn info_handler() -> Json<Value> {
    Json(json!({
        "name": "tlg-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn statistics_handler(State(state): State<AppState>) -> ServerResult<Json<Statistics>> {
    Ok(Json(state.ledger.statistics()?))
}

pub async fn list_handler(
    State(state): State<AppState>,
    query: Result<Query<ListFilter>, QueryRejection>,
) -> ServerResult<Json<ListPage>> {
    let Query(filter) = query.map_err(bad_request)?;
    Ok(Json(state.ledger.list(&filter)?))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> ServerResult<Json<RecordView>> {
    Ok(Json(state.ledger.get(&log_id)?))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> ServerResult<Json<Vec<TxRef>>> {
    Ok(Json(state.ledger.history(&log_id)?))
}

pub async fn verify_handler(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
    body: Result<Json<VerifyBody>, JsonRejection>,
) -> ServerResult<Json<VerifyResult>> {
    let Json(body) = body.map_err(bad_request)?;
    let current = body
        .current_data
        .ok_or_else(|| bad_request("currentData is required for verification"))?;
    Ok(Json(state.ledger.verify(&log_id, &current)?))
}

pub async fn create_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateThreatBody>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<CommitReceipt>)> {
    let Json(body) = body.map_err(bad_request)?;
    let caller = state.caller(&headers).await?;
    let request =
        CommitRequest::create(body.log_id, body.log_type, body.detection_method, body.payload);
    let receipt = state.commit(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn update_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(log_id): Path<String>,
    body: Result<Json<UpdateThreatBody>, JsonRejection>,
) -> ServerResult<Json<CommitReceipt>> {
    let Json(body) = body.map_err(bad_request)?;
    let caller = state.caller(&headers).await?;
    let current = state.ledger.get(&log_id)?;
    let detection_method = body.detection_method.unwrap_or(current.detection_method);
    let request = CommitRequest::update(log_id, current.log_type, detection_method, body.payload);
    Ok(Json(state.commit(&caller, request).await?))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(log_id): Path<String>,
) -> ServerResult<Json<CommitReceipt>> {
    let caller = state.caller(&headers).await?;
    let current = state.ledger.get(&log_id)?;
    let request = CommitRequest::delete(log_id, current.log_type, current.detection_method);
    Ok(Json(state.commit(&caller, request).await?))
}

pub async fn latest_block_handler(State(state): State<AppState>) -> ServerResult<Json<Block>> {
    state
        .ledger
        .latest_block()?
        .map(Json)
        .ok_or_else(|| tlg_ledger::LedgerError::NotFound("latest block".into()).into())
}

pub async fn block_handler(
    State(state): State<AppState>,
    n: Result<Path<u64>, PathRejection>,
) -> ServerResult<Json<Block>> {
    let Path(n) = n.map_err(bad_request)?;
    Ok(Json(state.ledger.get_block(n)?))
}

pub async fn chain_verify_handler(
    State(state): State<AppState>,
) -> ServerResult<Json<ChainReport>> {
    Ok(Json(state.ledger.verify_chain_integrity().await?))
}
