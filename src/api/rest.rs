use axum::{
    Router,
    routing::{get, post},
    extract::{Path, State, Json, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::controls::Controls;
use crate::core::journal::JournalView;
use crate::core::orchestrator::{TransferOrchestrator, TransferReceipt, TransferRequest};
use crate::core::services::SettlementServices;
use crate::core::withdrawal::{WithdrawalProcessor, WithdrawalReceipt, WithdrawalRequest};
use crate::error::{Error, ErrorKind};
use crate::api::rate_limit::RateLimiter;
use crate::models::transaction::Transaction;
use crate::observability::metrics;
use crate::settlement::ledger::LedgerEntry;
use crate::types::ids::UserId;
use crate::utils::helper::with_timeout;

pub struct ApiState {
    pub services: Arc<SettlementServices>,
    pub transfers: TransferOrchestrator,
    pub withdrawals: WithdrawalProcessor,
    pub controls: Arc<Controls>,
    pub rate_limiter: RateLimiter,
}

impl ApiState {
    pub fn new(services: Arc<SettlementServices>, rate_limiter: RateLimiter) -> Self {
        ApiState {
            transfers: TransferOrchestrator::new(services.clone()),
            withdrawals: WithdrawalProcessor::new(services.clone()),
            controls: services.controls.clone(),
            services,
            rate_limiter,
        }
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        .route("/p2p-transfer", post(p2p_transfer))
        .route("/withdrawals", post(withdraw))
        .route("/transfers/:key", get(get_transfer_journal))
        .route("/wallets/:user_id/transactions", get(list_transactions))
        .route("/wallets/:user_id/history", get(wallet_history))
        .route("/admin/controls", get(get_controls).post(set_controls))
        .with_state(state)
}

/// `{ error, message, refunded? }` with the status implied by the error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded: Option<bool>,
}

impl ApiError {
    fn status_for(error: &Error) -> StatusCode {
        match error.kind() {
            ErrorKind::Validation | ErrorKind::InsufficientFunds => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => match error {
                Error::BankNotAllowed { .. } => StatusCode::FORBIDDEN,
                Error::SelfTransfer => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNAUTHORIZED,
            },
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unavailable => match error {
                Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
            ErrorKind::Upstream | ErrorKind::PartialFailure => match error {
                Error::PayoutFailed { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = Self::status_for(&error);
        if status.is_server_error() {
            tracing::error!(reason = error.reason(), error = %error, "request failed");
        }
        ApiError {
            status,
            body: ErrorBody {
                error: error.reason().to_string(),
                message: error.to_string(),
                refunded: error.refunded(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "invalid_body".to_string(),
                message: rejection.body_text(),
                refunded: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// `Idempotency-Key` header wins over the body field.
fn idempotency_key(headers: &HeaderMap, body_key: Option<String>) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or(body_key)
}

fn rate_limit(state: &ApiState, user_id: Option<&str>) -> Result<(), ApiError> {
    if let Some(id) = user_id.and_then(|raw| UserId::from_string(raw.trim()).ok()) {
        state.rate_limiter.check(id)?;
    }
    Ok(())
}

async fn p2p_transfer(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferReceipt> {
    let Json(mut request) = payload?;
    rate_limit(&state, request.user_id.as_deref())?;
    request.idempotency_key = idempotency_key(&headers, request.idempotency_key.take());

    let receipt = state.transfers.execute(request).await?;
    Ok(Json(receipt))
}

async fn withdraw(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<WithdrawalRequest>, JsonRejection>,
) -> ApiResult<WithdrawalReceipt> {
    let Json(mut request) = payload?;
    rate_limit(&state, request.user_id.as_deref())?;
    request.idempotency_key = idempotency_key(&headers, request.idempotency_key.take());

    let receipt = state.withdrawals.execute(request).await?;
    Ok(Json(receipt))
}

async fn get_transfer_journal(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> ApiResult<JournalView> {
    let services = &state.services;
    let record = with_timeout("journal get", services.timeout(), services.collaborators.journal.get(&key))
        .await?
        .ok_or_else(|| Error::TransactionNotFound(key.clone()))?;
    Ok(Json(JournalView::from(&record)))
}

fn path_user(raw: &str) -> Result<UserId, ApiError> {
    UserId::from_string(raw).map_err(|_| {
        ApiError::from(Error::InvalidField {
            field: "user_id",
            details: format!("'{raw}' is not a valid id"),
        })
    })
}

async fn list_transactions(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Transaction>> {
    let user_id = path_user(&user_id)?;
    let services = &state.services;
    services.find_user(user_id).await?;
    let rows = with_timeout(
        "list transactions",
        services.timeout(),
        services.collaborators.transactions.list_for_user(user_id),
    )
    .await?;
    Ok(Json(rows))
}

async fn wallet_history(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<LedgerEntry>> {
    let user_id = path_user(&user_id)?;
    state.services.find_user(user_id).await?;
    let entries = state.services.balances.history(user_id).await?;
    Ok(Json(entries))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsState {
    pub transfers_halted: Option<bool>,
    pub withdrawals_halted: Option<bool>,
}

async fn get_controls(State(state): State<Arc<ApiState>>) -> Json<ControlsState> {
    Json(ControlsState {
        transfers_halted: Some(state.controls.is_transfers_halted()),
        withdrawals_halted: Some(state.controls.is_withdrawals_halted()),
    })
}

async fn set_controls(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ControlsState>, JsonRejection>,
) -> ApiResult<ControlsState> {
    let Json(change) = payload?;
    match change.transfers_halted {
        Some(true) => state.controls.halt_transfers(),
        Some(false) => state.controls.resume_transfers(),
        None => {}
    }
    match change.withdrawals_halted {
        Some(true) => state.controls.halt_withdrawals(),
        Some(false) => state.controls.resume_withdrawals(),
        None => {}
    }
    Ok(get_controls(State(state)).await)
}
