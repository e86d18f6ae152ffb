//! actix-web bindings for the ledger.
//!
//! Every response body is an [`Envelope`]; errors carry `data: null`.

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::balance::Position;
use crate::error::{LedgerError, StoreError};
use crate::expenses::ExpenseService;
use crate::ledger::Ledger;
use crate::schemas::{ExpenseId, Lend, UserId};
use crate::split::ExpenseRequest;
use crate::store::Store;

/// Shared handler state.
pub struct AppState<S> {
    pub ledger: Ledger<S>,
    pub expenses: ExpenseService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        let expenses = ExpenseService::new(ledger.clone());
        Self { ledger, expenses }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn respond(status: StatusCode, message: impl Into<String>, data: Option<T>) -> HttpResponse {
        HttpResponse::build(status).json(Envelope {
            timestamp: Utc::now(),
            status: status.as_u16(),
            message: message.into(),
            data,
        })
    }

    fn ok(data: T) -> HttpResponse {
        Self::respond(StatusCode::OK, "Success", Some(data))
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::AmountMismatch { .. } => StatusCode::CONFLICT,
            LedgerError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            LedgerError::Store(StoreError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            LedgerError::Store(_) | LedgerError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let data = match self {
            LedgerError::AmountMismatch { outstanding, .. } => {
                Some(serde_json::json!({ "amountDue": outstanding }))
            }
            _ => None,
        };
        Envelope::respond(status, self.to_string(), data)
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub user1: UserId,
    pub user2: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub creditor_id: UserId,
    pub debtor_id: UserId,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub lends: Vec<Lend>,
    pub position: Position,
}

async fn health<S: Store>(state: web::Data<AppState<S>>) -> HttpResponse {
    match state.ledger.store().ping().await {
        Ok(()) => Envelope::respond(
            StatusCode::OK,
            "API RUNNING",
            Some(serde_json::json!({ "status": "HEALTHY" })),
        ),
        Err(err) => {
            error!(error = %err, "health check failed");
            Envelope::respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                Some(serde_json::json!({ "status": "DATABASE CONNECTION ERROR" })),
            )
        }
    }
}

async fn create_expense<S: Store>(
    state: web::Data<AppState<S>>,
    request: web::Json<ExpenseRequest>,
) -> Result<HttpResponse, LedgerError> {
    let expense = state.expenses.create(request.into_inner()).await?;
    Ok(Envelope::respond(StatusCode::CREATED, "Expense added successfully", Some(expense)))
}

async fn get_expense<S: Store>(
    state: web::Data<AppState<S>>,
    id: web::Path<ExpenseId>,
) -> Result<HttpResponse, LedgerError> {
    let expense = state.expenses.get(id.into_inner()).await?;
    Ok(Envelope::ok(expense))
}

async fn get_balance<S: Store>(
    state: web::Data<AppState<S>>,
    query: web::Query<BalanceQuery>,
) -> Result<HttpResponse, LedgerError> {
    let lend = state.ledger.get_balance(query.user1, query.user2).await?;
    Ok(Envelope::ok(lend))
}

async fn get_summary<S: Store>(
    state: web::Data<AppState<S>>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, LedgerError> {
    let user_id = user_id.into_inner();
    let lends = state.ledger.get_summary(user_id).await?;
    let position = Position::from_lends(user_id, &lends);
    Ok(Envelope::ok(Summary { lends, position }))
}

async fn settle<S: Store>(
    state: web::Data<AppState<S>>,
    request: web::Json<SettleRequest>,
) -> Result<HttpResponse, LedgerError> {
    let settlement = state
        .ledger
        .settle(request.creditor_id, request.debtor_id, request.amount)
        .await?;
    Ok(Envelope::respond(StatusCode::OK, "payment received", Some(settlement)))
}

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::<S>))
        .route("/health", web::get().to(health::<S>))
        .route("/expenses", web::post().to(create_expense::<S>))
        .route("/expenses/{id}", web::get().to(get_expense::<S>))
        .route("/balance", web::get().to(get_balance::<S>))
        .route("/summary/{user_id}", web::get().to(get_summary::<S>))
        .route("/settle", web::post().to(settle::<S>));
}
