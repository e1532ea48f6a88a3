//! Simple REST API server example for the course ledger.
//!
//! Run with: `cargo run --example server`
//!
//! The caller's identity is taken from the `x-user-id` header, standing in
//! for whatever authentication layer sits in front of the service.
//!
//! ## Endpoints
//!
//! - `POST /balance/recharge` - Top up the caller's wallet
//! - `GET /balance/info` - Caller's wallet figures
//! - `GET /balance/recharge-history` - Caller's recharges
//! - `POST /purchase/course` - Buy a course
//! - `GET /purchase/check/{course_id}` - Whether the caller owns a course
//! - `GET /purchase/my-courses` - Caller's purchases with course details
//! - `GET /purchase/sales` - Sales of the caller's courses
//! - `GET /purchase/income` - Caller's total instructor income
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/balance/recharge \
//!   -H "x-user-id: 1" -H "Content-Type: application/json" \
//!   -d '{"amount": "100.00"}'
//!
//! curl -X POST http://localhost:3000/purchase/course \
//!   -H "x-user-id: 1" -H "Content-Type: application/json" \
//!   -d '{"course_id": 1}'
//!
//! curl http://localhost:3000/purchase/income -H "x-user-id: 100"
//! ```

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use course_ledger::adapters::memory::{InMemoryCatalog, InMemoryUserDirectory};
use course_ledger::ports::catalog::{Course, CourseStatus};
use course_ledger::{
    BalanceInfo, CourseId, LedgerConfig, LedgerError, PurchaseConfirmation, PurchaseOrchestrator,
    PurchaseRecord, PurchasedCourse, RechargeRecord, UserId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

type Orchestrator = PurchaseOrchestrator<InMemoryCatalog, InMemoryUserDirectory>;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub course_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct RechargeRequest {
    pub amount: Decimal,
    pub remark: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IncomeResponse {
    pub instructor_id: UserId,
    pub total_income: Decimal,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

// === Caller Identity ===

/// Authenticated caller, read from the `x-user-id` header.
pub struct Caller(UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok())
            .map(|id| Caller(UserId(id)))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "not signed in".to_string(),
                        code: "UNAUTHORIZED".to_string(),
                    }),
                )
                    .into_response()
            })
    }
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::CourseNotFound(_) | LedgerError::AccountNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::CourseNotPublished(_) | LedgerError::InvalidAmount => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::AlreadyPurchased { .. } | LedgerError::DuplicateAccount(_) => {
                StatusCode::CONFLICT
            }
            LedgerError::InsufficientFunds { .. } | LedgerError::AmountOverflow => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::Catalog(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::PurchaseCommitFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

async fn recharge(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Json(request): Json<RechargeRequest>,
) -> Result<(StatusCode, Json<RechargeRecord>), AppError> {
    let record = state
        .orchestrator
        .recharge(user_id, request.amount, request.remark)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn balance_info(State(state): State<AppState>, Caller(user_id): Caller) -> Json<BalanceInfo> {
    Json(state.orchestrator.balance_info(user_id))
}

async fn recharge_history(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Json<Vec<RechargeRecord>> {
    Json(state.orchestrator.recharge_history(user_id))
}

async fn purchase_course(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Json(request): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseConfirmation>), AppError> {
    let confirmation = state
        .orchestrator
        .purchase_course(user_id, CourseId(request.course_id))?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

async fn check_purchase(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(course_id): Path<u32>,
) -> Json<bool> {
    Json(state.orchestrator.has_purchased(user_id, CourseId(course_id)))
}

async fn my_courses(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> Result<Json<Vec<PurchasedCourse>>, AppError> {
    Ok(Json(state.orchestrator.list_purchases_for_user(user_id)?))
}

async fn sales(
    State(state): State<AppState>,
    Caller(instructor_id): Caller,
) -> Json<Vec<PurchaseRecord>> {
    Json(state.orchestrator.list_sales_for_instructor(instructor_id))
}

async fn income(State(state): State<AppState>, Caller(instructor_id): Caller) -> Json<IncomeResponse> {
    Json(IncomeResponse {
        instructor_id,
        total_income: state.orchestrator.total_income_for_instructor(instructor_id),
    })
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/balance/recharge", post(recharge))
        .route("/balance/info", get(balance_info))
        .route("/balance/recharge-history", get(recharge_history))
        .route("/purchase/course", post(purchase_course))
        .route("/purchase/check/{course_id}", get(check_purchase))
        .route("/purchase/my-courses", get(my_courses))
        .route("/purchase/sales", get(sales))
        .route("/purchase/income", get(income))
        .with_state(state)
}

fn demo_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.insert_course(Course {
        id: CourseId(1),
        title: "Intro to Rust".to_string(),
        price: dec!(50.00),
        instructor_id: UserId(100),
        status: CourseStatus::Published,
        cover_image: Some("/covers/intro-to-rust.png".to_string()),
    });
    catalog.insert_course(Course {
        id: CourseId(2),
        title: "Async in Practice".to_string(),
        price: dec!(99.90),
        instructor_id: UserId(100),
        status: CourseStatus::Published,
        cover_image: None,
    });
    catalog
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_ledger=info,server=info".to_string()),
        )
        .init();

    let users = InMemoryUserDirectory::new();
    users.insert(UserId(100), "ferris");

    let state = AppState {
        orchestrator: Arc::new(PurchaseOrchestrator::new(
            LedgerConfig::default(),
            Arc::new(demo_catalog()),
            Arc::new(users),
        )),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    info!("course ledger API listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
