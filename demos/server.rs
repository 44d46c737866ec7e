// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP API server over the credit ledger.
//!
//! Run with: `cargo run --example server`
//!
//! # Example Requests
//!
//! ```bash
//! # Register an outlet
//! curl -X POST http://localhost:3000/outlets \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Corner Mart", "type": "Official", "credit_limit": "15000"}'
//!
//! # Register a product
//! curl -X POST http://localhost:3000/products \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Rice 5kg", "sku": "RICE-5", "price": "1000", "stock": 45, "min_stock": 10}'
//!
//! # Raise and approve a credit invoice
//! curl -X POST http://localhost:3000/invoices \
//!   -H "Content-Type: application/json" \
//!   -d '{"outlet_id": 1, "manager_id": 1, "store_id": 1, "payment_type": "Credit",
//!        "products": [{"product_id": 1, "quantity": 3}]}'
//! curl -X POST http://localhost:3000/invoices/1/approve
//!
//! # Record a payment
//! curl -X POST http://localhost:3000/outlets/1/payments \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "2000"}'
//!
//! # Dashboard
//! curl http://localhost:3000/dashboard
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use credit_ledger_rs::{
    Distribution, DistributionId, DistributionStatus, Engine, Invoice, InvoiceId, LedgerError,
    NewDistribution, NewInvoice, NewOutlet, NewProduct, OutletId, OutletRecord, Product,
    ProductId, Settled,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreditLimitRequest {
    pub credit_limit: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: DistributionStatus,
}

/// An entity with the credit warning its operation produced, if any.
#[derive(Debug, Serialize)]
pub struct SettledResponse<T> {
    #[serde(flatten)]
    pub entity: T,
    pub warning: Option<String>,
}

impl<T> From<Settled<T>> for SettledResponse<T> {
    fn from(settled: Settled<T>) -> Self {
        SettledResponse {
            entity: settled.entity,
            warning: settled.warning.map(|w| w.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub low_stock: Vec<Product>,
    pub outlets_near_limit: Vec<OutletRecord>,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ledger engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
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
        let (status, code) = match &self.0 {
            LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            LedgerError::OutletBlocked(_) => (StatusCode::FORBIDDEN, "OUTLET_BLOCKED"),
            LedgerError::InsufficientStock { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_STOCK")
            }
            LedgerError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            LedgerError::AlreadyFinalized { .. } => (StatusCode::CONFLICT, "ALREADY_FINALIZED"),
            LedgerError::Overpayment { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "OVERPAYMENT"),
            LedgerError::OutletNotFound(_) => (StatusCode::NOT_FOUND, "OUTLET_NOT_FOUND"),
            LedgerError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
            LedgerError::InvoiceNotFound(_) => (StatusCode::NOT_FOUND, "INVOICE_NOT_FOUND"),
            LedgerError::DistributionNotFound(_) => {
                (StatusCode::NOT_FOUND, "DISTRIBUTION_NOT_FOUND")
            }
            LedgerError::DuplicateSku(_) => (StatusCode::CONFLICT, "DUPLICATE_SKU"),
            LedgerError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;
type Created<T> = Result<(StatusCode, Json<T>), AppError>;

// === Outlet Handlers ===

/// POST /outlets - Register an outlet.
async fn create_outlet(
    State(state): State<AppState>,
    Json(request): Json<NewOutlet>,
) -> Created<OutletRecord> {
    let outlet = state.engine.register_outlet(request)?;
    Ok((StatusCode::CREATED, Json(outlet)))
}

/// GET /outlets - List all outlets.
async fn list_outlets(State(state): State<AppState>) -> Json<Vec<OutletRecord>> {
    Json(state.engine.outlets())
}

/// GET /outlets/{id} - Get an outlet with its credit history.
async fn get_outlet(State(state): State<AppState>, Path(id): Path<u32>) -> ApiResult<OutletRecord> {
    let outlet_id = OutletId(id);
    state
        .engine
        .outlet(outlet_id)
        .map(Json)
        .ok_or(AppError(LedgerError::OutletNotFound(outlet_id)))
}

/// PUT /outlets/{id}/credit-limit
async fn update_credit_limit(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<CreditLimitRequest>,
) -> ApiResult<OutletRecord> {
    Ok(Json(state.engine.update_credit_limit(OutletId(id), request.credit_limit)?))
}

/// POST /outlets/{id}/payments
async fn receive_payment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<OutletRecord> {
    Ok(Json(state.engine.receive_payment(OutletId(id), request.amount)?))
}

/// POST /outlets/{id}/block
async fn block_outlet(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<BlockRequest>,
) -> ApiResult<OutletRecord> {
    Ok(Json(state.engine.block_outlet(OutletId(id), request.reason)?))
}

/// POST /outlets/{id}/unblock
async fn unblock_outlet(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<OutletRecord> {
    Ok(Json(state.engine.unblock_outlet(OutletId(id))?))
}

// === Product Handlers ===

async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Created<Product> {
    let product = state.engine.register_product(request)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    Json(state.engine.products())
}

async fn restock_product(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<RestockRequest>,
) -> ApiResult<Product> {
    Ok(Json(state.engine.restock_product(ProductId(id), request.quantity)?))
}

// === Invoice Handlers ===

async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<NewInvoice>,
) -> Created<Invoice> {
    let invoice = state.engine.create_invoice(request)?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices(State(state): State<AppState>) -> Json<Vec<Invoice>> {
    Json(state.engine.invoices())
}

/// POST /invoices/{id}/approve - Approve, charging credit for credit invoices.
async fn approve_invoice(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<SettledResponse<Invoice>> {
    Ok(Json(state.engine.approve_invoice(InvoiceId(id))?.into()))
}

async fn reject_invoice(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Invoice> {
    Ok(Json(state.engine.reject_invoice(InvoiceId(id))?))
}

// === Distribution Handlers ===

/// POST /distributions - Create a distribution, deducting stock.
async fn create_distribution(
    State(state): State<AppState>,
    Json(request): Json<NewDistribution>,
) -> Created<SettledResponse<Distribution>> {
    let settled = state.engine.create_distribution(request)?;
    Ok((StatusCode::CREATED, Json(settled.into())))
}

async fn list_distributions(State(state): State<AppState>) -> Json<Vec<Distribution>> {
    Json(state.engine.distributions())
}

/// PUT /distributions/{id}/status - Advance to the next status.
async fn advance_distribution(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Distribution> {
    Ok(Json(
        state
            .engine
            .advance_distribution_status(DistributionId(id), request.status)?,
    ))
}

/// DELETE /distributions/{id} - Delete a pending distribution.
async fn delete_distribution(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Distribution> {
    Ok(Json(state.engine.delete_distribution(DistributionId(id))?))
}

/// GET /dashboard - Low stock products and outlets near their limit.
async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        low_stock: state.engine.low_stock_products(),
        outlets_near_limit: state.engine.outlets_near_limit(),
    })
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/outlets", post(create_outlet).get(list_outlets))
        .route("/outlets/{id}", get(get_outlet))
        .route("/outlets/{id}/credit-limit", put(update_credit_limit))
        .route("/outlets/{id}/payments", post(receive_payment))
        .route("/outlets/{id}/block", post(block_outlet))
        .route("/outlets/{id}/unblock", post(unblock_outlet))
        .route("/products", post(create_product).get(list_products))
        .route("/products/{id}/restock", post(restock_product))
        .route("/invoices", post(create_invoice).get(list_invoices))
        .route("/invoices/{id}/approve", post(approve_invoice))
        .route("/invoices/{id}/reject", post(reject_invoice))
        .route("/distributions", post(create_distribution).get(list_distributions))
        .route("/distributions/{id}/status", put(advance_distribution))
        .route("/distributions/{id}", delete(delete_distribution))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new().with_actor("api")),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Credit ledger API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /outlets                      - Register an outlet");
    println!("  GET  /outlets[/:id]                - List outlets / get one");
    println!("  POST /outlets/:id/payments         - Record a payment");
    println!("  POST /outlets/:id/(un)block        - Block or unblock");
    println!("  POST /products, /invoices, /distributions");
    println!("  POST /invoices/:id/(approve|reject)");
    println!("  PUT  /distributions/:id/status     - Advance status");
    println!("  GET  /dashboard                    - Low stock and near-limit outlets");

    axum::serve(listener, app).await.unwrap();
}
