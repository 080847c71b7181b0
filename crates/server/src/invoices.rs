//! Invoices API endpoints.

use api_types::{
    invoice::{InvoiceList, InvoiceNew},
    result::ActionResult,
    transaction::StatusUpdate,
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use engine::{CreateInvoiceCmd, Invoice, InvoiceListFilter, InvoiceStatus, LineItemInput};
use uuid::Uuid;

use crate::{
    ServerError, done,
    extract::{Path, Payload, Query},
    server::ServerState,
    user::CurrentUser,
};

pub async fn invoice_new(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Payload(payload): Payload<InvoiceNew>,
) -> Result<(StatusCode, Json<ActionResult<Invoice>>), ServerError> {
    let mut cmd = CreateInvoiceCmd::new(
        payload.student_id,
        user.username,
        payload.issue_date,
        payload.due_date,
    );
    cmd.line_items = payload
        .line_items
        .into_iter()
        .map(|item| LineItemInput::new(item.description, item.amount_minor, item.quantity))
        .collect();

    let invoice = state.engine.create_invoice(cmd).await?;
    Ok(done(StatusCode::CREATED, invoice))
}

pub async fn get(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<Invoice>>), ServerError> {
    let invoice = state.engine.invoice(id, &user.username).await?;
    Ok(done(StatusCode::OK, invoice))
}

pub async fn list(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Query(query): Query<InvoiceList>,
) -> Result<(StatusCode, Json<ActionResult<Vec<Invoice>>>), ServerError> {
    let filter = InvoiceListFilter {
        student_id: query.student_id,
        status: query
            .status
            .as_deref()
            .map(InvoiceStatus::try_from)
            .transpose()?,
        as_of: None,
    };
    let invoices = state.engine.list_invoices(&user.username, &filter).await?;
    Ok(done(StatusCode::OK, invoices))
}

pub async fn update_status(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<StatusUpdate>,
) -> Result<(StatusCode, Json<ActionResult<Invoice>>), ServerError> {
    let status = InvoiceStatus::try_from(payload.status.as_str())?;
    let invoice = state
        .engine
        .update_invoice_status(id, status, &user.username)
        .await?;
    Ok(done(StatusCode::OK, invoice))
}

/// Persists the derived status of every open invoice; returns how many
/// changed.
pub async fn refresh(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<ActionResult<u64>>), ServerError> {
    let updated = state.engine.refresh_invoice_statuses(&user.username).await?;
    Ok(done(StatusCode::OK, updated))
}
