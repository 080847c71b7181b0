//! Expenses and vendors API endpoints.

use api_types::{
    expense::{ExpenseNew, ExpenseUpdate},
    result::ActionResult,
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use engine::{
    PaymentMethod, RecordExpenseCmd, Transaction, TransactionStatus, UpdateExpenseCmd, Vendor,
};
use uuid::Uuid;

use crate::{
    ServerError, done,
    extract::{Path, Payload},
    server::ServerState,
    user::CurrentUser,
};

pub async fn expense_new(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Payload(payload): Payload<ExpenseNew>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let mut cmd = RecordExpenseCmd::new(
        user.username,
        payload.description,
        payload.amount_minor,
        payload.category,
        payload.occurred_at.with_timezone(&Utc),
    );
    cmd.vendor_name = payload.vendor;
    cmd.receipt_url = payload.receipt_url;
    if let Some(method) = payload.payment_method.as_deref() {
        cmd.payment_method = PaymentMethod::try_from(method)?;
    }
    if let Some(status) = payload.status.as_deref() {
        cmd.status = TransactionStatus::try_from(status)?;
    }

    let tx = state.engine.record_expense(cmd).await?;
    Ok(done(StatusCode::CREATED, tx))
}

pub async fn update(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<ExpenseUpdate>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let mut cmd = UpdateExpenseCmd::new(id, user.username);
    cmd.amount_minor = payload.amount_minor;
    cmd.description = payload.description;
    cmd.occurred_at = payload.occurred_at.map(|at| at.with_timezone(&Utc));
    cmd.vendor_name = payload.vendor;
    cmd.receipt_url = payload.receipt_url;
    cmd.payment_method = payload
        .payment_method
        .as_deref()
        .map(PaymentMethod::try_from)
        .transpose()?;

    let tx = state.engine.update_expense(cmd).await?;
    Ok(done(StatusCode::OK, tx))
}

pub async fn delete(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<()>>), ServerError> {
    state.engine.delete_expense(id, &user.username).await?;
    Ok((StatusCode::OK, Json(ActionResult::done())))
}

pub async fn vendors(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<ActionResult<Vec<Vendor>>>), ServerError> {
    let vendors = state.engine.vendors(&user.username).await?;
    Ok(done(StatusCode::OK, vendors))
}
