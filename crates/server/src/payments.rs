//! Payments API endpoints.

use api_types::{
    payment::{DirectPaymentNew, PaymentNew},
    result::ActionResult,
    transaction::StatusUpdate,
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use engine::{
    DirectPaymentCmd, PaymentMethod, RecordPaymentCmd, Transaction, TransactionStatus,
};
use uuid::Uuid;

use crate::{
    ServerError, done,
    extract::{Path, Payload},
    server::ServerState,
    user::CurrentUser,
};

pub async fn payment_new(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Payload(payload): Payload<PaymentNew>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let mut cmd = RecordPaymentCmd::new(
        payload.invoice_id,
        user.username,
        payload.amount_minor,
        PaymentMethod::try_from(payload.payment_method.as_str())?,
        payload.occurred_at.with_timezone(&Utc),
    );
    cmd.reference = payload.reference;

    let tx = state.engine.record_payment(cmd).await?;
    Ok(done(StatusCode::CREATED, tx))
}

pub async fn direct_payment_new(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Payload(payload): Payload<DirectPaymentNew>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let mut cmd = DirectPaymentCmd::new(
        payload.student_id,
        user.username,
        payload.amount_minor,
        PaymentMethod::try_from(payload.payment_method.as_str())?,
        payload.occurred_at.with_timezone(&Utc),
    );
    cmd.reference = payload.reference;
    cmd.description = payload.description;

    let tx = state.engine.create_direct_payment(cmd).await?;
    Ok(done(StatusCode::CREATED, tx))
}

pub async fn update_status(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<StatusUpdate>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let status = TransactionStatus::try_from(payload.status.as_str())?;
    let tx = state
        .engine
        .update_payment_status(id, status, &user.username)
        .await?;
    Ok(done(StatusCode::OK, tx))
}

pub async fn delete(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<()>>), ServerError> {
    state.engine.delete_payment(id, &user.username).await?;
    Ok((StatusCode::OK, Json(ActionResult::done())))
}
