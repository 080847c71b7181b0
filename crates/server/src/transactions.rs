//! Transactions API endpoints

use api_types::{
    result::ActionResult,
    transaction::{StatusUpdate, TransactionList},
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use engine::{Transaction, TransactionKind, TransactionListFilter, TransactionStatus};
use uuid::Uuid;

use crate::{
    ServerError, done,
    extract::{Path, Payload, Query},
    server::ServerState,
    user::CurrentUser,
};

pub async fn list(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Query(query): Query<TransactionList>,
) -> Result<(StatusCode, Json<ActionResult<Vec<Transaction>>>), ServerError> {
    let filter = TransactionListFilter {
        from: query.from.map(|dt| dt.with_timezone(&Utc)),
        to: query.to.map(|dt| dt.with_timezone(&Utc)),
        kind: query
            .kind
            .as_deref()
            .map(TransactionKind::try_from)
            .transpose()?,
        status: query
            .status
            .as_deref()
            .map(TransactionStatus::try_from)
            .transpose()?,
        student_id: query.student_id,
        invoice_id: query.invoice_id,
    };
    let txs = state
        .engine
        .list_transactions(&user.username, &filter)
        .await?;
    Ok(done(StatusCode::OK, txs))
}

pub async fn get(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<Transaction>>), ServerError> {
    let tx = state.engine.transaction(id, &user.username).await?;
    Ok(done(StatusCode::OK, tx))
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
        .update_transaction_status(id, status, &user.username)
        .await?;
    Ok(done(StatusCode::OK, tx))
}
