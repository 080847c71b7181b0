//! Report endpoints. `?format=csv` returns the flattened CSV export, the
//! default is the report as pretty-printed JSON.

use api_types::report::{ReportFormat, ReportQuery};
use axum::{
    Extension,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use engine::export::{self, ExportRows};
use serde::Serialize;

use crate::{ServerError, extract::Query, server::ServerState, user::CurrentUser};

fn window(query: &ReportQuery) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    (
        query.start.map(|dt| dt.with_timezone(&Utc)),
        query.end.map(|dt| dt.with_timezone(&Utc)),
    )
}

fn render<R: ExportRows + Serialize>(report: &R, format: ReportFormat) -> Result<Response, ServerError> {
    let response = match format {
        ReportFormat::Csv => (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            export::to_csv(report)?,
        )
            .into_response(),
        ReportFormat::Json => (
            [(header::CONTENT_TYPE, "application/json")],
            export::to_json(report)?,
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn financial(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ServerError> {
    let (start, end) = window(&query);
    let report = state
        .engine
        .generate_financial_report(&user.username, start, end)
        .await?;
    render(&report, query.format)
}

pub async fn collection(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ServerError> {
    let (start, end) = window(&query);
    let report = state
        .engine
        .generate_collection_report(&user.username, start, end)
        .await?;
    render(&report, query.format)
}

pub async fn expense(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ServerError> {
    let (start, end) = window(&query);
    let report = state
        .engine
        .generate_expense_report(&user.username, start, end)
        .await?;
    render(&report, query.format)
}
