use api_types::result::ActionResult;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use engine::{EngineError, ErrorKind, export::ExportError};

use serde::Serialize;
pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};

mod expenses;
mod extract;
mod finance;
mod invoices;
mod payments;
mod reports;
mod server;
mod students;
mod transactions;
mod user;

pub enum ServerError {
    Engine(EngineError),
    Export(ExportError),
    Generic(String),
    /// A request axum could not extract: bad JSON, path or query string.
    Rejected(StatusCode, String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation | ErrorKind::OverpaymentRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        // Callers reaching a handler are authenticated; a role check failed.
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind, message) = match self {
            ServerError::Engine(err) => (
                status_for_engine_error(&err),
                err.kind(),
                message_for_engine_error(err),
            ),
            ServerError::Export(err) => {
                tracing::error!("report export failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Persistence,
                    "internal server error".to_string(),
                )
            }
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, ErrorKind::Validation, err),
            ServerError::Rejected(status, err) => (status, ErrorKind::Validation, err),
        };

        (
            status,
            Json(ActionResult::<()>::failed(kind.as_str(), message)),
        )
            .into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<ExportError> for ServerError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(value: JsonRejection) -> Self {
        Self::Rejected(value.status(), value.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(value: PathRejection) -> Self {
        Self::Rejected(value.status(), value.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(value: QueryRejection) -> Self {
        Self::Rejected(value.status(), value.body_text())
    }
}

/// Wraps a successful engine result in the boundary envelope.
pub(crate) fn done<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<ActionResult<T>>) {
    (status, Json(ActionResult::ok(data)))
}

#[cfg(test)]
mod tests {
    use sea_orm::DbErr;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn engine_unauthorized_maps_to_403() {
        let res =
            ServerError::from(EngineError::Unauthorized("viewer".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let res = ServerError::from(EngineError::KeyNotFound("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_conflict_maps_to_409() {
        let res = ServerError::from(EngineError::Conflict("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn engine_validation_and_overpayment_map_to_422() {
        let res = ServerError::from(EngineError::Validation("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let res = ServerError::from(EngineError::OverpaymentRejected {
            invoice_id: Uuid::new_v4(),
            total_minor: 1000,
            paid_minor: 1000,
            attempted_minor: 1,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn persistence_maps_to_500_with_generic_message() {
        let err = EngineError::Database(DbErr::Custom("secret detail".to_string()));
        assert_eq!(status_for_engine_error(&err), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message_for_engine_error(err), "internal server error");
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
