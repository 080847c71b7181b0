//! Students API endpoints.

use api_types::{result::ActionResult, student::StudentNew};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use engine::{Student, StudentFinance};
use uuid::Uuid;

use crate::{
    ServerError, done,
    extract::{Path, Payload},
    server::ServerState,
    user::CurrentUser,
};

pub async fn student_new(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Payload(payload): Payload<StudentNew>,
) -> Result<(StatusCode, Json<ActionResult<Student>>), ServerError> {
    let student = state
        .engine
        .new_student(
            &payload.first_name,
            &payload.last_name,
            payload.grade.as_deref(),
            &user.username,
        )
        .await?;
    Ok(done(StatusCode::CREATED, student))
}

pub async fn get(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<Student>>), ServerError> {
    let student = state.engine.student(id, &user.username).await?;
    Ok(done(StatusCode::OK, student))
}

pub async fn finance(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ActionResult<StudentFinance>>), ServerError> {
    let finance = state.engine.student_finance(id, &user.username).await?;
    Ok(done(StatusCode::OK, finance))
}
