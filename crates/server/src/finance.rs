//! School-wide aggregates and their replay.

use api_types::result::ActionResult;
use axum::{Extension, Json, extract::State, http::StatusCode};
use engine::{FinanceReplay, SchoolFinance};

use crate::{ServerError, done, server::ServerState, user::CurrentUser};

pub async fn school(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<ActionResult<SchoolFinance>>), ServerError> {
    let finance = state.engine.school_finance(&user.username).await?;
    Ok(done(StatusCode::OK, finance))
}

pub async fn replay(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<ActionResult<FinanceReplay>>), ServerError> {
    let replay = state.engine.replay_finances(&user.username).await?;
    Ok(done(StatusCode::OK, replay))
}

pub async fn recompute(
    Extension(user): Extension<CurrentUser>,
    State(state): State<ServerState>,
) -> Result<(StatusCode, Json<ActionResult<FinanceReplay>>), ServerError> {
    let replay = state.engine.recompute_finances(&user.username).await?;
    Ok(done(StatusCode::OK, replay))
}
