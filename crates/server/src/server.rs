use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};

use std::{net::SocketAddr, sync::Arc};

use crate::{expenses, finance, invoices, payments, reports, students, transactions, user};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let role = match state
        .engine
        .authenticate(auth_header.username(), auth_header.password())
        .await
    {
        Ok(role) => role,
        Err(engine::EngineError::Database(err)) => {
            tracing::error!("authentication lookup failed: {err}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    request.extensions_mut().insert(user::CurrentUser {
        username: auth_header.username().to_string(),
        role,
    });
    Ok(next.run(request).await)
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/students", post(students::student_new))
        .route("/students/{id}", get(students::get))
        .route("/students/{id}/finance", get(students::finance))
        .route("/invoices", post(invoices::invoice_new).get(invoices::list))
        .route("/invoices/refresh", post(invoices::refresh))
        .route("/invoices/{id}", get(invoices::get))
        .route("/invoices/{id}/status", patch(invoices::update_status))
        .route("/payments", post(payments::payment_new))
        .route("/payments/direct", post(payments::direct_payment_new))
        .route("/payments/{id}", axum::routing::delete(payments::delete))
        .route("/payments/{id}/status", patch(payments::update_status))
        .route("/expenses", post(expenses::expense_new))
        .route(
            "/expenses/{id}",
            patch(expenses::update).delete(expenses::delete),
        )
        .route("/vendors", get(expenses::vendors))
        .route("/transactions", get(transactions::list))
        .route("/transactions/{id}", get(transactions::get))
        .route("/transactions/{id}/status", patch(transactions::update_status))
        .route("/finance/school", get(finance::school))
        .route("/finance/replay", get(finance::replay))
        .route("/finance/recompute", post(finance::recompute))
        .route("/reports/financial", get(reports::financial))
        .route("/reports/collection", get(reports::collection))
        .route("/reports/expense", get(reports::expense))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

pub async fn run(engine: Engine, addr: SocketAddr) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: Arc::new(engine),
    };

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
