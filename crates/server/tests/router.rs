use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use migration::MigratorTrait;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{Engine, UserRole};
use server::{ServerState, router};

async fn app() -> Router {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db).build().await.unwrap();
    engine
        .ensure_user("admin", "secret", UserRole::Admin)
        .await
        .unwrap();
    engine
        .ensure_user("viewer", "secret", UserRole::Viewer)
        .await
        .unwrap();
    router(ServerState {
        engine: Arc::new(engine),
    })
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(header::AUTHORIZATION, basic(user, "secret"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn call_json(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = call(app, method, uri, user, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let app = app().await;

    let (status, _) = call(&app, Method::GET, "/finance/school", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/finance/school")
        .header(header::AUTHORIZATION, basic("admin", "wrong"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewer_cannot_write() {
    let app = app().await;

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/students",
        Some("viewer"),
        Some(json!({ "first_name": "Ada", "last_name": "Lovelace" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "AUTHORIZATION");
}

#[tokio::test]
async fn invoice_payment_flow_over_http() {
    let app = app().await;

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/students",
        Some("admin"),
        Some(json!({ "first_name": "Ada", "last_name": "Lovelace", "grade": "5" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let student_id = body["data"]["id"].as_str().unwrap().to_string();

    let today = chrono::Utc::now().date_naive();
    let due = today + chrono::Duration::days(30);
    let (status, body) = call_json(
        &app,
        Method::POST,
        "/invoices",
        Some("admin"),
        Some(json!({
            "student_id": student_id,
            "issue_date": today.to_string(),
            "due_date": due.to_string(),
            "line_items": [{ "description": "Tuition", "amount_minor": 1000 }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "PENDING");
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/payments",
        Some("admin"),
        Some(json!({
            "invoice_id": invoice_id,
            "amount_minor": 400,
            "payment_method": "CASH",
            "occurred_at": chrono::Utc::now().to_rfc3339(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "COMPLETED");

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/payments",
        Some("admin"),
        Some(json!({
            "invoice_id": invoice_id,
            "amount_minor": 700,
            "payment_method": "CASH",
            "occurred_at": chrono::Utc::now().to_rfc3339(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_kind"], "OVERPAYMENT_REJECTED");

    let (status, body) = call_json(
        &app,
        Method::GET,
        &format!("/students/{student_id}/finance"),
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_paid_minor"], 400);
    assert_eq!(body["data"]["total_due_minor"], 600);
    assert_eq!(body["data"]["balance_minor"], -200);

    let (status, body) = call_json(
        &app,
        Method::GET,
        "/finance/school",
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_income_minor"], 1400);
}

#[tokio::test]
async fn unknown_invoice_is_404() {
    let app = app().await;

    let (status, body) = call_json(
        &app,
        Method::GET,
        &format!("/invoices/{}", uuid::Uuid::new_v4()),
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_kind"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_requests_answer_with_the_envelope() {
    let app = app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/students")
        .header(header::AUTHORIZATION, basic("admin", "secret"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "VALIDATION");

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/students",
        Some("admin"),
        Some(json!({ "first_name": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_kind"], "VALIDATION");

    let (status, body) =
        call_json(&app, Method::GET, "/invoices/not-a-uuid", Some("viewer"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "VALIDATION");

    let (status, body) = call_json(
        &app,
        Method::GET,
        "/reports/financial?start=yesterday",
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_kind"], "VALIDATION");
}

#[tokio::test]
async fn reports_export_as_csv() {
    let app = app().await;

    let (status, _) = call_json(
        &app,
        Method::POST,
        "/expenses",
        Some("admin"),
        Some(json!({
            "description": "Paper",
            "amount_minor": 250,
            "category": "Supplies",
            "vendor": "Acme",
            "occurred_at": chrono::Utc::now().to_rfc3339(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, bytes) = call(
        &app,
        Method::GET,
        "/reports/expense?format=csv",
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    assert!(csv.starts_with("\"section\",\"label\",\"amount\",\"extra\""));
    assert!(csv.contains("\"top_vendor\",\"Acme\",\"2.50\",\"\""));

    let (status, body) = call_json(
        &app,
        Method::GET,
        "/reports/financial",
        Some("viewer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_expenses_minor"], 250);
}
