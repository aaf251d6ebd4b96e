use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::application::referral_program::{OrderUpdate, ReferralProgram};
use crate::domain::entities::customer::{Customer, NewCustomer};
use crate::domain::entities::order::{NewOrder, OrderState, PosOrder};
use crate::domain::entities::tracking::ReferralTracking;
use crate::domain::errors::ReferralError;
use crate::domain::services::customer_stats::CustomerReferralSummary;
use crate::domain::services::promo_sweep::SweepReport;
use crate::domain::services::tracking_lifecycle::ManualTracking;

type AppState = Arc<ReferralProgram>;

/// Largest accepted JSON body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn error_response(err: ReferralError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ReferralError::NotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
        e => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Customer as returned by the API; the QR image is served separately
#[derive(Debug, Serialize, Deserialize)]
pub struct CustomerResponse {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub customer_rank: i64,
    pub referral_code: Option<String>,
    pub has_qr_image: bool,
    pub referred_by_id: Option<i64>,
    pub referral_email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub referral_count: i64,
    pub reward_total: f64,
    pub is_eligible: bool,
}

impl CustomerResponse {
    fn new(customer: Customer, summary: CustomerReferralSummary) -> Self {
        Self {
            has_qr_image: customer.has_qr_image(),
            id: customer.id,
            name: customer.name,
            email: customer.email,
            customer_rank: customer.customer_rank,
            referral_code: customer.referral_code,
            referred_by_id: customer.referred_by_id,
            referral_email_sent: customer.referral_email_sent,
            created_at: customer.created_at,
            referral_count: summary.referral_count,
            reward_total: summary.reward_total,
            is_eligible: summary.is_eligible,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub state: OrderState,
    pub amount_total: f64,
    pub currency: String,
    pub date_order: DateTime<Utc>,
    pub referral_code: Option<String>,
    /// A non-blank referral code was entered at checkout
    pub is_referred: bool,
}

impl From<PosOrder> for OrderResponse {
    fn from(order: PosOrder) -> Self {
        let is_referred = order.is_referred();
        Self {
            id: order.id,
            customer_id: order.customer_id,
            state: order.state,
            amount_total: order.amount_total,
            currency: order.currency,
            date_order: order.date_order,
            referral_code: order.referral_code,
            is_referred,
        }
    }
}

/// Order write result with the referrals it created or refreshed
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderUpdateResponse {
    pub order: OrderResponse,
    pub referrals: Vec<ReferralTracking>,
}

impl From<OrderUpdate> for OrderUpdateResponse {
    fn from(update: OrderUpdate) -> Self {
        Self {
            order: update.order.into(),
            referrals: update.referral.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderStateRequest {
    pub state: OrderState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderAmountRequest {
    pub amount_total: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardPercentageRequest {
    pub reward_percentage: f64,
}

/// HTTP routes of the referral program
pub fn router(program: Arc<ReferralProgram>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/customers", post(create_customer))
        .route("/customers/:id", get(get_customer))
        .route("/customers/:id/referrals", get(get_customer_referrals))
        .route("/customers/:id/qr.png", get(get_customer_qr))
        .route("/orders", post(create_order))
        .route("/orders/:id/state", post(set_order_state))
        .route("/orders/:id/amount", post(set_order_amount))
        .route("/referrals", post(create_referral))
        .route("/referrals/:id", get(get_referral))
        .route("/referrals/:id/validate", post(validate_referral))
        .route("/referrals/:id/reward", post(reward_referral))
        .route("/referrals/:id/cancel", post(cancel_referral))
        .route("/referrals/:id/percentage", post(set_reward_percentage))
        .route("/sweep/referral-emails", post(run_referral_email_sweep))
        .with_state(program)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "running" }))
}

async fn customer_response(program: &ReferralProgram, customer: Customer) -> ApiResult<CustomerResponse> {
    let summary = program
        .referral_summary(customer.id)
        .await
        .map_err(error_response)?;
    Ok(CustomerResponse::new(customer, summary))
}

pub async fn create_customer(
    State(program): State<AppState>,
    Json(new_customer): Json<NewCustomer>,
) -> ApiResult<(StatusCode, Json<CustomerResponse>)> {
    let customer = program
        .create_customer(new_customer)
        .await
        .map_err(error_response)?;
    let response = customer_response(&program, customer).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_customer(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CustomerResponse>> {
    let customer = program.customer(id).await.map_err(error_response)?;
    Ok(Json(customer_response(&program, customer).await?))
}

pub async fn get_customer_referrals(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ReferralTracking>>> {
    program.referrals_of(id).await.map(Json).map_err(error_response)
}

pub async fn get_customer_qr(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<([(header::HeaderName, &'static str); 1], Vec<u8>)> {
    let customer = program.customer(id).await.map_err(error_response)?;
    match customer.referral_qr_image {
        Some(png) if !png.is_empty() => Ok(([(header::CONTENT_TYPE, "image/png")], png)),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Customer {} has no referral QR image", id),
            }),
        )),
    }
}

pub async fn create_order(
    State(program): State<AppState>,
    Json(new_order): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<OrderUpdateResponse>)> {
    let update = program.create_order(new_order).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(update.into())))
}

pub async fn set_order_state(
    State(program): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<OrderStateRequest>,
) -> ApiResult<Json<OrderUpdateResponse>> {
    let update = program
        .set_order_state(id, request.state)
        .await
        .map_err(error_response)?;
    Ok(Json(update.into()))
}

pub async fn set_order_amount(
    State(program): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<OrderAmountRequest>,
) -> ApiResult<Json<OrderUpdateResponse>> {
    let (order, referrals) = program
        .set_order_amount(id, request.amount_total)
        .await
        .map_err(error_response)?;
    Ok(Json(OrderUpdateResponse {
        order: order.into(),
        referrals,
    }))
}

pub async fn create_referral(
    State(program): State<AppState>,
    Json(manual): Json<ManualTracking>,
) -> ApiResult<(StatusCode, Json<ReferralTracking>)> {
    let tracking = program
        .create_manual_tracking(manual)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(tracking)))
}

pub async fn get_referral(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReferralTracking>> {
    program.referral(id).await.map(Json).map_err(error_response)
}

pub async fn validate_referral(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReferralTracking>> {
    program.validate_referral(id).await.map(Json).map_err(error_response)
}

pub async fn reward_referral(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReferralTracking>> {
    program.reward_referral(id).await.map(Json).map_err(error_response)
}

pub async fn cancel_referral(
    State(program): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReferralTracking>> {
    program.cancel_referral(id).await.map(Json).map_err(error_response)
}

pub async fn set_reward_percentage(
    State(program): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<RewardPercentageRequest>,
) -> ApiResult<Json<ReferralTracking>> {
    program
        .set_reward_percentage(id, request.reward_percentage)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Manual trigger of the referral email sweep
pub async fn run_referral_email_sweep(State(program): State<AppState>) -> ApiResult<Json<SweepReport>> {
    program
        .run_referral_email_sweep()
        .await
        .map(Json)
        .map_err(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferralConfig;
    use crate::domain::entities::tracking::TrackingState;
    use crate::domain::repositories::{MailError, ReferralMailer};
    use crate::infrastructure::qr_png::PngQrRenderer;
    use crate::persistence::init_database;
    use crate::persistence::repository::{
        SqliteCustomerRepository, SqliteOrderRepository, SqliteTrackingRepository,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    struct AcceptingMailer;

    #[async_trait]
    impl ReferralMailer for AcceptingMailer {
        async fn send_referral_code(&self, _customer: &Customer) -> Result<(), MailError> {
            Ok(())
        }
    }

    async fn app() -> Router {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let program = ReferralProgram::new(
            Arc::new(SqliteCustomerRepository::new(pool.clone())),
            Arc::new(SqliteOrderRepository::new(pool.clone())),
            Arc::new(SqliteTrackingRepository::new(pool)),
            Arc::new(PngQrRenderer::new()),
            Arc::new(AcceptingMailer),
            &ReferralConfig::default(),
        );
        router(Arc::new(program))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_referral_flow_over_http() {
        let app = app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/customers",
            Some(serde_json::json!({ "name": "Alice", "email": "alice@example.com", "customer_rank": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let alice: CustomerResponse = parse(&body);
        let code = alice.referral_code.clone().unwrap();
        assert!(code.starts_with("REF-ALICE-"));
        assert!(alice.has_qr_image);

        let (status, png) = send(&app, "GET", &format!("/customers/{}/qr.png", alice.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(png.starts_with(b"\x89PNG"));

        let (_, body) = send(
            &app,
            "POST",
            "/customers",
            Some(serde_json::json!({ "name": "Bob" })),
        )
        .await;
        let bob: CustomerResponse = parse(&body);

        let (status, body) = send(
            &app,
            "POST",
            "/orders",
            Some(serde_json::json!({
                "customer_id": bob.id,
                "amount_total": 80.0,
                "currency": "EUR",
                "referral_code": code
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: OrderUpdateResponse = parse(&body);
        assert_eq!(created.order.state, OrderState::Draft);
        assert!(created.order.is_referred);
        assert!(created.referrals.is_empty());

        let (status, body) = send(
            &app,
            "POST",
            &format!("/orders/{}/state", created.order.id),
            Some(serde_json::json!({ "state": "paid" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let paid: OrderUpdateResponse = parse(&body);
        assert_eq!(paid.referrals.len(), 1);
        let referral = &paid.referrals[0];
        assert_eq!(referral.state, TrackingState::Validated);

        let (status, body) = send(&app, "POST", &format!("/referrals/{}/reward", referral.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let rewarded: ReferralTracking = parse(&body);
        assert_eq!(rewarded.state, TrackingState::Rewarded);
        assert_eq!(rewarded.reward_amount, 8.0);

        let (_, body) = send(&app, "GET", &format!("/customers/{}", alice.id), None).await;
        let alice: CustomerResponse = parse(&body);
        assert_eq!(alice.reward_total, 8.0);

        let (_, body) = send(&app, "GET", &format!("/customers/{}/referrals", alice.id), None).await;
        let referrals: Vec<ReferralTracking> = parse(&body);
        assert_eq!(referrals.len(), 1);

        let (status, body) = send(
            &app,
            "POST",
            "/orders",
            Some(serde_json::json!({
                "customer_id": bob.id,
                "amount_total": 12.0,
                "currency": "EUR",
                "referral_code": "   "
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let plain: OrderUpdateResponse = parse(&body);
        assert!(!plain.order.is_referred);
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let app = app().await;

        let (status, body) = send(&app, "GET", "/referrals/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorResponse = parse(&body);
        assert!(error.error.contains("99"));

        let (_, body) = send(
            &app,
            "POST",
            "/customers",
            Some(serde_json::json!({ "name": "Alice", "customer_rank": 1 })),
        )
        .await;
        let alice: CustomerResponse = parse(&body);

        let (status, _) = send(
            &app,
            "POST",
            "/referrals",
            Some(serde_json::json!({ "sponsor_id": alice.id, "referred_id": alice.id })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = send(&app, "POST", "/customers", Some(serde_json::json!({ "name": "Bob" }))).await;
        let bob: CustomerResponse = parse(&body);
        let (status, body) = send(
            &app,
            "POST",
            "/referrals",
            Some(serde_json::json!({ "sponsor_id": alice.id, "referred_id": bob.id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let pending: ReferralTracking = parse(&body);
        assert_eq!(pending.state, TrackingState::Pending);

        // Pending entries cannot be rewarded
        let (status, _) = send(&app, "POST", &format!("/referrals/{}/reward", pending.id), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/referrals/{}/percentage", pending.id),
            Some(serde_json::json!({ "reward_percentage": 150.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, "GET", &format!("/customers/{}/qr.png", bob.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_sweep_trigger() {
        let app = app().await;
        let (status, body) = send(&app, "POST", "/sweep/referral-emails", None).await;
        assert_eq!(status, StatusCode::OK);
        let report: SweepReport = parse(&body);
        assert_eq!(report.selected, 0);
    }
}
