use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{CheckoutRequest, CheckoutResponse, ConfirmPaymentRequest, PaymentResponse},
    services::{auth_service::Claims, payment_service, Integrations},
};
use actix_web::{web, HttpResponse, ResponseError};

#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout",
    tag = "Payments",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Stripe checkout session created", body = CheckoutResponse),
        (status = 409, description = "Paper already purchased"),
        (status = 502, description = "Stripe unavailable")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_checkout(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    config: web::Data<AppConfig>,
    user: web::ReqData<Claims>,
    request: web::Json<CheckoutRequest>,
) -> HttpResponse {
    log::info!("💳 POST /payments/checkout - user: {}, paper: {}", user.sub, request.paper_id);

    match payment_service::create_checkout(&db, &integrations, &config, &user, &request.paper_id).await {
        Ok((payment, session)) => HttpResponse::Ok().json(CheckoutResponse {
            success: true,
            payment_id: payment.id.map(|id| id.to_hex()).unwrap_or_default(),
            session_id: session.id,
            checkout_url: session.url.unwrap_or_default(),
        }),
        Err(e) => {
            log::warn!("❌ Checkout for {} failed: {}", request.paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm",
    tag = "Payments",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Current payment state after reconciliation", body = PaymentResponse),
        (status = 404, description = "Unknown session")
    ),
    security(("bearer_auth" = []))
)]
pub async fn confirm_checkout(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    user: web::ReqData<Claims>,
    request: web::Json<ConfirmPaymentRequest>,
) -> HttpResponse {
    log::info!("💳 POST /payments/confirm - user: {}, session: {}", user.sub, request.session_id);

    match payment_service::confirm_checkout(&db, &integrations, &user, &request.session_id).await {
        Ok(payment) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "payment": PaymentResponse::from(payment),
        })),
        Err(e) => {
            log::warn!("❌ Confirmation of {} failed: {}", request.session_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/payments",
    tag = "Payments",
    responses((status = 200, description = "Payments of the current user", body = [PaymentResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_payments(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🧾 GET /payments - user: {}", user.sub);

    match payment_service::list_user_payments(&db, &user.sub).await {
        Ok(payments) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "payments": payments.into_iter().map(PaymentResponse::from).collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::error!("❌ Failed to list payments for {}: {}", user.sub, e);
            e.error_response()
        }
    }
}
