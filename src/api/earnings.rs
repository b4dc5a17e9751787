use crate::{
    database::MongoDB,
    models::{PaymentResponse, PayoutRequest, ResearcherEarnings},
    services::{auth_service::Claims, earnings_service},
};
use actix_web::{web, HttpResponse, ResponseError};

#[utoipa::path(
    get,
    path = "/api/v1/earnings",
    tag = "Earnings",
    responses((status = 200, description = "Earnings ledger and milestone progress", body = ResearcherEarnings)),
    security(("bearer_auth" = []))
)]
pub async fn get_earnings(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("💰 GET /earnings - researcher: {}", user.sub);

    let earnings = match earnings_service::get_earnings(&db, &user.sub).await {
        Ok(earnings) => earnings,
        Err(e) => {
            log::error!("❌ Failed to load earnings for {}: {}", user.sub, e);
            return e.error_response();
        }
    };

    match earnings_service::total_downloads(&db, &user.sub).await {
        Ok(total) => {
            let progress = earnings_service::milestone_progress(total, &earnings.milestones_reached);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "earnings": earnings,
                "milestones": progress,
                "min_payout_cents": earnings_service::MIN_PAYOUT_CENTS,
            }))
        }
        Err(e) => {
            log::error!("❌ Failed to count downloads for {}: {}", user.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/earnings/payouts",
    tag = "Earnings",
    request_body = PayoutRequest,
    responses(
        (status = 201, description = "Payout requested", body = PaymentResponse),
        (status = 400, description = "Below minimum or above available balance")
    ),
    security(("bearer_auth" = []))
)]
pub async fn request_payout(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    request: web::Json<PayoutRequest>,
) -> HttpResponse {
    log::info!("🏦 POST /earnings/payouts - researcher: {}, amount: {}", user.sub, request.amount_cents);

    match earnings_service::request_payout(&db, &user.sub, request.amount_cents).await {
        Ok(payment) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "payout": PaymentResponse::from(payment),
        })),
        Err(e) => {
            log::warn!("❌ Payout request by {} failed: {}", user.sub, e);
            e.error_response()
        }
    }
}
