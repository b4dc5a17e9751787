use crate::{
    config::AppConfig,
    database::MongoDB,
    models::{PaperResponse, PaymentResponse, ReviewPaperRequest, SettlePayoutRequest, UserInfo},
    services::{
        admin_service::{self, ChangeRoleRequest, ChangeStatusRequest, PaperStatusFilter, PayoutStatusFilter, UserFilter},
        auth_service::Claims,
        earnings_service, paper_service, Integrations,
    },
};
use actix_web::{web, HttpResponse, ResponseError};

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "Admin",
    params(UserFilter),
    responses((status = 200, description = "Users, newest first", body = [UserInfo])),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    query: web::Query<UserFilter>,
) -> HttpResponse {
    log::info!("👥 GET /admin/users - role: {:?}", query.role);

    match admin_service::list_users(&db, &user, query.role).await {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": users.len(),
            "users": users,
        })),
        Err(e) => {
            log::error!("❌ Failed to list users: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/role",
    tag = "Admin",
    params(("id" = String, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = UserInfo),
        (status = 400, description = "Cannot demote yourself")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_role(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ChangeRoleRequest>,
) -> HttpResponse {
    let user_id = path.into_inner();
    log::info!("👤 PUT /admin/users/{}/role - role: {}", user_id, request.role);

    match admin_service::change_role(&db, &user, &user_id, request.role).await {
        Ok(info) => HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": info })),
        Err(e) => {
            log::warn!("❌ Role change for {} failed: {}", user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}/status",
    tag = "Admin",
    params(("id" = String, Path, description = "User id")),
    request_body = ChangeStatusRequest,
    responses(
        (status = 200, description = "Account (de)activated", body = UserInfo),
        (status = 400, description = "Cannot deactivate yourself")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_status(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ChangeStatusRequest>,
) -> HttpResponse {
    let user_id = path.into_inner();
    log::info!("👤 PUT /admin/users/{}/status - active: {}", user_id, request.is_active);

    match admin_service::set_active(&db, &user, &user_id, request.is_active).await {
        Ok(info) => HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": info })),
        Err(e) => {
            log::warn!("❌ Status change for {} failed: {}", user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/papers",
    tag = "Admin",
    params(PaperStatusFilter),
    responses((status = 200, description = "Papers in any status", body = [PaperResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_papers(db: web::Data<MongoDB>, query: web::Query<PaperStatusFilter>) -> HttpResponse {
    log::info!("📚 GET /admin/papers - status: {:?}", query.status);

    match paper_service::list_papers_by_status(&db, query.status, None).await {
        Ok(papers) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": papers.len(),
            "papers": papers
                .into_iter()
                .map(|p| PaperResponse::from_paper(p, true))
                .collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::error!("❌ Failed to list papers: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/papers/{id}/review",
    tag = "Admin",
    params(("id" = String, Path, description = "Paper id")),
    request_body = ReviewPaperRequest,
    responses(
        (status = 200, description = "Paper approved or rejected", body = PaperResponse),
        (status = 400, description = "Transition not allowed or reason missing"),
        (status = 409, description = "Reviewed concurrently")
    ),
    security(("bearer_auth" = []))
)]
pub async fn review_paper(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    config: web::Data<AppConfig>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ReviewPaperRequest>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("⚖️  PUT /admin/papers/{}/review - decision: {:?}", paper_id, request.decision);

    match paper_service::review_paper(&db, &integrations, &config, &user, &paper_id, request.into_inner()).await {
        Ok(paper) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "paper": PaperResponse::from_paper(paper, true),
        })),
        Err(e) => {
            log::warn!("❌ Review of paper {} failed: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/payouts",
    tag = "Admin",
    params(PayoutStatusFilter),
    responses((status = 200, description = "Payout requests", body = [PaymentResponse])),
    security(("bearer_auth" = []))
)]
pub async fn list_payouts(db: web::Data<MongoDB>, query: web::Query<PayoutStatusFilter>) -> HttpResponse {
    log::info!("🏦 GET /admin/payouts - status: {:?}", query.status);

    match earnings_service::list_payouts(&db, query.status).await {
        Ok(payouts) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": payouts.len(),
            "payouts": payouts.into_iter().map(PaymentResponse::from).collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::error!("❌ Failed to list payouts: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/payouts/{id}/settle",
    tag = "Admin",
    params(("id" = String, Path, description = "Payout payment id")),
    request_body = SettlePayoutRequest,
    responses(
        (status = 200, description = "Payout settled", body = PaymentResponse),
        (status = 409, description = "Payout already settled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn settle_payout(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<SettlePayoutRequest>,
) -> HttpResponse {
    let payout_id = path.into_inner();
    log::info!("🏦 POST /admin/payouts/{}/settle - approve: {}, admin: {}", payout_id, request.approve, user.sub);

    match earnings_service::settle_payout(&db, &integrations, &payout_id, request.approve).await {
        Ok(payout) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "payout": PaymentResponse::from(payout),
        })),
        Err(e) => {
            log::warn!("❌ Settling payout {} failed: {}", payout_id, e);
            e.error_response()
        }
    }
}
