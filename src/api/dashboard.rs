use crate::{
    database::MongoDB,
    services::{
        auth_service::Claims,
        dashboard_service::{self, AdminDashboard, ResearcherDashboard, UserDashboard},
    },
};
use actix_web::{web, HttpResponse, ResponseError};

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/admin",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Platform overview", body = AdminDashboard),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_dashboard(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📊 GET /dashboard/admin - admin: {}", user.sub);

    match dashboard_service::admin_dashboard(&db).await {
        Ok(dashboard) => HttpResponse::Ok().json(serde_json::json!({ "success": true, "dashboard": dashboard })),
        Err(e) => {
            log::error!("❌ Admin dashboard failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/researcher",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Papers, earnings and milestones", body = ResearcherDashboard),
        (status = 403, description = "Researchers only")
    ),
    security(("bearer_auth" = []))
)]
pub async fn researcher_dashboard(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📊 GET /dashboard/researcher - researcher: {}", user.sub);

    match dashboard_service::researcher_dashboard(&db, &user.sub).await {
        Ok(dashboard) => HttpResponse::Ok().json(serde_json::json!({ "success": true, "dashboard": dashboard })),
        Err(e) => {
            log::error!("❌ Researcher dashboard failed for {}: {}", user.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/user",
    tag = "Dashboard",
    responses((status = 200, description = "Purchases and reviews", body = UserDashboard)),
    security(("bearer_auth" = []))
)]
pub async fn user_dashboard(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📊 GET /dashboard/user - user: {}", user.sub);

    match dashboard_service::user_dashboard(&db, &user.sub).await {
        Ok(dashboard) => HttpResponse::Ok().json(serde_json::json!({ "success": true, "dashboard": dashboard })),
        Err(e) => {
            log::error!("❌ User dashboard failed for {}: {}", user.sub, e);
            e.error_response()
        }
    }
}
