use crate::{
    database::MongoDB,
    models::{ReviewResponse, UpdateReviewRequest},
    services::{auth_service::Claims, review_service},
};
use actix_web::{web, HttpResponse, ResponseError};

#[utoipa::path(
    put,
    path = "/api/v1/reviews/{id}",
    tag = "Reviews",
    params(("id" = String, Path, description = "Review id")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = ReviewResponse),
        (status = 403, description = "Not the reviewer")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_review(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateReviewRequest>,
) -> HttpResponse {
    let review_id = path.into_inner();
    log::info!("✏️  PUT /reviews/{} - user: {}", review_id, user.sub);

    match review_service::update_review(&db, &user, &review_id, request.into_inner()).await {
        Ok(review) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "review": ReviewResponse::from(review),
        })),
        Err(e) => {
            log::warn!("❌ Update of review {} failed: {}", review_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}",
    tag = "Reviews",
    params(("id" = String, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review deleted"),
        (status = 403, description = "Not the reviewer or an admin")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_review(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let review_id = path.into_inner();
    log::info!("🗑️  DELETE /reviews/{} - user: {}", review_id, user.sub);

    match review_service::delete_review(&db, &user, &review_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Review deleted",
        })),
        Err(e) => {
            log::warn!("❌ Delete of review {} failed: {}", review_id, e);
            e.error_response()
        }
    }
}
