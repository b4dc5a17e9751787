use crate::{
    config::AppConfig,
    database::MongoDB,
    middleware::auth::optional_claims,
    models::{
        BrowseQuery, CreateReviewRequest, PaperListItem, PaperResponse, ReviewResponse, UpdatePaperRequest,
        UploadPaperRequest,
    },
    services::{auth_service::Claims, paper_service, review_service, Integrations},
};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

#[utoipa::path(
    get,
    path = "/api/v1/papers",
    tag = "Papers",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Approved papers, paginated", body = [PaperListItem])
    )
)]
pub async fn browse_papers(db: web::Data<MongoDB>, query: web::Query<BrowseQuery>) -> HttpResponse {
    log::info!(
        "🔎 GET /papers - search: {:?}, category: {:?}, sort: {:?}",
        query.search, query.category, query.sort
    );

    match paper_service::browse_papers(&db, &query).await {
        Ok(page) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "papers": page.papers.into_iter().map(PaperListItem::from).collect::<Vec<_>>(),
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
        })),
        Err(e) => {
            log::error!("❌ Browse failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/papers/categories",
    tag = "Papers",
    responses((status = 200, description = "Categories of approved papers", body = [String]))
)]
pub async fn get_categories(db: web::Data<MongoDB>) -> HttpResponse {
    log::info!("🏷️  GET /papers/categories");

    match paper_service::categories(&db).await {
        Ok(categories) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "categories": categories,
        })),
        Err(e) => {
            log::error!("❌ Failed to load categories: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/papers/{id}",
    tag = "Papers",
    params(("id" = String, Path, description = "Paper id")),
    responses(
        (status = 200, description = "Paper details", body = PaperResponse),
        (status = 404, description = "Paper not found")
    )
)]
pub async fn get_paper(req: HttpRequest, db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let paper_id = path.into_inner();
    let viewer = optional_claims(&req);
    log::info!("📄 GET /papers/{} - viewer: {:?}", paper_id, viewer.as_ref().map(|c| &c.sub));

    match paper_service::get_paper(&db, &paper_id, viewer.as_ref()).await {
        Ok(paper) => {
            let include_checks = viewer
                .as_ref()
                .map(|claims| paper_service::can_manage(claims, &paper))
                .unwrap_or(false);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "paper": PaperResponse::from_paper(paper, include_checks),
            }))
        }
        Err(e) => {
            log::warn!("❌ Paper {} unavailable: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/papers",
    tag = "Papers",
    request_body = UploadPaperRequest,
    responses(
        (status = 201, description = "Paper uploaded, checks started", body = PaperResponse),
        (status = 400, description = "Invalid paper or file"),
        (status = 403, description = "Only researchers can upload")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_paper(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    config: web::Data<AppConfig>,
    user: web::ReqData<Claims>,
    request: web::Json<UploadPaperRequest>,
) -> HttpResponse {
    log::info!("📤 POST /papers - author: {}, title: {}", user.sub, request.title);

    match paper_service::upload_paper(&db, &integrations, &config, &user, request.into_inner()).await {
        Ok(paper) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "paper": PaperResponse::from_paper(paper, true),
        })),
        Err(e) => {
            log::warn!("❌ Upload by {} failed: {}", user.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/papers/mine",
    tag = "Papers",
    responses((status = 200, description = "Papers of the current researcher", body = [PaperResponse])),
    security(("bearer_auth" = []))
)]
pub async fn my_papers(db: web::Data<MongoDB>, user: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📚 GET /papers/mine - author: {}", user.sub);

    match paper_service::list_author_papers(&db, &user.sub).await {
        Ok(papers) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "papers": papers
                .into_iter()
                .map(|p| PaperResponse::from_paper(p, true))
                .collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::error!("❌ Failed to list papers for {}: {}", user.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/papers/{id}",
    tag = "Papers",
    params(("id" = String, Path, description = "Paper id")),
    request_body = UpdatePaperRequest,
    responses(
        (status = 200, description = "Paper updated", body = PaperResponse),
        (status = 400, description = "Approved papers cannot be edited"),
        (status = 403, description = "Not the author")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_paper(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    config: web::Data<AppConfig>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdatePaperRequest>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("✏️  PUT /papers/{} - user: {}", paper_id, user.sub);

    match paper_service::update_paper(&db, &integrations, &config, &user, &paper_id, request.into_inner()).await {
        Ok(paper) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "paper": PaperResponse::from_paper(paper, true),
        })),
        Err(e) => {
            log::warn!("❌ Update of paper {} failed: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/papers/{id}",
    tag = "Papers",
    params(("id" = String, Path, description = "Paper id")),
    responses(
        (status = 200, description = "Paper deleted"),
        (status = 403, description = "Not the author or an admin")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_paper(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("🗑️  DELETE /papers/{} - user: {}", paper_id, user.sub);

    match paper_service::delete_paper(&db, &integrations, &user, &paper_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Paper deleted",
        })),
        Err(e) => {
            log::warn!("❌ Delete of paper {} failed: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/papers/{id}/checks",
    tag = "Papers",
    params(("id" = String, Path, description = "Paper id")),
    responses(
        (status = 200, description = "Grammar and plagiarism reports"),
        (status = 409, description = "Checks already running"),
        (status = 429, description = "Plagiarism service rate limit exhausted")
    ),
    security(("bearer_auth" = []))
)]
pub async fn run_checks(
    db: web::Data<MongoDB>,
    integrations: web::Data<Integrations>,
    config: web::Data<AppConfig>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("🧪 POST /papers/{}/checks - user: {}", paper_id, user.sub);

    match paper_service::rerun_checks(&db, &integrations, &config, &user, &paper_id).await {
        Ok(checks) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "checks": checks,
        })),
        Err(e) => {
            log::warn!("❌ Checks for paper {} failed: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/papers/{id}/download",
    tag = "Papers",
    params(("id" = String, Path, description = "Paper id")),
    responses(
        (status = 200, description = "Download URL"),
        (status = 403, description = "Purchase required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_paper(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("📥 GET /papers/{}/download - user: {}", paper_id, user.sub);

    match paper_service::download_paper(&db, &user, &paper_id).await {
        Ok(url) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "url": url,
        })),
        Err(e) => {
            log::warn!("❌ Download of {} refused for {}: {}", paper_id, user.sub, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/papers/{id}/reviews",
    tag = "Reviews",
    params(("id" = String, Path, description = "Paper id")),
    responses((status = 200, description = "Reviews, newest first", body = [ReviewResponse]))
)]
pub async fn list_reviews(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("💬 GET /papers/{}/reviews", paper_id);

    match review_service::list_paper_reviews(&db, &paper_id).await {
        Ok(reviews) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "reviews": reviews.into_iter().map(ReviewResponse::from).collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::warn!("❌ Failed to list reviews of {}: {}", paper_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/papers/{id}/reviews",
    tag = "Reviews",
    params(("id" = String, Path, description = "Paper id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = ReviewResponse),
        (status = 403, description = "Author or purchase required"),
        (status = 409, description = "Already reviewed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_review(
    db: web::Data<MongoDB>,
    user: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<CreateReviewRequest>,
) -> HttpResponse {
    let paper_id = path.into_inner();
    log::info!("⭐ POST /papers/{}/reviews - user: {}", paper_id, user.sub);

    match review_service::add_review(&db, &user, &paper_id, request.into_inner()).await {
        Ok(review) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "review": ReviewResponse::from(review),
        })),
        Err(e) => {
            log::warn!("❌ Review of {} by {} failed: {}", paper_id, user.sub, e);
            e.error_response()
        }
    }
}
