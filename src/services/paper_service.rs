use crate::{
    config::AppConfig,
    database::{MongoDB, PAPERS, REVIEWS},
    models::{
        BrowseQuery, CheckStatus, PaperChecks, PaperSort, PaperStatus, ResearchPaper, Review,
        ReviewDecision, ReviewPaperRequest, UpdatePaperRequest, UploadPaperRequest,
    },
    services::{
        auth_service::{self, Claims},
        blob_service, check_service, earnings_service, email_service, now_ts, parse_object_id,
        payment_service, Integrations,
    },
    utils::error::{AppError, AppResult},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, to_bson, Bson, Document};
use mongodb::options::ReturnDocument;

pub const MAX_TITLE_LEN: usize = 300;
pub const MAX_FILE_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
/// Keeps `(page - 1) * limit` inside the i64 range `$skip` accepts
pub const MAX_PAGE: u64 = (i64::MAX / MAX_PAGE_SIZE) as u64;
/// Stripe refuses checkout amounts above this
pub const MAX_PRICE_CENTS: i64 = 99_999_999;
const MAX_KEYWORDS: usize = 10;
const RECENT_LIMIT: i64 = 10;

pub const ALLOWED_CONTENT_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// One page of browse results
#[derive(Debug)]
pub struct PaperPage {
    pub papers: Vec<ResearchPaper>,
    pub total: u64,
    pub page: u64,
    pub limit: i64,
}

// ==================== VALIDATION ====================

fn validate_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidRequest("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_non_empty(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn validate_price(price_cents: i64) -> AppResult<i64> {
    if price_cents < 0 {
        return Err(AppError::InvalidRequest("Price cannot be negative".into()));
    }
    if price_cents > MAX_PRICE_CENTS {
        return Err(AppError::InvalidRequest(format!(
            "Price cannot exceed {}",
            email_service::format_usd(MAX_PRICE_CENTS)
        )));
    }
    Ok(price_cents)
}

pub fn normalize_keywords(raw: &[String]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

/// Decodes the base64 file payload (plain or `data:` URL) and enforces type and size
pub fn decode_file(content_type: &str, payload: &str) -> AppResult<Vec<u8>> {
    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err(AppError::InvalidRequest(format!(
            "Unsupported file type: {}. Upload a PDF or Word document",
            content_type
        )));
    }

    let encoded = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    }
    .trim();

    // 4 base64 chars per 3 bytes
    if encoded.len() / 4 * 3 > MAX_FILE_BYTES + 3 {
        return Err(AppError::InvalidRequest("File exceeds the 20 MB limit".into()));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid file encoding: {}", e)))?;

    if bytes.is_empty() {
        return Err(AppError::InvalidRequest("File is empty".into()));
    }
    if bytes.len() > MAX_FILE_BYTES {
        return Err(AppError::InvalidRequest("File exceeds the 20 MB limit".into()));
    }
    Ok(bytes)
}

pub fn can_manage(claims: &Claims, paper: &ResearchPaper) -> bool {
    claims.is_admin() || paper.author_id == claims.sub
}

// ==================== UPLOAD ====================

pub async fn upload_paper(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    claims: &Claims,
    request: UploadPaperRequest,
) -> AppResult<ResearchPaper> {
    if !claims.role.can_publish() {
        return Err(AppError::Forbidden("Only researchers can upload papers".into()));
    }

    let title = validate_title(&request.title)?;
    let abstract_text = validate_non_empty("Abstract", &request.abstract_text)?;
    let category = validate_non_empty("Category", &request.category)?;
    let file_name = validate_non_empty("File name", &request.file_name)?;
    let price_cents = validate_price(request.price_cents)?;
    let bytes = decode_file(&request.content_type, &request.file_base64)?;
    let file_size = bytes.len() as i64;

    let pathname = blob_service::paper_pathname(&claims.sub, &file_name);
    let stored = integrations.blob.put(&pathname, &request.content_type, bytes).await?;

    let now = now_ts();
    let mut paper = ResearchPaper {
        id: None,
        author_id: claims.sub.clone(),
        author_name: claims.name.clone(),
        title,
        abstract_text,
        content_text: request.content_text.unwrap_or_default().trim().to_string(),
        category,
        keywords: normalize_keywords(&request.keywords),
        file_url: stored.url,
        file_pathname: stored.pathname,
        file_name,
        content_type: request.content_type,
        file_size,
        price_cents,
        status: PaperStatus::Pending,
        rejection_reason: None,
        reviewed_by: None,
        checks: PaperChecks::default(),
        view_count: 0,
        download_count: 0,
        rating_sum: 0,
        rating_count: 0,
        created_at: now,
        updated_at: now,
    };

    let result = match db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await {
        Ok(result) => result,
        Err(e) => {
            if let Err(cleanup) = integrations.blob.delete(&paper.file_url).await {
                log::warn!("⚠️  Orphaned blob {}: {}", paper.file_url, cleanup);
            }
            return Err(e.into());
        }
    };

    let paper_id = result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::DatabaseError("Inserted paper has no ObjectId".into()))?;
    paper.id = Some(paper_id);

    log::info!("📄 Paper {} uploaded by {} ({} bytes)", paper_id, claims.sub, file_size);
    check_service::spawn_checks(db.clone(), integrations.clone(), config.clone(), paper_id);

    Ok(paper)
}

// ==================== BROWSE ====================

/// Escapes regex metacharacters so user search text matches literally
pub fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}/-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn browse_filter(query: &BrowseQuery) -> Document {
    let mut filter = doc! { "status": PaperStatus::Approved.as_str() };

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = doc! { "$regex": escape_regex(search), "$options": "i" };
        filter.insert(
            "$or",
            vec![
                doc! { "title": pattern.clone() },
                doc! { "abstract_text": pattern.clone() },
                doc! { "keywords": pattern },
            ],
        );
    }
    if let Some(category) = query.category.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        filter.insert("category", category);
    }
    if query.free_only {
        filter.insert("price_cents", doc! { "$lte": 0i64 });
    }
    filter
}

pub fn sort_stage(sort: PaperSort) -> Document {
    match sort {
        PaperSort::Newest => doc! { "created_at": -1, "_id": -1 },
        PaperSort::Popular => doc! { "download_count": -1, "view_count": -1, "created_at": -1 },
        PaperSort::Rating => doc! { "avg_rating": -1, "rating_count": -1, "created_at": -1 },
    }
}

/// Resolves `(page, limit, skip)` with page clamped to 1..=MAX_PAGE and limit to 1..=100
pub fn pagination(page: Option<u64>, limit: Option<i64>) -> (u64, i64, u64) {
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let skip = (page - 1) * limit as u64;
    (page, limit, skip)
}

pub async fn browse_papers(db: &MongoDB, query: &BrowseQuery) -> AppResult<PaperPage> {
    let filter = browse_filter(query);
    let (page, limit, skip) = pagination(query.page, query.limit);
    let collection = db.collection::<ResearchPaper>(PAPERS);

    let total = collection.count_documents(filter.clone()).await?;

    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$addFields": { "avg_rating": { "$cond": [
            { "$gt": ["$rating_count", 0] },
            { "$divide": ["$rating_sum", "$rating_count"] },
            0,
        ] } } },
        doc! { "$sort": sort_stage(query.sort) },
        doc! { "$skip": skip as i64 },
        doc! { "$limit": limit },
        doc! { "$project": { "avg_rating": 0 } },
    ];

    let rows: Vec<Document> = collection.aggregate(pipeline).await?.try_collect().await?;
    let papers = rows
        .into_iter()
        .map(bson::from_document::<ResearchPaper>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::DatabaseError(format!("Malformed paper document: {}", e)))?;

    log::debug!("🔎 Browse returned {} of {} papers (page {})", papers.len(), total, page);
    Ok(PaperPage { papers, total, page, limit })
}

pub async fn categories(db: &MongoDB) -> AppResult<Vec<String>> {
    let values = db
        .collection::<ResearchPaper>(PAPERS)
        .distinct("category", doc! { "status": PaperStatus::Approved.as_str() })
        .await?;

    let mut categories: Vec<String> = values
        .into_iter()
        .filter_map(|v| match v {
            Bson::String(s) => Some(s),
            _ => None,
        })
        .collect();
    categories.sort();
    Ok(categories)
}

// ==================== SINGLE PAPER ====================

pub async fn find_paper(db: &MongoDB, paper_id: &ObjectId) -> AppResult<ResearchPaper> {
    db.collection::<ResearchPaper>(PAPERS)
        .find_one(doc! { "_id": paper_id })
        .await?
        .ok_or_else(|| AppError::NotFound("Paper not found".into()))
}

/// Approved papers are public and count a view. Others are only visible
/// to their author and admins.
pub async fn get_paper(db: &MongoDB, paper_id: &str, viewer: Option<&Claims>) -> AppResult<ResearchPaper> {
    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;

    if paper.status != PaperStatus::Approved {
        return match viewer {
            Some(claims) if can_manage(claims, &paper) => Ok(paper),
            _ => Err(AppError::NotFound("Paper not found".into())),
        };
    }

    let viewed = db
        .collection::<ResearchPaper>(PAPERS)
        .find_one_and_update(
            doc! { "_id": object_id, "status": PaperStatus::Approved.as_str() },
            doc! { "$inc": { "view_count": 1i64 } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    Ok(viewed.unwrap_or(paper))
}

pub async fn list_author_papers(db: &MongoDB, author_id: &str) -> AppResult<Vec<ResearchPaper>> {
    let cursor = db
        .collection::<ResearchPaper>(PAPERS)
        .find(doc! { "author_id": author_id })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

pub async fn list_papers_by_status(
    db: &MongoDB,
    status: Option<PaperStatus>,
    limit: Option<i64>,
) -> AppResult<Vec<ResearchPaper>> {
    let filter = match status {
        Some(status) => doc! { "status": status.as_str() },
        None => doc! {},
    };
    let mut find = db
        .collection::<ResearchPaper>(PAPERS)
        .find(filter)
        .sort(doc! { "created_at": -1 });
    if let Some(limit) = limit {
        find = find.limit(limit);
    }
    Ok(find.await?.try_collect().await?)
}

pub async fn recent_pending(db: &MongoDB) -> AppResult<Vec<ResearchPaper>> {
    list_papers_by_status(db, Some(PaperStatus::Pending), Some(RECENT_LIMIT)).await
}

/// Builds the `$set` document for an edit; `resubmit` moves a rejected paper back to pending
pub fn update_document(changes: &UpdatePaperRequest, resubmit: bool) -> AppResult<(Document, bool)> {
    let mut set = doc! { "updated_at": now_ts() };
    let mut text_changed = false;

    if let Some(title) = &changes.title {
        set.insert("title", validate_title(title)?);
        text_changed = true;
    }
    if let Some(abstract_text) = &changes.abstract_text {
        set.insert("abstract_text", validate_non_empty("Abstract", abstract_text)?);
        text_changed = true;
    }
    if let Some(content_text) = &changes.content_text {
        set.insert("content_text", content_text.trim());
        text_changed = true;
    }
    if let Some(category) = &changes.category {
        set.insert("category", validate_non_empty("Category", category)?);
    }
    if let Some(keywords) = &changes.keywords {
        set.insert("keywords", normalize_keywords(keywords));
    }
    if let Some(price_cents) = changes.price_cents {
        set.insert("price_cents", validate_price(price_cents)?);
    }

    let rerun_checks = text_changed || resubmit;
    if resubmit {
        set.insert("status", PaperStatus::Pending.as_str());
        set.insert("rejection_reason", Bson::Null);
        set.insert("reviewed_by", Bson::Null);
    }
    if rerun_checks {
        set.insert("checks", to_bson(&PaperChecks::default())?);
    }
    Ok((set, rerun_checks))
}

pub async fn update_paper(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    claims: &Claims,
    paper_id: &str,
    changes: UpdatePaperRequest,
) -> AppResult<ResearchPaper> {
    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;

    if paper.author_id != claims.sub {
        return Err(AppError::Forbidden("Only the author can edit this paper".into()));
    }
    if paper.status == PaperStatus::Approved {
        return Err(AppError::InvalidRequest("Approved papers cannot be edited".into()));
    }
    let now = now_ts();
    if paper.checks.is_live_run(now, check_service::CHECK_LEASE_SECS) {
        return Err(AppError::Conflict("Checks are running for this paper, try again shortly".into()));
    }

    let resubmit = paper.status == PaperStatus::Rejected;
    let (set, rerun_checks) = update_document(&changes, resubmit)?;

    // A check run may have claimed the paper since it was read
    let mut filter = check_service::not_running_filter(now);
    filter.insert("_id", object_id);
    filter.insert("status", paper.status.as_str());

    let updated = db
        .collection::<ResearchPaper>(PAPERS)
        .find_one_and_update(filter, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Paper changed or checks started, reload and retry".into()))?;

    log::info!("✏️  Paper {} updated by {}{}", object_id, claims.sub, if resubmit { " (resubmitted)" } else { "" });
    if rerun_checks {
        check_service::spawn_checks(db.clone(), integrations.clone(), config.clone(), object_id);
    }
    Ok(updated)
}

pub async fn delete_paper(
    db: &MongoDB,
    integrations: &Integrations,
    claims: &Claims,
    paper_id: &str,
) -> AppResult<()> {
    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;

    if !can_manage(claims, &paper) {
        return Err(AppError::Forbidden("Only the author or an admin can delete this paper".into()));
    }

    db.collection::<ResearchPaper>(PAPERS)
        .delete_one(doc! { "_id": object_id })
        .await?;
    let reviews = db
        .collection::<Review>(REVIEWS)
        .delete_many(doc! { "paper_id": object_id.to_hex() })
        .await?;

    if let Err(e) = integrations.blob.delete(&paper.file_url).await {
        log::warn!("⚠️  Could not delete blob for paper {}: {}", object_id, e);
    }

    log::info!("🗑️  Paper {} deleted by {} ({} reviews removed)", object_id, claims.sub, reviews.deleted_count);
    Ok(())
}

// ==================== MODERATION ====================

pub fn decision_target(request: &ReviewPaperRequest) -> AppResult<(PaperStatus, Option<String>)> {
    match request.decision {
        ReviewDecision::Approve => Ok((PaperStatus::Approved, None)),
        ReviewDecision::Reject => {
            let reason = request
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| AppError::InvalidRequest("A reason is required to reject a paper".into()))?;
            Ok((PaperStatus::Rejected, Some(reason.to_string())))
        }
    }
}

pub async fn review_paper(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    claims: &Claims,
    paper_id: &str,
    request: ReviewPaperRequest,
) -> AppResult<ResearchPaper> {
    if !claims.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }

    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;
    let (target, reason) = decision_target(&request)?;

    if !paper.status.can_transition_to(target) {
        return Err(AppError::InvalidRequest(format!(
            "Cannot move a {} paper to {}",
            paper.status, target
        )));
    }

    let reviewed = db
        .collection::<ResearchPaper>(PAPERS)
        .find_one_and_update(
            doc! { "_id": object_id, "status": paper.status.as_str() },
            doc! { "$set": {
                "status": target.as_str(),
                "rejection_reason": reason.clone(),
                "reviewed_by": &claims.sub,
                "updated_at": now_ts(),
            } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::Conflict("Paper was reviewed concurrently".into()))?;

    log::info!("⚖️  Paper {} {} by {}", object_id, target, claims.sub);

    match auth_service::find_user(db, &reviewed.author_id).await {
        Ok(author) => {
            let email = match &reason {
                None => email_service::paper_approved(
                    &author.email,
                    &author.name,
                    &reviewed.title,
                    &format!("{}/papers/{}", config.frontend_url.trim_end_matches('/'), reviewed.id_hex()),
                ),
                Some(reason) => email_service::paper_rejected(&author.email, &author.name, &reviewed.title, reason),
            };
            integrations.mailer.send(email).await;
        }
        Err(e) => log::warn!("⚠️  No author to notify for paper {}: {}", object_id, e),
    }

    Ok(reviewed)
}

/// Re-runs the automated checks on demand (author or admin)
pub async fn rerun_checks(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    claims: &Claims,
    paper_id: &str,
) -> AppResult<PaperChecks> {
    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;

    if !can_manage(claims, &paper) {
        return Err(AppError::Forbidden("Only the author or an admin can run checks".into()));
    }
    if paper.status == PaperStatus::Approved {
        return Err(AppError::InvalidRequest("Approved papers are not re-checked".into()));
    }
    check_service::run_checks(db, integrations, config, &object_id).await
}

/// Pending papers with attempts left whose checks never ran, failed, or
/// were abandoned by a run that outlived its lease
pub fn needing_checks_filter(now: i64) -> Document {
    let mut filter = check_service::not_running_filter(now);
    filter.insert("status", PaperStatus::Pending.as_str());
    filter.insert("checks.status", doc! { "$ne": CheckStatus::Completed.as_str() });
    filter.insert("checks.attempts", doc! { "$lt": check_service::MAX_CHECK_ATTEMPTS });
    filter
}

pub async fn papers_needing_checks(db: &MongoDB) -> AppResult<Vec<ObjectId>> {
    let cursor = db
        .collection::<ResearchPaper>(PAPERS)
        .find(needing_checks_filter(now_ts()))
        .await?;
    let papers: Vec<ResearchPaper> = cursor.try_collect().await?;
    Ok(papers.into_iter().filter_map(|p| p.id).collect())
}

// ==================== DOWNLOAD ====================

/// Returns the file URL when the caller may download the paper, counting
/// the download and evaluating the author's milestones.
pub async fn download_paper(db: &MongoDB, claims: &Claims, paper_id: &str) -> AppResult<String> {
    let object_id = parse_object_id(paper_id)?;
    let paper = find_paper(db, &object_id).await?;
    let manager = can_manage(claims, &paper);

    if paper.status != PaperStatus::Approved && !manager {
        return Err(AppError::NotFound("Paper not found".into()));
    }
    if !paper.is_free()
        && !manager
        && !payment_service::has_purchased(db, &claims.sub, &paper.id_hex()).await?
    {
        return Err(AppError::Forbidden("Purchase this paper to download it".into()));
    }

    if paper.status == PaperStatus::Approved && paper.author_id != claims.sub {
        db.collection::<ResearchPaper>(PAPERS)
            .update_one(doc! { "_id": object_id }, doc! { "$inc": { "download_count": 1i64 } })
            .await?;

        let awarded = earnings_service::apply_milestones(db, &paper.author_id).await?;
        if !awarded.is_empty() {
            log::info!("🏆 Download of {} unlocked {} milestone(s)", object_id, awarded.len());
        }
    }

    log::info!("📥 Paper {} downloaded by {}", object_id, claims.sub);
    Ok(paper.file_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::paper::sample_paper;
    use crate::models::Role;
    use crate::services::auth_service::sample_claims as claims;

    #[test]
    fn test_decode_file_accepts_data_url() {
        let encoded = STANDARD.encode(b"%PDF-1.7 test");
        let data_url = format!("data:application/pdf;base64,{}", encoded);
        assert_eq!(decode_file("application/pdf", &data_url).unwrap(), b"%PDF-1.7 test");
        assert_eq!(decode_file("application/pdf", &encoded).unwrap(), b"%PDF-1.7 test");
    }

    #[test]
    fn test_decode_file_rejects_bad_input() {
        let encoded = STANDARD.encode(b"hello");
        assert!(matches!(decode_file("image/png", &encoded), Err(AppError::InvalidRequest(_))));
        assert!(decode_file("application/pdf", "not base64!!").is_err());
        assert!(decode_file("application/pdf", "").is_err());
    }

    #[test]
    fn test_decode_file_enforces_size_limit() {
        let oversized = "A".repeat((MAX_FILE_BYTES / 3 + 2) * 4);
        assert!(decode_file("application/pdf", &oversized).is_err());
    }

    #[test]
    fn test_title_validation() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert_eq!(validate_title("  Deep Nets  ").unwrap(), "Deep Nets");
    }

    #[test]
    fn test_normalize_keywords() {
        let raw = vec!["  ML ".to_string(), "ml".to_string(), "".to_string(), "Graphs".to_string()];
        assert_eq!(normalize_keywords(&raw), vec!["ml", "graphs"]);
    }

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("c++ (intro)"), "c\\+\\+ \\(intro\\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn test_browse_filter() {
        let query = BrowseQuery {
            search: Some("graph".into()),
            category: Some("Math".into()),
            free_only: true,
            ..Default::default()
        };
        let filter = browse_filter(&query);
        assert_eq!(filter.get_str("status").unwrap(), "approved");
        assert_eq!(filter.get_str("category").unwrap(), "Math");
        assert_eq!(filter.get_array("$or").unwrap().len(), 3);
        assert!(filter.get_document("price_cents").is_ok());

        let empty = browse_filter(&BrowseQuery { search: Some("  ".into()), ..Default::default() });
        assert!(!empty.contains_key("$or"));
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(pagination(None, None), (1, 20, 0));
        assert_eq!(pagination(Some(0), Some(0)), (1, 1, 0));
        assert_eq!(pagination(Some(3), Some(500)), (3, 100, 200));
        assert_eq!(pagination(Some(2), Some(-5)), (2, 1, 1));
    }

    #[test]
    fn test_pagination_huge_page_stays_in_skip_range() {
        let (page, limit, skip) = pagination(Some(u64::MAX), Some(100));
        assert_eq!(page, MAX_PAGE);
        assert_eq!(limit, 100);
        assert!(skip <= i64::MAX as u64);

        let (page, _, skip) = pagination(Some(200_000_000_000_000_000), Some(1));
        assert_eq!(page, MAX_PAGE);
        assert_eq!(skip, MAX_PAGE - 1);
    }

    #[test]
    fn test_price_bounds() {
        assert_eq!(validate_price(0).unwrap(), 0);
        assert_eq!(validate_price(MAX_PRICE_CENTS).unwrap(), MAX_PRICE_CENTS);
        assert!(validate_price(MAX_PRICE_CENTS + 1).is_err());
        assert!(validate_price(i64::MAX / 10).is_err());
    }

    #[test]
    fn test_needing_checks_filter_reclaims_stale_runs() {
        let filter = needing_checks_filter(10_000);
        assert_eq!(filter.get_str("status").unwrap(), "pending");
        assert_eq!(filter.get_document("checks.status").unwrap().get_str("$ne").unwrap(), "completed");

        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 3);
        let stale = branches[1].as_document().unwrap().get_document("checks.started_at").unwrap();
        assert_eq!(stale.get_i64("$lt").unwrap(), 10_000 - check_service::CHECK_LEASE_SECS);
    }

    #[test]
    fn test_update_document_resubmission_resets_checks() {
        let changes = UpdatePaperRequest { price_cents: Some(500), ..Default::default() };
        let (set, rerun) = update_document(&changes, false).unwrap();
        assert!(!rerun);
        assert!(!set.contains_key("checks"));

        let (set, rerun) = update_document(&changes, true).unwrap();
        assert!(rerun);
        assert_eq!(set.get_str("status").unwrap(), "pending");
        assert!(set.contains_key("checks"));

        let bad = UpdatePaperRequest { price_cents: Some(-1), ..Default::default() };
        assert!(update_document(&bad, false).is_err());
    }

    #[test]
    fn test_decision_requires_reason_for_rejection() {
        let reject = ReviewPaperRequest { decision: ReviewDecision::Reject, reason: Some("  ".into()) };
        assert!(decision_target(&reject).is_err());

        let reject = ReviewPaperRequest { decision: ReviewDecision::Reject, reason: Some("Off topic".into()) };
        assert_eq!(
            decision_target(&reject).unwrap(),
            (PaperStatus::Rejected, Some("Off topic".to_string()))
        );

        let approve = ReviewPaperRequest { decision: ReviewDecision::Approve, reason: None };
        assert_eq!(decision_target(&approve).unwrap(), (PaperStatus::Approved, None));
    }

    #[test]
    fn test_can_manage() {
        let paper = sample_paper();
        assert!(can_manage(&claims("author-1", Role::Researcher), &paper));
        assert!(can_manage(&claims("someone", Role::Admin), &paper));
        assert!(!can_manage(&claims("someone", Role::Researcher), &paper));
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_pending_paper_hidden_from_public() {
        let uri = std::env::var("DATABASE_URL").unwrap_or_else(|_| "mongodb://localhost:27017/ScholarShareTest".into());
        let db = MongoDB::new(&uri).await.unwrap();
        let mut paper = sample_paper();
        paper.id = None;
        let inserted = db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();
        let id = inserted.inserted_id.as_object_id().unwrap().to_hex();

        assert!(matches!(get_paper(&db, &id, None).await, Err(AppError::NotFound(_))));
        let author = claims("author-1", Role::Researcher);
        assert!(get_paper(&db, &id, Some(&author)).await.is_ok());

        db.collection::<ResearchPaper>(PAPERS)
            .delete_one(doc! { "_id": parse_object_id(&id).unwrap() })
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_edit_waits_for_live_checks_but_not_abandoned_ones() {
        use crate::services::testing;

        let db = testing::test_db().await;
        let config = AppConfig::for_tests();
        let integrations = testing::integrations(Some(5.0), Default::default());
        let author = claims("author-1", Role::Researcher);
        let changes = || UpdatePaperRequest { title: Some("Compilers for Some".into()), ..Default::default() };

        let mut paper = sample_paper();
        paper.status = PaperStatus::Rejected;
        paper.checks = PaperChecks {
            status: CheckStatus::Running,
            attempts: 1,
            started_at: Some(now_ts()),
            ..Default::default()
        };
        let paper_oid = paper.id.unwrap();
        db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();

        let blocked = update_paper(&db, &integrations, &config, &author, &paper_oid.to_hex(), changes()).await;
        assert!(matches!(blocked, Err(AppError::Conflict(_))));

        db.collection::<ResearchPaper>(PAPERS)
            .update_one(
                doc! { "_id": paper_oid },
                doc! { "$set": { "checks.started_at": now_ts() - check_service::CHECK_LEASE_SECS - 1 } },
            )
            .await
            .unwrap();
        let resubmitted = update_paper(&db, &integrations, &config, &author, &paper_oid.to_hex(), changes())
            .await
            .unwrap();
        assert_eq!(resubmitted.status, PaperStatus::Pending);
        assert_eq!(resubmitted.checks.attempts, 0);

        db.collection::<ResearchPaper>(PAPERS).delete_one(doc! { "_id": paper_oid }).await.unwrap();
    }
}
