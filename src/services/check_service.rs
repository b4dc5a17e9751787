// Automated grammar (LanguageTool) and plagiarism (Winston AI) checks for papers

use crate::{
    api::metrics,
    config::AppConfig,
    database::{MongoDB, PAPERS},
    models::{
        CheckStatus, GrammarIssue, GrammarReport, PaperChecks, PaperStatus, PlagiarismReport,
        PlagiarismSource, ResearchPaper,
    },
    services::{auth_service, email_service, now_ts, Integrations},
    utils::error::{AppError, AppResult},
    utils::http::{retry_after_from, retry_on_rate_limit, Attempt, RetryPolicy, HTTP_CLIENT},
};
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Document};
use mongodb::options::ReturnDocument;
use serde::Deserialize;

/// LanguageTool's public API refuses larger payloads
pub const GRAMMAR_MAX_CHARS: usize = 20_000;
pub const PLAGIARISM_MIN_CHARS: usize = 100;
const MAX_KEPT_ISSUES: usize = 50;
pub const MAX_CHECK_ATTEMPTS: i32 = 3;
/// How long a claimed run may hold a paper's checks before it is considered abandoned
pub const CHECK_LEASE_SECS: i64 = 600;

#[async_trait]
pub trait GrammarChecker: Send + Sync {
    async fn check(&self, text: &str) -> AppResult<GrammarReport>;
}

#[async_trait]
pub trait PlagiarismChecker: Send + Sync {
    async fn scan(&self, text: &str) -> AppResult<PlagiarismReport>;
}

// ==================== LANGUAGETOOL ====================

#[derive(Debug, Deserialize)]
struct LtResponse {
    #[serde(default)]
    matches: Vec<LtMatch>,
}

#[derive(Debug, Deserialize)]
struct LtMatch {
    #[serde(default)]
    message: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    length: i64,
    #[serde(default)]
    replacements: Vec<LtReplacement>,
    rule: Option<LtRule>,
}

#[derive(Debug, Deserialize)]
struct LtReplacement {
    value: String,
}

#[derive(Debug, Deserialize)]
struct LtRule {
    #[serde(default)]
    id: String,
    category: Option<LtCategory>,
}

#[derive(Debug, Deserialize)]
struct LtCategory {
    #[serde(default)]
    name: String,
}

pub struct LanguageTool {
    base_url: String,
    language: String,
}

impl LanguageTool {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            language: "en-US".to_string(),
        }
    }
}

#[async_trait]
impl GrammarChecker for LanguageTool {
    async fn check(&self, text: &str) -> AppResult<GrammarReport> {
        let text = truncate_chars(text, GRAMMAR_MAX_CHARS);
        log::info!("📝 LanguageTool check ({} chars)", text.len());

        let response = HTTP_CLIENT
            .post(format!("{}/v2/check", self.base_url))
            .header("Accept", "application/json")
            .form(&[("text", text), ("language", self.language.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalError(format!(
                "LanguageTool API error: {}",
                response.status()
            )));
        }

        let body: LtResponse = response.json().await?;
        Ok(grammar_report(text, body))
    }
}

fn grammar_report(text: &str, body: LtResponse) -> GrammarReport {
    let word_count = count_words(text);
    let issue_count = body.matches.len();

    let issues = body
        .matches
        .into_iter()
        .take(MAX_KEPT_ISSUES)
        .map(|m| {
            let (rule_id, category) = match m.rule {
                Some(rule) => (rule.id, rule.category.map(|c| c.name).unwrap_or_default()),
                None => (String::new(), String::new()),
            };
            GrammarIssue {
                message: m.message,
                offset: m.offset,
                length: m.length,
                rule_id,
                category,
                replacements: m.replacements.into_iter().take(5).map(|r| r.value).collect(),
            }
        })
        .collect();

    GrammarReport {
        score: grammar_score(issue_count, word_count),
        issue_count: issue_count as i64,
        word_count: word_count as i64,
        issues,
    }
}

/// 100 minus ten points per issue per hundred words, clamped to 0..=100
pub fn grammar_score(issue_count: usize, word_count: usize) -> f64 {
    if word_count == 0 {
        return 100.0;
    }
    let per_hundred = issue_count as f64 * 100.0 / word_count as f64;
    let score = (100.0 - per_hundred * 10.0).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Longest prefix of at most `max` chars, cut on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ==================== WINSTON AI ====================

#[derive(Debug, Deserialize)]
struct WinstonResponse {
    result: Option<WinstonResult>,
    #[serde(default)]
    sources: Vec<WinstonSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WinstonResult {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    text_word_counts: i64,
    #[serde(default)]
    total_plagiarism_words: i64,
}

#[derive(Debug, Deserialize)]
struct WinstonSource {
    #[serde(default)]
    url: String,
    title: Option<String>,
    #[serde(default)]
    score: f64,
}

pub struct WinstonAi {
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl WinstonAi {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl PlagiarismChecker for WinstonAi {
    async fn scan(&self, text: &str) -> AppResult<PlagiarismReport> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ExternalError("WINSTON_API_KEY is not configured".into()))?;

        if text.trim().chars().count() < PLAGIARISM_MIN_CHARS {
            return Err(AppError::InvalidRequest(format!(
                "Plagiarism check needs at least {} characters of text",
                PLAGIARISM_MIN_CHARS
            )));
        }

        let url = format!("{}/v2/plagiarism", self.base_url);
        let payload = serde_json::json!({
            "text": text,
            "language": "en",
            "country": "us",
        });

        let body: WinstonResponse = retry_on_rate_limit(&self.retry, "Winston AI", |attempt| {
            let request = HTTP_CLIENT
                .post(&url)
                .bearer_auth(api_key)
                .json(&payload);
            async move {
                log::info!("🔎 Winston AI plagiarism scan (attempt {})", attempt);
                let response = request.send().await?;
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Ok(Attempt::RateLimited(retry_after_from(response.headers())));
                }
                if !status.is_success() {
                    let detail = response.text().await.unwrap_or_default();
                    return Err(AppError::ExternalError(format!(
                        "Winston AI error ({}): {}",
                        status, detail
                    )));
                }
                Ok(Attempt::Done(response.json::<WinstonResponse>().await?))
            }
        })
        .await?;

        plagiarism_report(text, body)
    }
}

fn plagiarism_report(text: &str, body: WinstonResponse) -> AppResult<PlagiarismReport> {
    let result = body
        .result
        .ok_or_else(|| AppError::ExternalError("Winston AI response had no result".into()))?;

    let total_words = if result.text_word_counts > 0 {
        result.text_word_counts
    } else {
        count_words(text) as i64
    };

    let mut sources: Vec<PlagiarismSource> = body
        .sources
        .into_iter()
        .filter(|s| !s.url.is_empty())
        .map(|s| PlagiarismSource {
            url: s.url,
            title: s.title,
            score: s.score,
        })
        .collect();
    sources.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    sources.truncate(10);

    Ok(PlagiarismReport {
        score: result.score.clamp(0.0, 100.0),
        plagiarized_words: result.total_plagiarism_words,
        total_words,
        sources,
    })
}

// ==================== CHECK PIPELINE ====================

#[derive(Debug, Clone, PartialEq)]
pub enum CheckVerdict {
    /// Leave the paper pending for an admin
    AwaitReview,
    AutoReject(String),
}

pub fn verdict(plagiarism: &PlagiarismReport, threshold: f64) -> CheckVerdict {
    if plagiarism.score > threshold {
        CheckVerdict::AutoReject(format!(
            "Automated plagiarism check found {:.1}% matching content (limit {:.0}%)",
            plagiarism.score, threshold
        ))
    } else {
        CheckVerdict::AwaitReview
    }
}

/// Matches papers whose checks are not held by a live run: idle, or
/// claimed by a run that outlived its lease (crash or lost write).
pub fn not_running_filter(now: i64) -> Document {
    doc! { "$or": [
        { "checks.status": { "$ne": CheckStatus::Running.as_str() } },
        { "checks.started_at": { "$lt": now - CHECK_LEASE_SECS } },
        { "checks.started_at": null },
    ] }
}

/// Matches the paper only while this run still holds its claim
fn claim_filter(paper_id: &ObjectId, checks: &PaperChecks) -> Document {
    doc! {
        "_id": paper_id,
        "checks.status": CheckStatus::Running.as_str(),
        "checks.attempts": checks.attempts,
        "checks.started_at": checks.started_at,
    }
}

/// Claims the paper's checks (no concurrent runs), runs grammar then
/// plagiarism, stores both reports and applies the verdict.
pub async fn run_checks(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    paper_id: &ObjectId,
) -> AppResult<PaperChecks> {
    let collection = db.collection::<ResearchPaper>(PAPERS);
    let started_at = now_ts();

    let mut claim = not_running_filter(started_at);
    claim.insert("_id", *paper_id);

    let paper = collection
        .find_one_and_update(
            claim,
            doc! {
                "$set": {
                    "checks.status": CheckStatus::Running.as_str(),
                    "checks.error": null,
                    "checks.started_at": started_at,
                },
                "$inc": { "checks.attempts": 1 },
            },
        )
        .return_document(ReturnDocument::After)
        .await?;

    let paper = match paper {
        Some(p) => p,
        None => {
            return match collection.find_one(doc! { "_id": paper_id }).await? {
                Some(_) => Err(AppError::Conflict("Checks are already running for this paper".into())),
                None => Err(AppError::NotFound("Paper not found".into())),
            };
        }
    };

    log::info!("🧪 Running checks for paper {} (attempt {})", paper_id, paper.checks.attempts);
    metrics::increment_checks_run();

    let text = paper.check_text();
    let outcome = async {
        let grammar = integrations.grammar.check(&text).await?;
        let plagiarism = integrations.plagiarism.scan(&text).await?;
        Ok::<_, AppError>((grammar, plagiarism))
    }
    .await;

    let (grammar, plagiarism) = match outcome {
        Ok(reports) => reports,
        Err(e) => {
            log::warn!("❌ Checks failed for paper {}: {}", paper_id, e);
            collection
                .update_one(
                    claim_filter(paper_id, &paper.checks),
                    doc! { "$set": {
                        "checks.status": CheckStatus::Failed.as_str(),
                        "checks.error": e.to_string(),
                        "checks.checked_at": now_ts(),
                    } },
                )
                .await?;
            return Err(e);
        }
    };

    let now = now_ts();
    let stored = collection
        .update_one(
            claim_filter(paper_id, &paper.checks),
            doc! { "$set": {
                "checks.status": CheckStatus::Completed.as_str(),
                "checks.grammar": to_bson(&grammar)?,
                "checks.plagiarism": to_bson(&plagiarism)?,
                "checks.error": null,
                "checks.checked_at": now,
            } },
        )
        .await?;

    // The paper was edited or reclaimed mid-run, so these reports describe stale text
    if stored.matched_count == 0 {
        log::warn!("⚠️  Checks for paper {} were superseded, discarding results", paper_id);
        return Err(AppError::Conflict("Paper changed while checks were running".into()));
    }

    log::info!(
        "✅ Checks completed for paper {}: grammar {:.1}, plagiarism {:.1}%",
        paper_id, grammar.score, plagiarism.score
    );

    if let CheckVerdict::AutoReject(reason) = verdict(&plagiarism, config.plagiarism_threshold) {
        let rejected = collection
            .update_one(
                doc! {
                    "_id": paper_id,
                    "status": PaperStatus::Pending.as_str(),
                    "checks.status": CheckStatus::Completed.as_str(),
                    "checks.started_at": started_at,
                },
                doc! { "$set": {
                    "status": PaperStatus::Rejected.as_str(),
                    "rejection_reason": &reason,
                    "reviewed_by": "system",
                    "updated_at": now,
                } },
            )
            .await?;

        if rejected.modified_count > 0 {
            log::warn!("⛔ Paper {} auto-rejected: {}", paper_id, reason);
            if let Ok(author) = auth_service::find_user(db, &paper.author_id).await {
                integrations
                    .mailer
                    .send(email_service::paper_rejected(&author.email, &author.name, &paper.title, &reason))
                    .await;
            }
        }
    }

    Ok(PaperChecks {
        status: CheckStatus::Completed,
        attempts: paper.checks.attempts,
        grammar: Some(grammar),
        plagiarism: Some(plagiarism),
        error: None,
        checked_at: Some(now),
        started_at: Some(started_at),
    })
}

/// Fire-and-forget variant used right after an upload
pub fn spawn_checks(db: MongoDB, integrations: Integrations, config: AppConfig, paper_id: ObjectId) {
    tokio::spawn(async move {
        if let Err(e) = run_checks(&db, &integrations, &config, &paper_id).await {
            log::warn!("⚠️  Background checks for paper {} did not complete: {}", paper_id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_score() {
        assert_eq!(grammar_score(0, 0), 100.0);
        assert_eq!(grammar_score(0, 250), 100.0);
        // 1 issue per 100 words costs 10 points
        assert_eq!(grammar_score(2, 200), 90.0);
        assert_eq!(grammar_score(50, 100), 0.0);
        assert_eq!(grammar_score(1, 300), 96.7);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_languagetool_response_parsing() {
        let raw = r#"{
            "software": {"name": "LanguageTool"},
            "matches": [{
                "message": "Possible spelling mistake found.",
                "shortMessage": "Spelling mistake",
                "replacements": [{"value": "research"}, {"value": "researches"}],
                "offset": 4,
                "length": 8,
                "rule": {"id": "MORFOLOGIK_RULE_EN_US", "issueType": "misspelling",
                         "category": {"id": "TYPOS", "name": "Possible Typo"}}
            }]
        }"#;
        let body: LtResponse = serde_json::from_str(raw).unwrap();
        let report = grammar_report("Our reserach shows that ten words are here in total", body);

        assert_eq!(report.issue_count, 1);
        assert_eq!(report.word_count, 10);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.issues[0].rule_id, "MORFOLOGIK_RULE_EN_US");
        assert_eq!(report.issues[0].category, "Possible Typo");
        assert_eq!(report.issues[0].replacements, vec!["research", "researches"]);
    }

    #[test]
    fn test_winston_response_parsing() {
        let raw = r#"{
            "status": 200,
            "result": {"score": 42.5, "sourceCounts": 2, "textWordCounts": 400, "totalPlagiarismWords": 170},
            "sources": [
                {"url": "https://a.example/x", "title": "A", "score": 12.0, "plagiarismWords": 48},
                {"url": "", "title": "dropped", "score": 99.0},
                {"url": "https://b.example/y", "score": 30.5}
            ],
            "credits_used": 400
        }"#;
        let body: WinstonResponse = serde_json::from_str(raw).unwrap();
        let report = plagiarism_report("irrelevant", body).unwrap();

        assert_eq!(report.score, 42.5);
        assert_eq!(report.total_words, 400);
        assert_eq!(report.plagiarized_words, 170);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].url, "https://b.example/y");
    }

    #[test]
    fn test_winston_missing_result_is_error() {
        let body: WinstonResponse = serde_json::from_str(r#"{"status": 400}"#).unwrap();
        assert!(plagiarism_report("text", body).is_err());
    }

    #[test]
    fn test_verdict_threshold() {
        let mut report = PlagiarismReport {
            score: 30.0,
            plagiarized_words: 0,
            total_words: 100,
            sources: vec![],
        };
        assert_eq!(verdict(&report, 30.0), CheckVerdict::AwaitReview);
        report.score = 30.5;
        assert!(matches!(verdict(&report, 30.0), CheckVerdict::AutoReject(_)));
    }

    #[tokio::test]
    async fn test_winston_rejects_short_text_locally() {
        let client = WinstonAi::new("http://127.0.0.1:9", Some("key".into()));
        let result = client.scan("too short").await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_winston_requires_api_key() {
        let client = WinstonAi::new("http://127.0.0.1:9", None);
        let result = client.scan(&"word ".repeat(50)).await;
        assert!(matches!(result, Err(AppError::ExternalError(_))));
    }

    async fn insert_paper(db: &MongoDB, status: PaperStatus, checks: PaperChecks) -> ObjectId {
        use crate::models::paper::sample_paper;

        let mut paper = sample_paper();
        paper.id = None;
        paper.author_id = ObjectId::new().to_hex();
        paper.status = status;
        paper.checks = checks;
        let inserted = db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();
        inserted.inserted_id.as_object_id().unwrap()
    }

    async fn load(db: &MongoDB, id: ObjectId) -> ResearchPaper {
        db.collection::<ResearchPaper>(PAPERS).find_one(doc! { "_id": id }).await.unwrap().unwrap()
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_high_plagiarism_rejects_only_pending_papers() {
        use crate::services::testing;

        let db = testing::test_db().await;
        let config = AppConfig::for_tests();
        let integrations = testing::integrations(Some(80.0), Default::default());

        let pending = insert_paper(&db, PaperStatus::Pending, PaperChecks::default()).await;
        let checks = run_checks(&db, &integrations, &config, &pending).await.unwrap();
        assert_eq!(checks.status, CheckStatus::Completed);
        let stored = load(&db, pending).await;
        assert_eq!(stored.status, PaperStatus::Rejected);
        assert_eq!(stored.reviewed_by.as_deref(), Some("system"));
        assert_eq!(stored.checks.status, CheckStatus::Completed);

        let approved = insert_paper(&db, PaperStatus::Approved, PaperChecks::default()).await;
        run_checks(&db, &integrations, &config, &approved).await.unwrap();
        assert_eq!(load(&db, approved).await.status, PaperStatus::Approved);

        db.collection::<ResearchPaper>(PAPERS)
            .delete_many(doc! { "_id": { "$in": [pending, approved] } })
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_failed_run_is_recorded_and_retryable() {
        use crate::services::testing;

        let db = testing::test_db().await;
        let config = AppConfig::for_tests();
        let failing = testing::integrations(None, Default::default());

        let id = insert_paper(&db, PaperStatus::Pending, PaperChecks::default()).await;
        assert!(run_checks(&db, &failing, &config, &id).await.is_err());
        let stored = load(&db, id).await;
        assert_eq!(stored.checks.status, CheckStatus::Failed);
        assert_eq!(stored.checks.attempts, 1);
        assert!(stored.checks.error.is_some());

        let working = testing::integrations(Some(5.0), Default::default());
        let checks = run_checks(&db, &working, &config, &id).await.unwrap();
        assert_eq!(checks.attempts, 2);
        assert_eq!(load(&db, id).await.status, PaperStatus::Pending);

        db.collection::<ResearchPaper>(PAPERS).delete_one(doc! { "_id": id }).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_abandoned_running_claim_is_taken_over() {
        use crate::services::testing;

        let db = testing::test_db().await;
        let config = AppConfig::for_tests();
        let integrations = testing::integrations(Some(5.0), Default::default());
        let running = |started_at: i64| PaperChecks {
            status: CheckStatus::Running,
            attempts: 1,
            started_at: Some(started_at),
            ..Default::default()
        };

        let live = insert_paper(&db, PaperStatus::Pending, running(now_ts())).await;
        assert!(matches!(
            run_checks(&db, &integrations, &config, &live).await,
            Err(AppError::Conflict(_))
        ));

        let abandoned = insert_paper(&db, PaperStatus::Pending, running(now_ts() - CHECK_LEASE_SECS - 1)).await;
        let retry_ids = crate::services::paper_service::papers_needing_checks(&db).await.unwrap();
        assert!(retry_ids.contains(&abandoned));
        assert!(!retry_ids.contains(&live));

        let checks = run_checks(&db, &integrations, &config, &abandoned).await.unwrap();
        assert_eq!(checks.status, CheckStatus::Completed);
        assert_eq!(load(&db, abandoned).await.checks.status, CheckStatus::Completed);

        db.collection::<ResearchPaper>(PAPERS)
            .delete_many(doc! { "_id": { "$in": [live, abandoned] } })
            .await
            .unwrap();
    }
}
