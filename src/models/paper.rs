use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Review lifecycle of a research paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaperStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Pending => "pending",
            PaperStatus::Approved => "approved",
            PaperStatus::Rejected => "rejected",
        }
    }

    /// pending → approved | rejected, rejected → pending (resubmission)
    pub fn can_transition_to(&self, next: PaperStatus) -> bool {
        matches!(
            (self, next),
            (PaperStatus::Pending, PaperStatus::Approved)
                | (PaperStatus::Pending, PaperStatus::Rejected)
                | (PaperStatus::Rejected, PaperStatus::Pending)
        )
    }
}

impl fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::NotStarted => "not_started",
            CheckStatus::Running => "running",
            CheckStatus::Completed => "completed",
            CheckStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GrammarIssue {
    pub message: String,
    pub offset: i64,
    pub length: i64,
    pub rule_id: String,
    pub category: String,
    pub replacements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GrammarReport {
    /// 0..=100, higher is better
    pub score: f64,
    pub issue_count: i64,
    pub word_count: i64,
    pub issues: Vec<GrammarIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlagiarismSource {
    pub url: String,
    pub title: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PlagiarismReport {
    /// Percentage of the text matched elsewhere, 0..=100
    pub score: f64,
    pub plagiarized_words: i64,
    pub total_words: i64,
    pub sources: Vec<PlagiarismSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::ToSchema)]
pub struct PaperChecks {
    #[serde(default)]
    pub status: CheckStatus,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub grammar: Option<GrammarReport>,
    #[serde(default)]
    pub plagiarism: Option<PlagiarismReport>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub checked_at: Option<i64>,
    /// Set when a run claims the checks; a stale claim can be taken over
    #[serde(default)]
    pub started_at: Option<i64>,
}

impl PaperChecks {
    /// True while a run holds the checks and its lease has not expired
    pub fn is_live_run(&self, now: i64, lease_secs: i64) -> bool {
        self.status == CheckStatus::Running
            && self.started_at.map_or(false, |started| started >= now - lease_secs)
    }
}

/// Research paper (stored in the `research_papers` collection)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPaper {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    pub abstract_text: String,
    #[serde(default)]
    pub content_text: String,
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub file_url: String,
    pub file_pathname: String,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    /// 0 means free
    #[serde(default)]
    pub price_cents: i64,
    pub status: PaperStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub checks: PaperChecks,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub download_count: i64,
    #[serde(default)]
    pub rating_sum: i64,
    #[serde(default)]
    pub rating_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ResearchPaper {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_free(&self) -> bool {
        self.price_cents <= 0
    }

    pub fn average_rating(&self) -> Option<f64> {
        if self.rating_count <= 0 {
            return None;
        }
        let avg = self.rating_sum as f64 / self.rating_count as f64;
        Some((avg * 100.0).round() / 100.0)
    }

    /// Text submitted to the grammar and plagiarism checks
    pub fn check_text(&self) -> String {
        let mut text = format!("{}\n\n{}", self.title.trim(), self.abstract_text.trim());
        if !self.content_text.trim().is_empty() {
            text.push_str("\n\n");
            text.push_str(self.content_text.trim());
        }
        text
    }
}

/// Upload payload. The file travels base64-encoded inside the JSON body.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UploadPaperRequest {
    pub title: String,
    #[serde(rename = "abstract", alias = "abstract_text")]
    pub abstract_text: String,
    #[serde(default)]
    pub content_text: Option<String>,
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub price_cents: i64,
    pub file_name: String,
    pub content_type: String,
    pub file_base64: String,
}

#[derive(Debug, Deserialize, Default, utoipa::ToSchema)]
pub struct UpdatePaperRequest {
    pub title: Option<String>,
    #[serde(rename = "abstract", alias = "abstract_text")]
    pub abstract_text: Option<String>,
    pub content_text: Option<String>,
    pub category: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaperSort {
    #[default]
    Newest,
    Popular,
    Rating,
}

#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BrowseQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub sort: PaperSort,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ReviewPaperRequest {
    pub decision: ReviewDecision,
    pub reason: Option<String>,
}

/// Compact listing entry used by browse and dashboards
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaperListItem {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub author_name: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub price_cents: i64,
    pub status: PaperStatus,
    pub view_count: i64,
    pub download_count: i64,
    pub average_rating: Option<f64>,
    pub rating_count: i64,
    pub created_at: i64,
}

impl From<ResearchPaper> for PaperListItem {
    fn from(paper: ResearchPaper) -> Self {
        PaperListItem {
            id: paper.id_hex(),
            average_rating: paper.average_rating(),
            title: paper.title,
            author_id: paper.author_id,
            author_name: paper.author_name,
            category: paper.category,
            keywords: paper.keywords,
            price_cents: paper.price_cents,
            status: paper.status,
            view_count: paper.view_count,
            download_count: paper.download_count,
            rating_count: paper.rating_count,
            created_at: paper.created_at,
        }
    }
}

/// Full paper view. The file URL is only exposed through the download endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaperResponse {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub price_cents: i64,
    pub status: PaperStatus,
    pub rejection_reason: Option<String>,
    pub checks: Option<PaperChecks>,
    pub view_count: i64,
    pub download_count: i64,
    pub average_rating: Option<f64>,
    pub rating_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PaperResponse {
    /// `include_checks` is true for the author and admins only
    pub fn from_paper(paper: ResearchPaper, include_checks: bool) -> Self {
        PaperResponse {
            id: paper.id_hex(),
            average_rating: paper.average_rating(),
            author_id: paper.author_id,
            author_name: paper.author_name,
            title: paper.title,
            abstract_text: paper.abstract_text,
            category: paper.category,
            keywords: paper.keywords,
            file_name: paper.file_name,
            content_type: paper.content_type,
            file_size: paper.file_size,
            price_cents: paper.price_cents,
            status: paper.status,
            rejection_reason: paper.rejection_reason,
            checks: if include_checks { Some(paper.checks) } else { None },
            view_count: paper.view_count,
            download_count: paper.download_count,
            rating_count: paper.rating_count,
            created_at: paper.created_at,
            updated_at: paper.updated_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_paper() -> ResearchPaper {
    ResearchPaper {
        id: Some(ObjectId::new()),
        author_id: "author-1".into(),
        author_name: "Grace Hopper".into(),
        title: "Compilers for Everyone".into(),
        abstract_text: "We describe a compiler.".into(),
        content_text: String::new(),
        category: "Computer Science".into(),
        keywords: vec!["compilers".into()],
        file_url: "https://blob.example/papers/a.pdf".into(),
        file_pathname: "papers/author-1/a.pdf".into(),
        file_name: "a.pdf".into(),
        content_type: "application/pdf".into(),
        file_size: 1024,
        price_cents: 0,
        status: PaperStatus::Pending,
        rejection_reason: None,
        reviewed_by: None,
        checks: PaperChecks::default(),
        view_count: 0,
        download_count: 0,
        rating_sum: 0,
        rating_count: 0,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(PaperStatus::Pending.can_transition_to(PaperStatus::Approved));
        assert!(PaperStatus::Pending.can_transition_to(PaperStatus::Rejected));
        assert!(PaperStatus::Rejected.can_transition_to(PaperStatus::Pending));
        assert!(!PaperStatus::Approved.can_transition_to(PaperStatus::Rejected));
        assert!(!PaperStatus::Approved.can_transition_to(PaperStatus::Pending));
        assert!(!PaperStatus::Rejected.can_transition_to(PaperStatus::Approved));
        assert!(!PaperStatus::Pending.can_transition_to(PaperStatus::Pending));
    }

    #[test]
    fn test_average_rating() {
        let mut paper = sample_paper();
        assert_eq!(paper.average_rating(), None);
        paper.rating_sum = 14;
        paper.rating_count = 3;
        assert_eq!(paper.average_rating(), Some(4.67));
    }

    #[test]
    fn test_stale_running_checks_are_not_live() {
        let mut checks = PaperChecks { status: CheckStatus::Running, started_at: Some(1_000), ..Default::default() };
        assert!(checks.is_live_run(1_500, 600));
        assert!(checks.is_live_run(1_600, 600));
        assert!(!checks.is_live_run(1_601, 600));

        // Claims without a start time count as abandoned
        checks.started_at = None;
        assert!(!checks.is_live_run(1_000, 600));

        checks = PaperChecks { status: CheckStatus::Failed, started_at: Some(1_000), ..Default::default() };
        assert!(!checks.is_live_run(1_000, 600));
    }

    #[test]
    fn test_check_text_skips_empty_content() {
        let mut paper = sample_paper();
        assert_eq!(paper.check_text(), "Compilers for Everyone\n\nWe describe a compiler.");
        paper.content_text = "  Body.  ".into();
        assert!(paper.check_text().ends_with("\n\nBody."));
    }

    #[test]
    fn test_checks_hidden_from_public_view() {
        let public = PaperResponse::from_paper(sample_paper(), false);
        let json = serde_json::to_value(&public).unwrap();
        assert!(json["checks"].is_null());
        assert!(json.get("file_url").is_none());
        assert_eq!(json["abstract"], "We describe a compiler.");
    }

    #[test]
    fn test_check_status_wire_format() {
        assert_eq!(serde_json::to_string(&CheckStatus::NotStarted).unwrap(), "\"not_started\"");
        assert_eq!(CheckStatus::Failed.as_str(), "failed");
    }
}
