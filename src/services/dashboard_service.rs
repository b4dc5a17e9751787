use crate::{
    database::{MongoDB, PAPERS, PAYMENTS, USERS},
    models::{
        MilestoneProgress, PaperListItem, PaperStatus, PaymentKind, PaymentResponse, PaymentStatus,
        ResearchPaper, ResearcherEarnings, ReviewResponse,
    },
    services::{earnings_service, paper_service, payment_service, review_service},
    utils::error::AppResult,
};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default, Serialize, utoipa::ToSchema)]
pub struct RoleCounts {
    pub admin: i64,
    pub researcher: i64,
    pub user: i64,
    pub total: i64,
}

#[derive(Debug, Default, Serialize, utoipa::ToSchema)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub total: i64,
}

impl StatusCounts {
    fn add(&mut self, status: PaperStatus, n: i64) {
        match status {
            PaperStatus::Pending => self.pending += n,
            PaperStatus::Approved => self.approved += n,
            PaperStatus::Rejected => self.rejected += n,
        }
        self.total += n;
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AdminDashboard {
    pub users: RoleCounts,
    pub papers: StatusCounts,
    pub revenue_cents: i64,
    pub researcher_share_cents: i64,
    pub platform_revenue_cents: i64,
    pub completed_sales: i64,
    pub pending_payout_count: i64,
    pub pending_payout_cents: i64,
    pub recent_pending_papers: Vec<PaperListItem>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResearcherDashboard {
    pub papers: Vec<PaperListItem>,
    pub counts: StatusCounts,
    pub total_views: i64,
    pub total_downloads: i64,
    pub average_rating: Option<f64>,
    pub earnings: ResearcherEarnings,
    pub milestones: MilestoneProgress,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserDashboard {
    pub purchases: Vec<PaymentResponse>,
    pub reviews: Vec<ReviewResponse>,
    pub total_spent_cents: i64,
}

fn as_i64(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

/// `{ value of field: count }` over the documents matching `filter`
async fn count_by(db: &MongoDB, collection: &str, field: &str, filter: Document) -> AppResult<HashMap<String, i64>> {
    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } },
    ];
    let rows: Vec<Document> = db
        .collection::<Document>(collection)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let key = row.get_str("_id").ok()?.to_string();
            Some((key, as_i64(row.get("count"))))
        })
        .collect())
}

/// Sums `amount_cents` and `researcher_share_cents` over matching payments
async fn sum_payments(db: &MongoDB, filter: Document) -> AppResult<(i64, i64, i64)> {
    let pipeline = vec![
        doc! { "$match": filter },
        doc! { "$group": {
            "_id": null,
            "amount": { "$sum": "$amount_cents" },
            "share": { "$sum": "$researcher_share_cents" },
            "count": { "$sum": 1 },
        } },
    ];
    let rows: Vec<Document> = db
        .collection::<Document>(PAYMENTS)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;

    Ok(match rows.first() {
        Some(row) => (as_i64(row.get("amount")), as_i64(row.get("share")), as_i64(row.get("count"))),
        None => (0, 0, 0),
    })
}

pub fn role_counts(raw: &HashMap<String, i64>) -> RoleCounts {
    let get = |k: &str| raw.get(k).copied().unwrap_or(0);
    RoleCounts {
        admin: get("admin"),
        researcher: get("researcher"),
        user: get("user"),
        total: raw.values().sum(),
    }
}

pub fn status_counts(raw: &HashMap<String, i64>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for (status, n) in [
        (PaperStatus::Pending, "pending"),
        (PaperStatus::Approved, "approved"),
        (PaperStatus::Rejected, "rejected"),
    ] {
        counts.add(status, raw.get(n).copied().unwrap_or(0));
    }
    counts
}

/// Overall average across papers, weighted by number of ratings
pub fn weighted_rating(papers: &[ResearchPaper]) -> Option<f64> {
    let (sum, count) = papers
        .iter()
        .fold((0i64, 0i64), |(s, c), p| (s + p.rating_sum, c + p.rating_count));
    if count == 0 {
        return None;
    }
    Some(((sum as f64 / count as f64) * 100.0).round() / 100.0)
}

pub async fn admin_dashboard(db: &MongoDB) -> AppResult<AdminDashboard> {
    let users = role_counts(&count_by(db, USERS, "role", doc! {}).await?);
    let papers = status_counts(&count_by(db, PAPERS, "status", doc! {}).await?);

    let (revenue, share, sales) = sum_payments(
        db,
        doc! { "kind": PaymentKind::Purchase.as_str(), "status": PaymentStatus::Completed.as_str() },
    )
    .await?;
    let (pending_payouts, _, pending_payout_count) = sum_payments(
        db,
        doc! { "kind": PaymentKind::Payout.as_str(), "status": PaymentStatus::Pending.as_str() },
    )
    .await?;

    let recent = paper_service::recent_pending(db).await?;

    Ok(AdminDashboard {
        users,
        papers,
        revenue_cents: revenue,
        researcher_share_cents: share,
        platform_revenue_cents: revenue - share,
        completed_sales: sales,
        pending_payout_count,
        pending_payout_cents: pending_payouts,
        recent_pending_papers: recent.into_iter().map(PaperListItem::from).collect(),
    })
}

pub async fn researcher_dashboard(db: &MongoDB, researcher_id: &str) -> AppResult<ResearcherDashboard> {
    let papers = paper_service::list_author_papers(db, researcher_id).await?;
    let earnings = earnings_service::get_earnings(db, researcher_id).await?;

    let mut counts = StatusCounts::default();
    for paper in &papers {
        counts.add(paper.status, 1);
    }
    let total_views = papers.iter().map(|p| p.view_count).sum();
    let total_downloads: i64 = papers.iter().map(|p| p.download_count).sum();
    let average_rating = weighted_rating(&papers);
    let milestones = earnings_service::milestone_progress(total_downloads, &earnings.milestones_reached);

    Ok(ResearcherDashboard {
        papers: papers.into_iter().map(PaperListItem::from).collect(),
        counts,
        total_views,
        total_downloads,
        average_rating,
        earnings,
        milestones,
    })
}

pub async fn user_dashboard(db: &MongoDB, user_id: &str) -> AppResult<UserDashboard> {
    let purchases = payment_service::list_purchases(db, user_id).await?;
    let reviews = review_service::list_user_reviews(db, user_id).await?;
    let total_spent_cents = purchases.iter().map(|p| p.amount_cents).sum();

    Ok(UserDashboard {
        purchases: purchases.into_iter().map(PaymentResponse::from).collect(),
        reviews: reviews.into_iter().map(ReviewResponse::from).collect(),
        total_spent_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::paper::sample_paper;

    #[test]
    fn test_role_counts() {
        let raw: HashMap<String, i64> =
            [("admin".to_string(), 1), ("user".to_string(), 7), ("researcher".to_string(), 3)].into();
        let counts = role_counts(&raw);
        assert_eq!((counts.admin, counts.researcher, counts.user, counts.total), (1, 3, 7, 11));
    }

    #[test]
    fn test_status_counts_ignore_unknown() {
        let raw: HashMap<String, i64> = [("pending".to_string(), 2), ("archived".to_string(), 5)].into();
        let counts = status_counts(&raw);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.approved, 0);
        assert_eq!(counts.total, 2);
    }

    #[test]
    fn test_weighted_rating() {
        let mut a = sample_paper();
        a.rating_sum = 10;
        a.rating_count = 2;
        let mut b = sample_paper();
        b.rating_sum = 3;
        b.rating_count = 1;
        assert_eq!(weighted_rating(&[a, b]), Some(4.33));
        assert_eq!(weighted_rating(&[sample_paper()]), None);
        assert_eq!(weighted_rating(&[]), None);
    }

    #[test]
    fn test_as_i64_handles_numeric_types() {
        assert_eq!(as_i64(Some(&Bson::Int32(3))), 3);
        assert_eq!(as_i64(Some(&Bson::Int64(4))), 4);
        assert_eq!(as_i64(Some(&Bson::Double(5.0))), 5);
        assert_eq!(as_i64(None), 0);
    }
}
