use crate::{
    database::{MongoDB, EARNINGS, PAPERS, PAYMENTS},
    models::{
        Milestone, MilestoneProgress, Payment, PaymentKind, PaymentStatus, ResearcherEarnings,
    },
    services::{auth_service, email_service, now_ts, parse_object_id, Integrations},
    utils::error::{AppError, AppResult},
};
use futures::stream::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, Document};
use mongodb::options::ReturnDocument;

/// Download thresholds (across all of a researcher's papers) and their one-off bonuses
pub const MILESTONES: [Milestone; 5] = [
    Milestone { downloads: 100, bonus_cents: 500 },
    Milestone { downloads: 500, bonus_cents: 2_500 },
    Milestone { downloads: 1_000, bonus_cents: 5_000 },
    Milestone { downloads: 5_000, bonus_cents: 25_000 },
    Milestone { downloads: 10_000, bonus_cents: 50_000 },
];

pub const MIN_PAYOUT_CENTS: i64 = 1_000;

/// Researcher's cut of a sale, rounded down to the cent
pub fn researcher_share(amount_cents: i64, percent: i64) -> i64 {
    if amount_cents <= 0 || percent <= 0 {
        return 0;
    }
    // i128 so large amounts cannot overflow before the division
    (amount_cents as i128 * percent.min(100) as i128 / 100) as i64
}

/// Milestones reached by `total_downloads` and not yet awarded, ascending
pub fn newly_reached(total_downloads: i64, already: &[i64]) -> Vec<Milestone> {
    MILESTONES
        .iter()
        .filter(|m| total_downloads >= m.downloads && !already.contains(&m.downloads))
        .copied()
        .collect()
}

pub fn next_milestone(total_downloads: i64) -> Option<Milestone> {
    MILESTONES.iter().find(|m| m.downloads > total_downloads).copied()
}

pub fn milestone_progress(total_downloads: i64, reached: &[i64]) -> MilestoneProgress {
    let mut reached = reached.to_vec();
    reached.sort_unstable();
    MilestoneProgress {
        total_downloads,
        next: next_milestone(total_downloads),
        reached,
    }
}

pub fn validate_payout_amount(amount_cents: i64, available_cents: i64) -> AppResult<()> {
    if amount_cents < MIN_PAYOUT_CENTS {
        return Err(AppError::InvalidRequest(format!(
            "Minimum payout is {}",
            email_service::format_usd(MIN_PAYOUT_CENTS)
        )));
    }
    if amount_cents > available_cents {
        return Err(AppError::InvalidRequest(format!(
            "Insufficient available balance ({})",
            email_service::format_usd(available_cents)
        )));
    }
    Ok(())
}

pub async fn get_earnings(db: &MongoDB, researcher_id: &str) -> AppResult<ResearcherEarnings> {
    Ok(db
        .collection::<ResearcherEarnings>(EARNINGS)
        .find_one(doc! { "researcher_id": researcher_id })
        .await?
        .unwrap_or_else(|| ResearcherEarnings::empty(researcher_id)))
}

async fn ensure_earnings_record(db: &MongoDB, researcher_id: &str) -> AppResult<()> {
    db.collection::<Document>(EARNINGS)
        .update_one(
            doc! { "researcher_id": researcher_id },
            doc! { "$setOnInsert": {
                "total_earned_cents": 0i64,
                "available_cents": 0i64,
                "pending_payout_cents": 0i64,
                "paid_out_cents": 0i64,
                "sales_count": 0i64,
                "milestone_bonus_cents": 0i64,
                "milestones_reached": [],
                "updated_at": now_ts(),
            } },
        )
        .upsert(true)
        .await?;
    Ok(())
}

/// Credits the researcher's share of a completed sale
pub async fn credit_sale(db: &MongoDB, researcher_id: &str, share_cents: i64) -> AppResult<()> {
    ensure_earnings_record(db, researcher_id).await?;
    db.collection::<Document>(EARNINGS)
        .update_one(
            doc! { "researcher_id": researcher_id },
            doc! {
                "$inc": {
                    "total_earned_cents": share_cents,
                    "available_cents": share_cents,
                    "sales_count": 1i64,
                },
                "$set": { "updated_at": now_ts() },
            },
        )
        .await?;
    log::info!("💰 Credited {} to researcher {}", email_service::format_usd(share_cents), researcher_id);
    Ok(())
}

pub async fn total_downloads(db: &MongoDB, researcher_id: &str) -> AppResult<i64> {
    let pipeline = vec![
        doc! { "$match": { "author_id": researcher_id } },
        doc! { "$group": { "_id": null, "total": { "$sum": "$download_count" } } },
    ];
    let mut cursor = db.collection::<Document>(PAPERS).aggregate(pipeline).await?;

    match cursor.next().await {
        Some(result) => {
            let row = result?;
            Ok(match row.get("total") {
                Some(mongodb::bson::Bson::Int32(v)) => *v as i64,
                Some(mongodb::bson::Bson::Int64(v)) => *v,
                Some(mongodb::bson::Bson::Double(v)) => *v as i64,
                _ => 0,
            })
        }
        None => Ok(0),
    }
}

/// Awards every milestone the researcher's downloads have reached and not
/// yet been paid for. Each award is a conditional update, so concurrent
/// calls never pay the same milestone twice.
pub async fn apply_milestones(db: &MongoDB, researcher_id: &str) -> AppResult<Vec<Milestone>> {
    let total = total_downloads(db, researcher_id).await?;
    let earnings = get_earnings(db, researcher_id).await?;
    let candidates = newly_reached(total, &earnings.milestones_reached);
    if candidates.is_empty() {
        return Ok(vec![]);
    }

    ensure_earnings_record(db, researcher_id).await?;
    let collection = db.collection::<Document>(EARNINGS);
    let mut awarded = Vec::new();

    for milestone in candidates {
        let result = collection
            .update_one(
                doc! { "researcher_id": researcher_id, "milestones_reached": { "$ne": milestone.downloads } },
                doc! {
                    "$addToSet": { "milestones_reached": milestone.downloads },
                    "$inc": {
                        "milestone_bonus_cents": milestone.bonus_cents,
                        "total_earned_cents": milestone.bonus_cents,
                        "available_cents": milestone.bonus_cents,
                    },
                    "$set": { "updated_at": now_ts() },
                },
            )
            .await?;

        if result.modified_count > 0 {
            log::info!(
                "🏆 Researcher {} reached {} downloads: bonus {}",
                researcher_id,
                milestone.downloads,
                email_service::format_usd(milestone.bonus_cents)
            );
            awarded.push(milestone);
        }
    }

    Ok(awarded)
}

/// Moves `amount_cents` from available to pending payout and records the request
pub async fn request_payout(db: &MongoDB, researcher_id: &str, amount_cents: i64) -> AppResult<Payment> {
    let earnings = get_earnings(db, researcher_id).await?;
    validate_payout_amount(amount_cents, earnings.available_cents)?;

    let reserved = db
        .collection::<Document>(EARNINGS)
        .update_one(
            doc! { "researcher_id": researcher_id, "available_cents": { "$gte": amount_cents } },
            doc! {
                "$inc": { "available_cents": -amount_cents, "pending_payout_cents": amount_cents },
                "$set": { "updated_at": now_ts() },
            },
        )
        .await?;
    if reserved.modified_count == 0 {
        return Err(AppError::InvalidRequest("Insufficient available balance".into()));
    }

    let now = now_ts();
    let mut payment = Payment {
        id: None,
        kind: PaymentKind::Payout,
        user_id: researcher_id.to_string(),
        paper_id: None,
        paper_title: None,
        researcher_id: Some(researcher_id.to_string()),
        amount_cents,
        researcher_share_cents: amount_cents,
        currency: "usd".into(),
        status: PaymentStatus::Pending,
        stripe_session_id: None,
        checkout_url: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        credited: false,
    };

    match db.collection::<Payment>(PAYMENTS).insert_one(&payment).await {
        Ok(inserted) => payment.id = inserted.inserted_id.as_object_id(),
        Err(e) => {
            // No payout record to settle, so hand the reservation back
            if let Err(rollback) = release_reservation(db, researcher_id, amount_cents).await {
                log::error!(
                    "❌ Could not release {} reserved for {}: {}",
                    email_service::format_usd(amount_cents),
                    researcher_id,
                    rollback
                );
            }
            return Err(e.into());
        }
    }

    log::info!(
        "💸 Payout of {} requested by {}",
        email_service::format_usd(amount_cents),
        researcher_id
    );
    Ok(payment)
}

async fn release_reservation(db: &MongoDB, researcher_id: &str, amount_cents: i64) -> AppResult<()> {
    db.collection::<Document>(EARNINGS)
        .update_one(
            doc! { "researcher_id": researcher_id },
            doc! {
                "$inc": { "available_cents": amount_cents, "pending_payout_cents": -amount_cents },
                "$set": { "updated_at": now_ts() },
            },
        )
        .await?;
    Ok(())
}

/// Admin decision on a pending payout
pub async fn settle_payout(
    db: &MongoDB,
    integrations: &Integrations,
    payment_id: &str,
    approve: bool,
) -> AppResult<Payment> {
    let object_id = parse_object_id(payment_id)?;
    let now = now_ts();
    let next = if approve { PaymentStatus::Completed } else { PaymentStatus::Rejected };

    let payments = db.collection::<Payment>(PAYMENTS);
    let payment = payments
        .find_one_and_update(
            doc! {
                "_id": object_id,
                "kind": PaymentKind::Payout.as_str(),
                "status": PaymentStatus::Pending.as_str(),
            },
            doc! { "$set": { "status": next.as_str(), "updated_at": now, "completed_at": now } },
        )
        .return_document(ReturnDocument::After)
        .await?;

    let payment = match payment {
        Some(p) => p,
        None => {
            return match payments
                .find_one(doc! { "_id": object_id, "kind": PaymentKind::Payout.as_str() })
                .await?
            {
                Some(p) => Err(AppError::Conflict(format!("Payout already {}", p.status.as_str()))),
                None => Err(AppError::NotFound("Payout not found".into())),
            };
        }
    };

    let amount = payment.amount_cents;
    let inc = if approve {
        doc! { "pending_payout_cents": -amount, "paid_out_cents": amount }
    } else {
        doc! { "pending_payout_cents": -amount, "available_cents": amount }
    };
    db.collection::<Document>(EARNINGS)
        .update_one(
            doc! { "researcher_id": &payment.user_id },
            doc! { "$inc": inc, "$set": { "updated_at": now } },
        )
        .await?;

    log::info!(
        "✅ Payout {} {} ({})",
        payment_id,
        next.as_str(),
        email_service::format_usd(amount)
    );

    if let Ok(researcher) = auth_service::find_user(db, &payment.user_id).await {
        integrations
            .mailer
            .send(email_service::payout_settled(&researcher.email, amount, approve))
            .await;
    }

    Ok(payment)
}

pub async fn list_payouts(db: &MongoDB, status: Option<PaymentStatus>) -> AppResult<Vec<Payment>> {
    let mut filter = doc! { "kind": PaymentKind::Payout.as_str() };
    if let Some(status) = status {
        filter.insert("status", status.as_str());
    }

    let cursor = db
        .collection::<Payment>(PAYMENTS)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_researcher_share_rounds_down() {
        assert_eq!(researcher_share(1000, 70), 700);
        assert_eq!(researcher_share(999, 70), 699); // 699.3
        assert_eq!(researcher_share(1, 70), 0);
        assert_eq!(researcher_share(1000, 0), 0);
        assert_eq!(researcher_share(1000, 150), 1000);
        assert_eq!(researcher_share(-5, 70), 0);
    }

    #[test]
    fn test_researcher_share_of_huge_amount() {
        assert_eq!(researcher_share(i64::MAX / 10, 70), 645_636_042_579_834_306);
        assert_eq!(researcher_share(i64::MAX, 100), i64::MAX);
    }

    #[test]
    fn test_newly_reached_skips_awarded() {
        assert!(newly_reached(99, &[]).is_empty());

        let reached: Vec<i64> = newly_reached(1_200, &[]).iter().map(|m| m.downloads).collect();
        assert_eq!(reached, vec![100, 500, 1_000]);

        let reached: Vec<i64> = newly_reached(1_200, &[100, 500]).iter().map(|m| m.downloads).collect();
        assert_eq!(reached, vec![1_000]);

        assert!(newly_reached(20_000, &[100, 500, 1_000, 5_000, 10_000]).is_empty());
    }

    #[test]
    fn test_next_milestone() {
        assert_eq!(next_milestone(0).map(|m| m.downloads), Some(100));
        assert_eq!(next_milestone(100).map(|m| m.downloads), Some(500));
        assert_eq!(next_milestone(9_999).map(|m| m.bonus_cents), Some(50_000));
        assert_eq!(next_milestone(10_000), None);
    }

    #[test]
    fn test_milestone_progress_sorts_reached() {
        let progress = milestone_progress(600, &[500, 100]);
        assert_eq!(progress.reached, vec![100, 500]);
        assert_eq!(progress.next.map(|m| m.downloads), Some(1_000));
    }

    #[test]
    fn test_payout_validation() {
        assert!(validate_payout_amount(999, 5_000).is_err());
        assert!(validate_payout_amount(1_000, 999).is_err());
        assert!(validate_payout_amount(1_000, 1_000).is_ok());
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_milestones_are_awarded_once() {
        use crate::models::{paper::sample_paper, ResearchPaper};
        use crate::services::testing;

        let db = testing::test_db().await;
        let researcher = mongodb::bson::oid::ObjectId::new().to_hex();
        let mut paper = sample_paper();
        paper.id = None;
        paper.author_id = researcher.clone();
        paper.download_count = 600;
        db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();

        let first: Vec<i64> = apply_milestones(&db, &researcher).await.unwrap().iter().map(|m| m.downloads).collect();
        assert_eq!(first, vec![100, 500]);
        assert!(apply_milestones(&db, &researcher).await.unwrap().is_empty());

        let earnings = get_earnings(&db, &researcher).await.unwrap();
        assert_eq!(earnings.milestone_bonus_cents, 3_000);
        assert_eq!(earnings.available_cents, 3_000);

        db.collection::<ResearchPaper>(PAPERS).delete_many(doc! { "author_id": &researcher }).await.unwrap();
        db.collection::<Document>(EARNINGS).delete_many(doc! { "researcher_id": &researcher }).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_payout_balance_movements() {
        use crate::services::testing;

        let db = testing::test_db().await;
        let integrations = testing::integrations(Some(0.0), Default::default());
        let researcher = mongodb::bson::oid::ObjectId::new().to_hex();
        credit_sale(&db, &researcher, 5_000).await.unwrap();

        assert!(request_payout(&db, &researcher, 6_000).await.is_err());

        let approved = request_payout(&db, &researcher, 2_000).await.unwrap();
        let earnings = get_earnings(&db, &researcher).await.unwrap();
        assert_eq!((earnings.available_cents, earnings.pending_payout_cents), (3_000, 2_000));

        let approved_id = approved.id.unwrap().to_hex();
        settle_payout(&db, &integrations, &approved_id, true).await.unwrap();
        let earnings = get_earnings(&db, &researcher).await.unwrap();
        assert_eq!((earnings.pending_payout_cents, earnings.paid_out_cents), (0, 2_000));
        assert!(matches!(
            settle_payout(&db, &integrations, &approved_id, true).await,
            Err(AppError::Conflict(_))
        ));

        let rejected = request_payout(&db, &researcher, 1_000).await.unwrap();
        settle_payout(&db, &integrations, &rejected.id.unwrap().to_hex(), false).await.unwrap();
        let earnings = get_earnings(&db, &researcher).await.unwrap();
        assert_eq!((earnings.available_cents, earnings.pending_payout_cents), (3_000, 0));

        db.collection::<Payment>(PAYMENTS).delete_many(doc! { "user_id": &researcher }).await.unwrap();
        db.collection::<Document>(EARNINGS).delete_many(doc! { "researcher_id": &researcher }).await.unwrap();
    }
}
