use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Running earnings ledger of one researcher (stored in `researcher_earnings`)
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResearcherEarnings {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub id: Option<ObjectId>,
    pub researcher_id: String,
    #[serde(default)]
    pub total_earned_cents: i64,
    #[serde(default)]
    pub available_cents: i64,
    #[serde(default)]
    pub pending_payout_cents: i64,
    #[serde(default)]
    pub paid_out_cents: i64,
    #[serde(default)]
    pub sales_count: i64,
    #[serde(default)]
    pub milestone_bonus_cents: i64,
    /// Download thresholds already awarded
    #[serde(default)]
    pub milestones_reached: Vec<i64>,
    pub updated_at: i64,
}

impl ResearcherEarnings {
    pub fn empty(researcher_id: &str) -> Self {
        ResearcherEarnings {
            id: None,
            researcher_id: researcher_id.to_string(),
            total_earned_cents: 0,
            available_cents: 0,
            pending_payout_cents: 0,
            paid_out_cents: 0,
            sales_count: 0,
            milestone_bonus_cents: 0,
            milestones_reached: Vec::new(),
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Milestone {
    pub downloads: i64,
    pub bonus_cents: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MilestoneProgress {
    pub total_downloads: i64,
    pub next: Option<Milestone>,
    pub reached: Vec<i64>,
}
