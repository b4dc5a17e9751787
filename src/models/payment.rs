use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    /// Reader buys access to a paper
    Purchase,
    /// Researcher withdraws earnings
    Payout,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Purchase => "purchase",
            PaymentKind::Payout => "payout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "rejected" => Ok(PaymentStatus::Rejected),
            other => Err(format!("Invalid payment status: {}", other)),
        }
    }
}

/// Purchase or payout record (stored in the `payments` collection)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub kind: PaymentKind,
    /// Buyer for purchases, researcher for payouts
    pub user_id: String,
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub paper_title: Option<String>,
    #[serde(default)]
    pub researcher_id: Option<String>,
    pub amount_cents: i64,
    #[serde(default)]
    pub researcher_share_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub stripe_session_id: Option<String>,
    #[serde(default)]
    pub checkout_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
    /// Set once the researcher's share of a completed purchase is on their ledger
    #[serde(default)]
    pub credited: bool,
}

impl Payment {
    /// Completed purchase whose researcher share has not been credited yet
    pub fn needs_credit(&self) -> bool {
        self.kind == PaymentKind::Purchase
            && self.status == PaymentStatus::Completed
            && !self.credited
            && self.researcher_id.is_some()
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CheckoutRequest {
    pub paper_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CheckoutResponse {
    pub success: bool,
    pub payment_id: String,
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConfirmPaymentRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PayoutRequest {
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SettlePayoutRequest {
    pub approve: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentResponse {
    pub id: String,
    pub kind: PaymentKind,
    pub user_id: String,
    pub paper_id: Option<String>,
    pub paper_title: Option<String>,
    pub researcher_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        PaymentResponse {
            id: payment.id.map(|id| id.to_hex()).unwrap_or_default(),
            kind: payment.kind,
            user_id: payment.user_id,
            paper_id: payment.paper_id,
            paper_title: payment.paper_title,
            researcher_id: payment.researcher_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            status: payment.status,
            created_at: payment.created_at,
            completed_at: payment.completed_at,
        }
    }
}
