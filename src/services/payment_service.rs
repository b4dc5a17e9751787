use crate::{
    api::metrics,
    config::AppConfig,
    database::{MongoDB, PAPERS, PAYMENTS},
    models::{Payment, PaymentKind, PaymentStatus, PaperStatus, ResearchPaper},
    services::{
        auth_service::{self, Claims},
        earnings_service, email_service, now_ts, parse_object_id, Integrations,
    },
    utils::error::{AppError, AppResult},
    utils::http::HTTP_CLIENT,
};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub payment_id: String,
    pub paper_id: String,
    pub user_id: String,
    pub title: String,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// "open" | "complete" | "expired"
    #[serde(default)]
    pub status: Option<String>,
    /// "paid" | "unpaid" | "no_payment_required"
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Card payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutSession>;
    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession>;
}

/// Stripe Checkout over the REST API (form-encoded requests)
pub struct StripeGateway {
    base_url: String,
    secret_key: Option<String>,
}

impl StripeGateway {
    pub fn new(base_url: &str, secret_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    fn secret_key(&self) -> AppResult<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| AppError::ExternalError("STRIPE_SECRET_KEY is not configured".into()))
    }

    async fn parse_session(response: reqwest::Response) -> AppResult<CheckoutSession> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!("Stripe API error ({}): {}", status, body)));
        }
        Ok(response.json().await?)
    }
}

pub fn checkout_form(params: &CheckoutParams) -> Vec<(String, String)> {
    vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), params.success_url.clone()),
        ("cancel_url".into(), params.cancel_url.clone()),
        ("customer_email".into(), params.customer_email.clone()),
        ("client_reference_id".into(), params.payment_id.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        ("line_items[0][price_data][currency]".into(), params.currency.clone()),
        ("line_items[0][price_data][unit_amount]".into(), params.amount_cents.to_string()),
        ("line_items[0][price_data][product_data][name]".into(), params.title.clone()),
        ("metadata[payment_id]".into(), params.payment_id.clone()),
        ("metadata[paper_id]".into(), params.paper_id.clone()),
        ("metadata[user_id]".into(), params.user_id.clone()),
    ]
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutSession> {
        let key = self.secret_key()?;
        log::info!("💳 Creating Stripe checkout session for payment {}", params.payment_id);

        let response = HTTP_CLIENT
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(key)
            .header("Idempotency-Key", format!("checkout-{}", params.payment_id))
            .form(&checkout_form(params))
            .send()
            .await?;

        Self::parse_session(response).await
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession> {
        let key = self.secret_key()?;
        log::debug!("💳 Retrieving Stripe checkout session {}", session_id);

        let response = HTTP_CLIENT
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.base_url,
                urlencoding::encode(session_id)
            ))
            .bearer_auth(key)
            .send()
            .await?;

        Self::parse_session(response).await
    }
}

pub async fn has_purchased(db: &MongoDB, user_id: &str, paper_id: &str) -> AppResult<bool> {
    let count = db
        .collection::<Payment>(PAYMENTS)
        .count_documents(doc! {
            "kind": PaymentKind::Purchase.as_str(),
            "status": PaymentStatus::Completed.as_str(),
            "user_id": user_id,
            "paper_id": paper_id,
        })
        .await?;
    Ok(count > 0)
}

/// A checkout inserted this recently may still be waiting on Stripe for its session
const CHECKOUT_CREATION_GRACE_SECS: i64 = 60;

/// Resumes the buyer's open checkout for the paper, so one purchase never
/// has two payable sessions. Pending payments whose session expired or
/// never got created are failed on the way.
async fn resume_pending_checkout(
    integrations: &Integrations,
    payments: &Collection<Payment>,
    user_id: &str,
    paper_id: &str,
) -> AppResult<Option<(Payment, CheckoutSession)>> {
    let pending: Vec<Payment> = payments
        .find(doc! {
            "user_id": user_id,
            "paper_id": paper_id,
            "kind": PaymentKind::Purchase.as_str(),
            "status": PaymentStatus::Pending.as_str(),
        })
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    let now = now_ts();
    for payment in pending {
        let payment_oid = match payment.id {
            Some(id) => id,
            None => continue,
        };

        match &payment.stripe_session_id {
            Some(session_id) => {
                let session = integrations.payments.retrieve_checkout_session(session_id).await?;
                if session.payment_status == "paid" {
                    return Err(AppError::Conflict(
                        "This paper has already been paid for, confirm the payment to unlock it".into(),
                    ));
                }
                if session.status.as_deref() == Some("open") && session.url.is_some() {
                    log::info!("💳 Resuming checkout {} for paper {}", session.id, paper_id);
                    return Ok(Some((payment, session)));
                }
            }
            None if now - payment.created_at < CHECKOUT_CREATION_GRACE_SECS => {
                return Err(AppError::Conflict("A checkout for this paper is being created, try again shortly".into()));
            }
            None => {}
        }

        payments
            .update_one(
                doc! { "_id": payment_oid, "status": PaymentStatus::Pending.as_str() },
                doc! { "$set": { "status": PaymentStatus::Failed.as_str(), "updated_at": now } },
            )
            .await?;
        log::info!("⌛ Abandoned checkout {} closed", payment_oid);
    }

    Ok(None)
}

/// Starts a Stripe checkout for an approved, priced paper
pub async fn create_checkout(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
    claims: &Claims,
    paper_id: &str,
) -> AppResult<(Payment, CheckoutSession)> {
    let object_id = parse_object_id(paper_id)?;
    let paper = db
        .collection::<ResearchPaper>(PAPERS)
        .find_one(doc! { "_id": object_id, "status": PaperStatus::Approved.as_str() })
        .await?
        .ok_or_else(|| AppError::NotFound("Paper not found".into()))?;

    if paper.is_free() {
        return Err(AppError::InvalidRequest("This paper is free to download".into()));
    }
    if paper.author_id == claims.sub {
        return Err(AppError::InvalidRequest("You cannot purchase your own paper".into()));
    }
    let paper_hex = paper.id_hex();
    if has_purchased(db, &claims.sub, &paper_hex).await? {
        return Err(AppError::Conflict("You already own this paper".into()));
    }

    let payments = db.collection::<Payment>(PAYMENTS);
    if let Some(resumed) = resume_pending_checkout(integrations, &payments, &claims.sub, &paper_hex).await? {
        return Ok(resumed);
    }

    let now = now_ts();
    let share = earnings_service::researcher_share(paper.price_cents, config.researcher_share_percent);
    let mut payment = Payment {
        id: Some(ObjectId::new()),
        kind: PaymentKind::Purchase,
        user_id: claims.sub.clone(),
        paper_id: Some(paper_hex.clone()),
        paper_title: Some(paper.title.clone()),
        researcher_id: Some(paper.author_id.clone()),
        amount_cents: paper.price_cents,
        researcher_share_cents: share,
        currency: "usd".into(),
        status: PaymentStatus::Pending,
        stripe_session_id: None,
        checkout_url: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        credited: false,
    };
    let payment_oid = payment.id.unwrap_or_else(ObjectId::new);
    let payment_hex = payment_oid.to_hex();

    payments.insert_one(&payment).await?;

    let frontend = config.frontend_url.trim_end_matches('/');
    let params = CheckoutParams {
        payment_id: payment_hex.clone(),
        paper_id: paper_hex.clone(),
        user_id: claims.sub.clone(),
        title: paper.title.clone(),
        amount_cents: paper.price_cents,
        currency: payment.currency.clone(),
        customer_email: claims.email.clone(),
        success_url: format!("{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}", frontend),
        cancel_url: format!("{}/papers/{}", frontend, paper_hex),
    };

    let session = match integrations.payments.create_checkout_session(&params).await {
        Ok(session) => session,
        Err(e) => {
            payments
                .update_one(
                    doc! { "_id": payment_oid },
                    doc! { "$set": { "status": PaymentStatus::Failed.as_str(), "updated_at": now_ts() } },
                )
                .await?;
            return Err(e);
        }
    };

    payments
        .update_one(
            doc! { "_id": payment_oid },
            doc! { "$set": {
                "stripe_session_id": &session.id,
                "checkout_url": session.url.clone(),
                "updated_at": now_ts(),
            } },
        )
        .await?;

    payment.stripe_session_id = Some(session.id.clone());
    payment.checkout_url = session.url.clone();

    log::info!("💳 Checkout {} created for paper {} by {}", session.id, paper_hex, claims.sub);
    Ok((payment, session))
}

/// Outcome of comparing a Stripe session with its local payment
#[derive(Debug, PartialEq)]
pub enum SessionOutcome {
    Paid,
    Expired,
    Open,
}

pub fn session_outcome(payment: &Payment, session: &CheckoutSession) -> AppResult<SessionOutcome> {
    let payment_hex = payment.id.map(|id| id.to_hex()).unwrap_or_default();
    if session.metadata.get("payment_id") != Some(&payment_hex) {
        return Err(AppError::ExternalError("Checkout session does not match this payment".into()));
    }

    if session.payment_status == "paid" {
        if session.amount_total != Some(payment.amount_cents) {
            return Err(AppError::ExternalError(format!(
                "Paid amount {:?} does not match expected {}",
                session.amount_total, payment.amount_cents
            )));
        }
        return Ok(SessionOutcome::Paid);
    }

    if session.status.as_deref() == Some("expired") {
        return Ok(SessionOutcome::Expired);
    }
    Ok(SessionOutcome::Open)
}

/// Credits the researcher's share of a completed purchase at most once.
/// The payment is marked first so concurrent confirmations cannot both
/// credit; if crediting then fails the mark is cleared for a later retry.
async fn credit_purchase(db: &MongoDB, payment: &Payment) -> AppResult<bool> {
    let (payment_oid, researcher_id) = match (payment.id, &payment.researcher_id) {
        (Some(id), Some(researcher_id)) => (id, researcher_id),
        _ => return Ok(false),
    };

    let payments = db.collection::<Payment>(PAYMENTS);
    let claimed = payments
        .update_one(
            doc! {
                "_id": payment_oid,
                "status": PaymentStatus::Completed.as_str(),
                "credited": { "$ne": true },
            },
            doc! { "$set": { "credited": true, "updated_at": now_ts() } },
        )
        .await?;
    if claimed.modified_count == 0 {
        return Ok(false);
    }

    if let Err(e) = earnings_service::credit_sale(db, researcher_id, payment.researcher_share_cents).await {
        log::error!("❌ Crediting payment {} failed: {}", payment_oid, e);
        if let Err(undo) = payments
            .update_one(doc! { "_id": payment_oid }, doc! { "$set": { "credited": false } })
            .await
        {
            log::error!("❌ Could not clear credit mark on payment {}: {}", payment_oid, undo);
        }
        return Err(e);
    }
    Ok(true)
}

/// The buyer's address, which differs from the caller when an admin confirms
async fn buyer_email(db: &MongoDB, claims: &Claims, payment: &Payment) -> Option<String> {
    if payment.user_id == claims.sub {
        return Some(claims.email.clone());
    }
    match auth_service::find_user(db, &payment.user_id).await {
        Ok(buyer) => Some(buyer.email),
        Err(e) => {
            log::warn!("⚠️  No buyer to send the receipt for payment {} to: {}", payment.user_id, e);
            None
        }
    }
}

async fn reload_payment(payments: &Collection<Payment>, payment_oid: ObjectId) -> AppResult<Payment> {
    payments
        .find_one(doc! { "_id": payment_oid })
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))
}

/// Reconciles a checkout session after the buyer returns from Stripe.
/// Completing a payment is a conditional pending→completed update and
/// the credit is marked on the payment, so repeated confirmations credit
/// the researcher exactly once and retry a credit that failed earlier.
pub async fn confirm_checkout(
    db: &MongoDB,
    integrations: &Integrations,
    claims: &Claims,
    session_id: &str,
) -> AppResult<Payment> {
    let payments = db.collection::<Payment>(PAYMENTS);
    let payment = payments
        .find_one(doc! { "stripe_session_id": session_id, "kind": PaymentKind::Purchase.as_str() })
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;

    if payment.user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::Forbidden("This payment belongs to another user".into()));
    }
    let payment_oid = payment
        .id
        .ok_or_else(|| AppError::DatabaseError("Payment without id".into()))?;

    if payment.status != PaymentStatus::Pending {
        if payment.needs_credit() && credit_purchase(db, &payment).await? {
            log::info!("💰 Late credit applied for payment {}", payment_oid);
            return reload_payment(&payments, payment_oid).await;
        }
        return Ok(payment);
    }

    let session = integrations.payments.retrieve_checkout_session(session_id).await?;
    let now = now_ts();

    match session_outcome(&payment, &session)? {
        SessionOutcome::Paid => {
            let completed = payments
                .find_one_and_update(
                    doc! { "_id": payment_oid, "status": PaymentStatus::Pending.as_str() },
                    doc! { "$set": {
                        "status": PaymentStatus::Completed.as_str(),
                        "completed_at": now,
                        "updated_at": now,
                    } },
                )
                .return_document(ReturnDocument::After)
                .await?;

            let completed = match completed {
                Some(p) => p,
                // another request completed it first
                None => {
                    let current = reload_payment(&payments, payment_oid).await?;
                    if current.needs_credit() && credit_purchase(db, &current).await? {
                        return reload_payment(&payments, payment_oid).await;
                    }
                    return Ok(current);
                }
            };

            metrics::increment_payments_completed();

            if let Some(to) = buyer_email(db, claims, &completed).await {
                let title = completed.paper_title.clone().unwrap_or_else(|| "your paper".into());
                integrations
                    .mailer
                    .send(email_service::purchase_receipt(
                        &to,
                        &title,
                        completed.amount_cents,
                        &payment_oid.to_hex(),
                    ))
                    .await;
            }

            let credited = credit_purchase(db, &completed).await?;
            log::info!("✅ Payment {} completed", payment_oid);
            Ok(Payment { credited: credited || completed.credited, ..completed })
        }
        SessionOutcome::Expired => {
            let failed = payments
                .find_one_and_update(
                    doc! { "_id": payment_oid, "status": PaymentStatus::Pending.as_str() },
                    doc! { "$set": { "status": PaymentStatus::Failed.as_str(), "updated_at": now } },
                )
                .return_document(ReturnDocument::After)
                .await?;
            log::info!("⌛ Checkout session {} expired", session_id);
            Ok(failed.unwrap_or(payment))
        }
        SessionOutcome::Open => Ok(payment),
    }
}

pub async fn list_user_payments(db: &MongoDB, user_id: &str) -> AppResult<Vec<Payment>> {
    let cursor = db
        .collection::<Payment>(PAYMENTS)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "created_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}

/// Completed purchases of a user, newest first
pub async fn list_purchases(db: &MongoDB, user_id: &str) -> AppResult<Vec<Payment>> {
    let cursor = db
        .collection::<Payment>(PAYMENTS)
        .find(doc! {
            "user_id": user_id,
            "kind": PaymentKind::Purchase.as_str(),
            "status": PaymentStatus::Completed.as_str(),
        })
        .sort(doc! { "completed_at": -1 })
        .await?;
    Ok(cursor.try_collect().await?)
}
