// In-memory stand-ins for the outbound integrations, used by the MongoDB-backed tests

use super::{
    blob_service::{BlobStore, StoredBlob},
    check_service::{GrammarChecker, PlagiarismChecker},
    email_service::Mailer,
    payment_service::{CheckoutParams, CheckoutSession, PaymentGateway},
    Integrations,
};
use crate::database::MongoDB;
use crate::models::{GrammarReport, PlagiarismReport};
use crate::utils::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct FixedGrammar;

#[async_trait]
impl GrammarChecker for FixedGrammar {
    async fn check(&self, text: &str) -> AppResult<GrammarReport> {
        Ok(GrammarReport {
            score: 95.0,
            issue_count: 0,
            word_count: text.split_whitespace().count() as i64,
            issues: vec![],
        })
    }
}

/// Reports a fixed plagiarism score; `None` fails like an unreachable API
pub struct FixedPlagiarism(pub Option<f64>);

#[async_trait]
impl PlagiarismChecker for FixedPlagiarism {
    async fn scan(&self, text: &str) -> AppResult<PlagiarismReport> {
        match self.0 {
            Some(score) => Ok(PlagiarismReport {
                score,
                plagiarized_words: 0,
                total_words: text.split_whitespace().count() as i64,
                sources: vec![],
            }),
            None => Err(AppError::ExternalError("Winston AI unavailable".into())),
        }
    }
}

pub struct NoopBlob;

#[async_trait]
impl BlobStore for NoopBlob {
    async fn put(&self, pathname: &str, _content_type: &str, _bytes: Vec<u8>) -> AppResult<StoredBlob> {
        Ok(StoredBlob {
            url: format!("https://blob.test/{}", pathname),
            pathname: pathname.to_string(),
        })
    }

    async fn delete(&self, _url: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Opens sessions on demand and answers lookups with whatever the test stored
#[derive(Default)]
pub struct ScriptedGateway {
    pub session: Mutex<Option<CheckoutSession>>,
    pub created: Mutex<usize>,
}

impl ScriptedGateway {
    pub fn set_session(&self, session: CheckoutSession) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(&self, params: &CheckoutParams) -> AppResult<CheckoutSession> {
        *self.created.lock().unwrap() += 1;
        let mut metadata = HashMap::new();
        metadata.insert("payment_id".to_string(), params.payment_id.clone());
        let session = CheckoutSession {
            id: format!("cs_test_{}", params.payment_id),
            url: Some(format!("https://checkout.test/{}", params.payment_id)),
            status: Some("open".into()),
            payment_status: "unpaid".into(),
            amount_total: Some(params.amount_cents),
            metadata,
        };
        self.set_session(session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.id == session_id)
            .ok_or_else(|| AppError::ExternalError(format!("No such checkout session: {}", session_id)))
    }
}

pub fn paid(mut session: CheckoutSession) -> CheckoutSession {
    session.status = Some("complete".into());
    session.payment_status = "paid".into();
    session
}

pub fn integrations(plagiarism_score: Option<f64>, gateway: Arc<ScriptedGateway>) -> Integrations {
    Integrations {
        blob: Arc::new(NoopBlob),
        grammar: Arc::new(FixedGrammar),
        plagiarism: Arc::new(FixedPlagiarism(plagiarism_score)),
        payments: gateway,
        mailer: Arc::new(Mailer::disabled("ScholarShare <no-reply@scholarshare.test>")),
    }
}

pub async fn test_db() -> MongoDB {
    dotenv::dotenv().ok();
    let uri = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mongodb://localhost:27017/ScholarShareTest".to_string());
    MongoDB::new(&uri).await.unwrap()
}
