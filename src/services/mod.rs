pub mod admin_service;
pub mod auth_service;
pub mod blob_service;
pub mod check_service;
pub mod dashboard_service;
pub mod earnings_service;
pub mod email_service;
pub mod paper_service;
pub mod payment_service;
pub mod review_service;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::AppConfig;
use crate::utils::error::{AppError, AppResult};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;

pub fn parse_object_id(raw: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidRequest(format!("Invalid id: {}", raw)))
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Outbound integrations shared by every request
#[derive(Clone)]
pub struct Integrations {
    pub blob: Arc<dyn blob_service::BlobStore>,
    pub grammar: Arc<dyn check_service::GrammarChecker>,
    pub plagiarism: Arc<dyn check_service::PlagiarismChecker>,
    pub payments: Arc<dyn payment_service::PaymentGateway>,
    pub mailer: Arc<email_service::Mailer>,
}

impl Integrations {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            blob: Arc::new(blob_service::VercelBlob::new(
                &config.blob_api_url,
                config.blob_token.clone(),
            )),
            grammar: Arc::new(check_service::LanguageTool::new(&config.languagetool_url)),
            plagiarism: Arc::new(check_service::WinstonAi::new(
                &config.winston_api_url,
                config.winston_api_key.clone(),
            )),
            payments: Arc::new(payment_service::StripeGateway::new(
                &config.stripe_api_url,
                config.stripe_secret_key.clone(),
            )),
            mailer: Arc::new(email_service::Mailer::from_config(config)),
        }
    }
}
