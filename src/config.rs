use std::env;

/// Runtime configuration, read once from the environment (.env supported via dotenv)
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub frontend_url: String,

    pub languagetool_url: String,
    pub winston_api_url: String,
    pub winston_api_key: Option<String>,
    pub blob_api_url: String,
    pub blob_token: Option<String>,
    pub stripe_api_url: String,
    pub stripe_secret_key: Option<String>,

    pub smtp_host: String,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: String,

    /// Plagiarism percentage above which a pending paper is auto-rejected
    pub plagiarism_threshold: f64,
    pub researcher_share_percent: i64,
    pub check_retry_interval_secs: u64,

    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Invalid value for {}: '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("⚠️  JWT_SECRET not set, using an insecure development secret");
            "default-secret-change-me".to_string()
        });

        let smtp_username = var_opt("SMTP_USERNAME");
        let mail_from = var_opt("MAIL_FROM")
            .or_else(|| smtp_username.clone())
            .unwrap_or_else(|| "ScholarShare <no-reply@scholarshare.local>".to_string());

        let researcher_share_percent: i64 = parse_or("RESEARCHER_SHARE_PERCENT", 70);
        if !(0..=100).contains(&researcher_share_percent) {
            return Err(format!(
                "RESEARCHER_SHARE_PERCENT must be between 0 and 100, got {}",
                researcher_share_percent
            ));
        }

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: var_or("PORT", "3002"),
            database_url,
            jwt_secret,
            jwt_issuer: var_or("JWT_ISSUER", "scholarshare"),
            jwt_audience: var_or("JWT_AUDIENCE", "scholarshare-api"),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:3000"),

            languagetool_url: var_or("LANGUAGETOOL_URL", "https://api.languagetool.org"),
            winston_api_url: var_or("WINSTON_API_URL", "https://api.gowinston.ai"),
            winston_api_key: var_opt("WINSTON_API_KEY"),
            blob_api_url: var_or("BLOB_API_URL", "https://blob.vercel-storage.com"),
            blob_token: var_opt("BLOB_READ_WRITE_TOKEN"),
            stripe_api_url: var_or("STRIPE_API_URL", "https://api.stripe.com"),
            stripe_secret_key: var_opt("STRIPE_SECRET_KEY"),

            smtp_host: var_or("SMTP_HOST", "smtp.gmail.com"),
            smtp_username,
            smtp_password: var_opt("SMTP_PASSWORD"),
            mail_from,

            plagiarism_threshold: parse_or("PLAGIARISM_THRESHOLD", 30.0),
            researcher_share_percent,
            check_retry_interval_secs: parse_or("CHECK_RETRY_INTERVAL_SECS", 900),

            admin_email: var_opt("ADMIN_EMAIL"),
            admin_password: var_opt("ADMIN_PASSWORD"),
        })
    }

    /// Configuration used by unit tests; no external service is reachable
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: "0".into(),
            database_url: "mongodb://localhost:27017/ScholarShareTest".into(),
            jwt_secret: "test-secret".into(),
            jwt_issuer: "scholarshare".into(),
            jwt_audience: "scholarshare-api".into(),
            frontend_url: "http://localhost:3000".into(),
            languagetool_url: "http://127.0.0.1:9".into(),
            winston_api_url: "http://127.0.0.1:9".into(),
            winston_api_key: None,
            blob_api_url: "http://127.0.0.1:9".into(),
            blob_token: None,
            stripe_api_url: "http://127.0.0.1:9".into(),
            stripe_secret_key: None,
            smtp_host: "localhost".into(),
            smtp_username: None,
            smtp_password: None,
            mail_from: "ScholarShare <no-reply@scholarshare.local>".into(),
            plagiarism_threshold: 30.0,
            researcher_share_percent: 70,
            check_retry_interval_secs: 900,
            admin_email: None,
            admin_password: None,
        }
    }
}
