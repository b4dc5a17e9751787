// Background retry of automated paper checks that failed, never started, or were abandoned mid-run

use crate::{
    config::AppConfig,
    database::MongoDB,
    services::{check_service, paper_service, Integrations},
    utils::error::AppResult,
};
use tokio::time::{interval, Duration};

/// Pause between papers so the plagiarism API's rate limit is not hit in bursts
const PAUSE_BETWEEN_PAPERS: Duration = Duration::from_secs(2);

/// Starts the retry loop. The first tick fires immediately; runs cut short
/// by a restart are picked up once their claim outlives the check lease.
pub async fn start_check_scheduler(db: MongoDB, integrations: Integrations, config: AppConfig) {
    let every = Duration::from_secs(config.check_retry_interval_secs.max(60));
    log::info!("🧪 Starting check retry scheduler (every {}s)", every.as_secs());

    tokio::spawn(async move {
        let mut ticker = interval(every);

        loop {
            ticker.tick().await;

            match retry_pending_checks(&db, &integrations, &config).await {
                Ok((0, _)) => log::debug!("⏰ No paper checks to retry"),
                Ok((attempted, completed)) => {
                    log::info!("✅ Check retry pass: {}/{} papers completed", completed, attempted)
                }
                Err(e) => log::error!("❌ Check retry pass failed: {}", e),
            }
        }
    });

    log::info!("✅ Check retry scheduler started");
}

/// Re-runs checks for every eligible paper, returning `(attempted, completed)`
async fn retry_pending_checks(
    db: &MongoDB,
    integrations: &Integrations,
    config: &AppConfig,
) -> AppResult<(usize, usize)> {
    let papers = paper_service::papers_needing_checks(db).await?;
    let mut completed = 0;

    for (i, paper_id) in papers.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(PAUSE_BETWEEN_PAPERS).await;
        }
        match check_service::run_checks(db, integrations, config, paper_id).await {
            Ok(_) => completed += 1,
            Err(e) => log::warn!("  ⚠️  Retry for paper {} failed: {}", paper_id, e),
        }
    }

    Ok((papers.len(), completed))
}
