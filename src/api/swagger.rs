use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ScholarShare API",
        version = "1.0.0",
        description = "Upload, review and browse research papers.\n\n**Authentication:** JWT Bearer tokens from `/api/v1/auth/login`.\n\n**Roles:** `admin`, `researcher`, `user`.\n\n**Features:**\n- Paper upload with automated grammar (LanguageTool) and plagiarism (Winston AI) checks\n- Admin moderation\n- Stripe checkout for paid papers\n- Researcher earnings, download milestones and payouts\n- Role dashboards",
        contact(
            name = "ScholarShare Team",
            email = "support@scholarshare.app"
        )
    ),
    paths(
        // Auth
        crate::api::auth::login,
        crate::api::auth::register,
        crate::api::auth::refresh_token,
        crate::api::auth::verify_token,
        crate::api::auth::get_me,
        crate::api::auth::update_me,
        crate::api::auth::delete_me,

        // Health & Metrics
        crate::api::health::health_check,
        crate::api::metrics::get_metrics,

        // Papers
        crate::api::papers::browse_papers,
        crate::api::papers::get_categories,
        crate::api::papers::get_paper,
        crate::api::papers::upload_paper,
        crate::api::papers::my_papers,
        crate::api::papers::update_paper,
        crate::api::papers::delete_paper,
        crate::api::papers::run_checks,
        crate::api::papers::download_paper,

        // Reviews
        crate::api::papers::list_reviews,
        crate::api::papers::add_review,
        crate::api::reviews::update_review,
        crate::api::reviews::delete_review,

        // Payments & Earnings
        crate::api::payments::create_checkout,
        crate::api::payments::confirm_checkout,
        crate::api::payments::list_payments,
        crate::api::earnings::get_earnings,
        crate::api::earnings::request_payout,

        // Dashboards
        crate::api::dashboard::admin_dashboard,
        crate::api::dashboard::researcher_dashboard,
        crate::api::dashboard::user_dashboard,

        // Admin
        crate::api::admin::list_users,
        crate::api::admin::change_role,
        crate::api::admin::change_status,
        crate::api::admin::list_papers,
        crate::api::admin::review_paper,
        crate::api::admin::list_payouts,
        crate::api::admin::settle_payout,
    ),
    components(
        schemas(
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::RefreshTokenRequest,
            crate::services::auth_service::UpdateProfileRequest,
            crate::services::auth_service::AuthResponse,
            crate::models::UserInfo,
            crate::models::Role,

            crate::api::health::HealthResponse,

            crate::models::UploadPaperRequest,
            crate::models::UpdatePaperRequest,
            crate::models::ReviewPaperRequest,
            crate::models::ReviewDecision,
            crate::models::PaperSort,
            crate::models::PaperStatus,
            crate::models::PaperListItem,
            crate::models::PaperResponse,
            crate::models::PaperChecks,
            crate::models::CheckStatus,
            crate::models::GrammarReport,
            crate::models::GrammarIssue,
            crate::models::PlagiarismReport,
            crate::models::PlagiarismSource,

            crate::models::CreateReviewRequest,
            crate::models::UpdateReviewRequest,
            crate::models::ReviewResponse,

            crate::models::CheckoutRequest,
            crate::models::CheckoutResponse,
            crate::models::ConfirmPaymentRequest,
            crate::models::PaymentResponse,
            crate::models::PaymentKind,
            crate::models::PaymentStatus,
            crate::models::PayoutRequest,
            crate::models::SettlePayoutRequest,
            crate::models::ResearcherEarnings,
            crate::models::Milestone,
            crate::models::MilestoneProgress,

            crate::services::dashboard_service::AdminDashboard,
            crate::services::dashboard_service::ResearcherDashboard,
            crate::services::dashboard_service::UserDashboard,
            crate::services::dashboard_service::RoleCounts,
            crate::services::dashboard_service::StatusCounts,

            crate::services::admin_service::ChangeRoleRequest,
            crate::services::admin_service::ChangeStatusRequest,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, token refresh and profile management."),
        (name = "Health", description = "Health check and Prometheus metrics."),
        (name = "Papers", description = "Upload, browse, edit, check and download research papers."),
        (name = "Reviews", description = "Reader ratings and comments on approved papers."),
        (name = "Payments", description = "Stripe checkout for paid papers."),
        (name = "Earnings", description = "Researcher earnings, milestone bonuses and payout requests."),
        (name = "Dashboard", description = "Role specific overviews for admins, researchers and users."),
        (name = "Admin", description = "User management, paper moderation and payout settlement."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Access token from /api/v1/auth/login"))
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/papers",
            "/api/v1/papers/{id}/download",
            "/api/v1/payments/checkout",
            "/api/v1/admin/payouts/{id}/settle",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
