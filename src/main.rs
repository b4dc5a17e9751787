mod api;
mod config;
mod database;
mod jobs;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{guard, middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::io::{Error, ErrorKind};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{AuthMiddleware, RoleGuard};

/// Base64 inflates the 20 MB file limit by a third, plus the JSON envelope
const JSON_BODY_LIMIT: usize = 30 * 1024 * 1024;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::AppConfig::from_env().map_err(|e| Error::new(ErrorKind::Other, e))?;

    log::info!("🚀 Starting ScholarShare Service...");
    log::info!("📊 Database: {}", database::database_name_from_uri(&config.database_url));

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(|e| Error::new(ErrorKind::Other, format!("Failed to connect to MongoDB: {}", e)))?;
    log::info!("✅ MongoDB connected successfully");

    let integrations = services::Integrations::from_config(&config);

    // 👤 Seed the first admin account
    services::auth_service::seed_admin(&db, &config).await;

    // 🧪 Retry failed or interrupted paper checks
    log::info!("📅 Starting background jobs...");
    jobs::check_scheduler::start_check_scheduler(db.clone(), integrations.clone(), config.clone()).await;
    log::info!("✅ Background jobs started");

    let host = config.host.clone();
    let port = config.port.clone();
    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config);
    let integrations_data = web::Data::new(integrations);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config_data.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(integrations_data.clone())
            .app_data(web::JsonConfig::default().limit(JSON_BODY_LIMIT))
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Metrics
            .route("/metrics", web::get().to(api::metrics::get_metrics))

            // ==================== AUTH ====================
            .service(
                web::scope("/api/v1/auth")
                    .route("/register", web::post().to(api::auth::register))
                    .route("/login", web::post().to(api::auth::login))
                    .route("/refresh", web::post().to(api::auth::refresh_token))
                    .route("/verify", web::get().to(api::auth::verify_token))
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::auth::get_me))
                            .route(web::put().to(api::auth::update_me))
                            .route(web::delete().to(api::auth::delete_me))
                    )
            )

            // ==================== PAPERS ====================
            // Same path, different access: resource guards pick by method before auth runs
            .service(
                web::scope("/api/v1/papers")
                    .service(
                        web::resource("")
                            .guard(guard::Get())
                            .route(web::get().to(api::papers::browse_papers))
                    )
                    .service(
                        web::resource("")
                            .guard(guard::Post())
                            .wrap(RoleGuard::publishers())
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::papers::upload_paper))
                    )
                    .route("/categories", web::get().to(api::papers::get_categories))
                    .service(
                        web::resource("/mine")
                            .wrap(RoleGuard::publishers())
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::papers::my_papers))
                    )
                    .service(
                        web::resource("/{id}")
                            .guard(guard::Get())
                            .route(web::get().to(api::papers::get_paper))
                    )
                    .service(
                        web::resource("/{id}")
                            .wrap(AuthMiddleware)
                            .route(web::put().to(api::papers::update_paper))
                            .route(web::delete().to(api::papers::delete_paper))
                    )
                    .service(
                        web::resource("/{id}/checks")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::papers::run_checks))
                    )
                    .service(
                        web::resource("/{id}/download")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(api::papers::download_paper))
                    )
                    .service(
                        web::resource("/{id}/reviews")
                            .guard(guard::Get())
                            .route(web::get().to(api::papers::list_reviews))
                    )
                    .service(
                        web::resource("/{id}/reviews")
                            .wrap(AuthMiddleware)
                            .route(web::post().to(api::papers::add_review))
                    )
            )

            // ==================== REVIEWS ====================
            .service(
                web::scope("/api/v1/reviews")
                    .wrap(AuthMiddleware)
                    .route("/{id}", web::put().to(api::reviews::update_review))
                    .route("/{id}", web::delete().to(api::reviews::delete_review))
            )

            // ==================== PAYMENTS & EARNINGS ====================
            .service(
                web::scope("/api/v1/payments")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::payments::list_payments))
                    .route("/checkout", web::post().to(api::payments::create_checkout))
                    .route("/confirm", web::post().to(api::payments::confirm_checkout))
            )
            .service(
                web::scope("/api/v1/earnings")
                    .wrap(RoleGuard::publishers())
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(api::earnings::get_earnings))
                    .route("/payouts", web::post().to(api::earnings::request_payout))
            )

            // ==================== DASHBOARDS ====================
            .service(
                web::scope("/api/v1/dashboard")
                    .wrap(AuthMiddleware)
                    .service(
                        web::resource("/admin")
                            .wrap(RoleGuard::admin())
                            .route(web::get().to(api::dashboard::admin_dashboard))
                    )
                    .service(
                        web::resource("/researcher")
                            .wrap(RoleGuard::publishers())
                            .route(web::get().to(api::dashboard::researcher_dashboard))
                    )
                    .route("/user", web::get().to(api::dashboard::user_dashboard))
            )

            // ==================== ADMIN ====================
            .service(
                web::scope("/api/v1/admin")
                    .wrap(RoleGuard::admin())
                    .wrap(AuthMiddleware)
                    .route("/users", web::get().to(api::admin::list_users))
                    .route("/users/{id}/role", web::put().to(api::admin::change_role))
                    .route("/users/{id}/status", web::put().to(api::admin::change_status))
                    .route("/papers", web::get().to(api::admin::list_papers))
                    .route("/papers/{id}/review", web::put().to(api::admin::review_paper))
                    .route("/payouts", web::get().to(api::admin::list_payouts))
                    .route("/payouts/{id}/settle", web::post().to(api::admin::settle_payout))
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}
