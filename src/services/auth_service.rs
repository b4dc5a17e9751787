use crate::{
    config::AppConfig,
    database::{MongoDB, PAPERS, PAYMENTS, REVIEWS, USERS},
    models::{Payment, PaymentKind, PaymentStatus, Review, Role, User, UserInfo},
    services::review_service,
    utils::error::{AppError, AppResult},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

const ACCESS_TOKEN: &str = "access";
const REFRESH_TOKEN: &str = "refresh";

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub name: String,
    pub role: Role,
    pub token_type: String,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    /// "user" (default) or "researcher"
    pub role: Option<String>,
    pub institution: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub institution: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

fn issue_token(
    config: &AppConfig,
    user: &User,
    token_type: &str,
    ttl: Duration,
) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.user_id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        token_type: token_type.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.jwt_audience.clone(),
        iss: config.jwt_issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| AppError::DatabaseError(format!("Failed to generate token: {}", e)))
}

// Access token (24h)
pub fn generate_jwt(config: &AppConfig, user: &User) -> AppResult<String> {
    issue_token(config, user, ACCESS_TOKEN, Duration::hours(24))
}

// Refresh token (longer expiry)
pub fn generate_refresh_token(config: &AppConfig, user: &User) -> AppResult<String> {
    issue_token(config, user, REFRESH_TOKEN, Duration::days(30))
}

fn decode_claims(config: &AppConfig, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.jwt_audience.clone()]);

    let mut issuers = HashSet::new();
    issuers.insert(config.jwt_issuer.clone());
    validation.iss = Some(issuers);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Verifies an access token
pub fn verify_token(config: &AppConfig, token: &str) -> AppResult<Claims> {
    let claims = decode_claims(config, token)?;
    if claims.token_type != ACCESS_TOKEN {
        return Err(AppError::Unauthorized("Refresh tokens cannot be used for API access".into()));
    }
    Ok(claims)
}

fn auth_response(config: &AppConfig, user: User) -> AppResult<AuthResponse> {
    let token = generate_jwt(config, &user)?;
    let refresh_token = generate_refresh_token(config, &user)?;
    Ok(AuthResponse {
        success: true,
        token,
        refresh_token,
        user: UserInfo::from(user),
    })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates a registration request, returning the normalized email and role
pub fn validate_registration(request: &RegisterRequest) -> AppResult<(String, Role)> {
    let email = normalize_email(&request.email);
    let valid_email = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);
    if !valid_email {
        return Err(AppError::InvalidRequest("A valid email is required".into()));
    }

    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    if request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest("Name is required".into()));
    }

    let role = match request.role.as_deref() {
        None => Role::User,
        Some(raw) => raw.parse::<Role>().map_err(AppError::InvalidRequest)?,
    };
    if role == Role::Admin {
        return Err(AppError::Forbidden("Admin accounts cannot be self-registered".into()));
    }

    Ok((email, role))
}

// User registration
pub async fn register(
    db: &MongoDB,
    config: &AppConfig,
    request: &RegisterRequest,
) -> AppResult<AuthResponse> {
    let (email, role) = validate_registration(request)?;
    let collection = db.collection::<User>(USERS);

    if collection.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let hashed_password = hash(&request.password, DEFAULT_COST)?;
    let now = Utc::now().timestamp();

    let new_user = User {
        id: None,
        user_id: ObjectId::new().to_hex(),
        email: email.clone(),
        password: hashed_password,
        name: request.name.trim().to_string(),
        role,
        is_active: true,
        institution: request.institution.clone(),
        bio: None,
        created_at: now,
        updated_at: now,
        last_login: Some(now),
    };

    collection.insert_one(&new_user).await.map_err(|e| {
        // unique index on email catches concurrent registrations
        if e.to_string().contains("E11000") {
            AppError::Conflict("User already exists".into())
        } else {
            AppError::from(e)
        }
    })?;

    log::info!("✅ User registered successfully: {} (role: {})", email, role);

    auth_response(config, new_user)
}

// User login
pub async fn login(
    db: &MongoDB,
    config: &AppConfig,
    request: &LoginRequest,
) -> AppResult<AuthResponse> {
    let collection = db.collection::<User>(USERS);
    let email = normalize_email(&request.email);

    let mut user = collection
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !verify(&request.password, &user.password)? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".into()));
    }

    let now = Utc::now().timestamp();
    collection
        .update_one(
            doc! { "user_id": &user.user_id },
            doc! { "$set": { "last_login": now } },
        )
        .await?;
    user.last_login = Some(now);

    auth_response(config, user)
}

// Refresh token
pub async fn refresh_token(
    db: &MongoDB,
    config: &AppConfig,
    request: &RefreshTokenRequest,
) -> AppResult<AuthResponse> {
    let claims = decode_claims(config, &request.refresh_token)?;
    if claims.token_type != REFRESH_TOKEN {
        return Err(AppError::Unauthorized("Not a refresh token".into()));
    }

    // Re-read the user: role or active flag may have changed since issue
    let user = find_user(db, &claims.sub).await?;
    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".into()));
    }

    auth_response(config, user)
}

pub async fn find_user(db: &MongoDB, user_id: &str) -> AppResult<User> {
    db.collection::<User>(USERS)
        .find_one(doc! { "user_id": user_id })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

// Get current user
pub async fn get_current_user(db: &MongoDB, user_id: &str) -> AppResult<UserInfo> {
    find_user(db, user_id).await.map(UserInfo::from)
}

pub async fn update_profile(
    db: &MongoDB,
    user_id: &str,
    request: &UpdateProfileRequest,
) -> AppResult<UserInfo> {
    let mut set = doc! { "updated_at": Utc::now().timestamp() };

    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(AppError::InvalidRequest("Name cannot be empty".into()));
        }
        set.insert("name", name.trim());
    }
    if let Some(institution) = &request.institution {
        set.insert("institution", institution.trim());
    }
    if let Some(bio) = &request.bio {
        set.insert("bio", bio.trim());
    }

    let result = db
        .collection::<User>(USERS)
        .update_one(doc! { "user_id": user_id }, doc! { "$set": set })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    // Denormalized author name on papers follows profile renames
    if let Some(name) = &request.name {
        db.collection::<mongodb::bson::Document>(PAPERS)
            .update_many(
                doc! { "author_id": user_id },
                doc! { "$set": { "author_name": name.trim() } },
            )
            .await?;
    }

    get_current_user(db, user_id).await
}

/// Deletes the account and the user's reviews. Papers and payment
/// records are kept for accounting; pending purchases are failed.
pub async fn delete_user_account(db: &MongoDB, user_id: &str) -> AppResult<()> {
    let reviews = db.collection::<Review>(REVIEWS);
    let own_reviews: Vec<Review> = reviews
        .find(doc! { "reviewer_id": user_id })
        .await?
        .try_collect()
        .await?;
    for review in &own_reviews {
        review_service::adjust_rating(db, &review.paper_id, -(review.rating as i64), -1).await?;
    }
    let deleted_reviews = reviews.delete_many(doc! { "reviewer_id": user_id }).await?;

    db.collection::<Payment>(PAYMENTS)
        .update_many(
            doc! {
                "user_id": user_id,
                "status": PaymentStatus::Pending.as_str(),
                "kind": PaymentKind::Purchase.as_str(),
            },
            doc! { "$set": { "status": PaymentStatus::Failed.as_str(), "updated_at": Utc::now().timestamp() } },
        )
        .await?;

    let result = db
        .collection::<User>(USERS)
        .delete_one(doc! { "user_id": user_id })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    log::info!(
        "🗑️ Account {} deleted ({} reviews removed)",
        user_id,
        deleted_reviews.deleted_count
    );
    Ok(())
}

/// Creates the first admin from ADMIN_EMAIL / ADMIN_PASSWORD when no admin exists
pub async fn seed_admin(db: &MongoDB, config: &AppConfig) {
    let (email, password) = match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => (normalize_email(email), password.clone()),
        _ => {
            log::info!("👤 ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin seed");
            return;
        }
    };

    let collection = db.collection::<User>(USERS);
    match collection.count_documents(doc! { "role": "admin" }).await {
        Ok(count) if count > 0 => {
            log::info!("👤 {} admin account(s) already present, skipping seed", count);
            return;
        }
        Ok(_) => {}
        Err(e) => {
            log::error!("❌ Failed to count admins: {}", e);
            return;
        }
    }

    let hashed = match hash(&password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            log::error!("❌ Failed to hash admin password: {}", e);
            return;
        }
    };

    let now = Utc::now().timestamp();
    let admin = User {
        id: None,
        user_id: ObjectId::new().to_hex(),
        email: email.clone(),
        password: hashed,
        name: "Administrator".into(),
        role: Role::Admin,
        is_active: true,
        institution: None,
        bio: None,
        created_at: now,
        updated_at: now,
        last_login: None,
    };

    // An existing non-admin account with this email is promoted instead
    let promoted = collection
        .update_one(
            doc! { "email": &email },
            doc! { "$set": { "role": "admin", "is_active": true, "updated_at": now } },
        )
        .await;

    match promoted {
        Ok(r) if r.matched_count > 0 => log::info!("   ✅ Promoted {} to admin", email),
        Ok(_) => match collection.insert_one(&admin).await {
            Ok(_) => log::info!("   ✅ Seeded admin account {}", email),
            Err(e) => log::error!("   ❌ Failed to seed admin: {}", e),
        },
        Err(e) => log::error!("   ❌ Failed to seed admin: {}", e),
    }
}

#[cfg(test)]
pub(crate) fn sample_user(role: Role) -> User {
    User {
        id: None,
        user_id: ObjectId::new().to_hex(),
        email: "ada@example.org".into(),
        password: String::new(),
        name: "Ada Lovelace".into(),
        role,
        is_active: true,
        institution: None,
        bio: None,
        created_at: 0,
        updated_at: 0,
        last_login: None,
    }
}

#[cfg(test)]
pub(crate) fn sample_claims(sub: &str, role: Role) -> Claims {
    Claims {
        sub: sub.into(),
        email: format!("{}@example.org", sub),
        name: sub.into(),
        role,
        token_type: ACCESS_TOKEN.into(),
        iat: 0,
        exp: 0,
        jti: "test-jti".into(),
        aud: "scholarshare-api".into(),
        iss: "scholarshare".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(email: &str, password: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            name: "Ada".into(),
            role: role.map(|r| r.to_string()),
            institution: None,
        }
    }

    #[test]
    fn test_token_roundtrip_carries_role() {
        let config = AppConfig::for_tests();
        let user = sample_user(Role::Researcher);
        let token = generate_jwt(&config, &user).unwrap();

        let claims = verify_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user.user_id);
        assert_eq!(claims.role, Role::Researcher);
        assert_eq!(claims.iss, "scholarshare");
    }

    #[test]
    fn test_refresh_token_rejected_for_api_access() {
        let config = AppConfig::for_tests();
        let user = sample_user(Role::User);
        let refresh = generate_refresh_token(&config, &user).unwrap();
        assert!(matches!(verify_token(&config, &refresh), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let config = AppConfig::for_tests();
        let mut other = AppConfig::for_tests();
        other.jwt_secret = "another-secret".into();

        let token = generate_jwt(&other, &sample_user(Role::User)).unwrap();
        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn test_token_with_wrong_audience_rejected() {
        let config = AppConfig::for_tests();
        let mut other = AppConfig::for_tests();
        other.jwt_audience = "someone-else".into();

        let token = generate_jwt(&other, &sample_user(Role::User)).unwrap();
        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn test_registration_validation() {
        let (email, role) =
            validate_registration(&register_request(" Ada@Example.ORG ", "correct horse", None)).unwrap();
        assert_eq!(email, "ada@example.org");
        assert_eq!(role, Role::User);

        let (_, role) =
            validate_registration(&register_request("a@b.io", "12345678", Some("researcher"))).unwrap();
        assert_eq!(role, Role::Researcher);

        assert!(matches!(
            validate_registration(&register_request("not-an-email", "12345678", None)),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_registration(&register_request("a@b.io", "short", None)),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_registration(&register_request("a@b.io", "12345678", Some("admin"))),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            validate_registration(&register_request("a@b.io", "12345678", Some("wizard"))),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    #[ignore] // requires a running MongoDB at DATABASE_URL
    async fn test_account_deletion_removes_reviews_from_ratings() {
        use crate::models::{paper::sample_paper, PaperStatus, ResearchPaper};
        use crate::services::testing;

        let db = testing::test_db().await;
        let reader = sample_user(Role::User);
        db.collection::<User>(USERS).insert_one(&reader).await.unwrap();

        let mut paper = sample_paper();
        paper.status = PaperStatus::Approved;
        paper.rating_sum = 9;
        paper.rating_count = 2;
        let paper_oid = paper.id.unwrap();
        db.collection::<ResearchPaper>(PAPERS).insert_one(&paper).await.unwrap();

        let review = Review {
            id: None,
            paper_id: paper_oid.to_hex(),
            reviewer_id: reader.user_id.clone(),
            reviewer_name: reader.name.clone(),
            rating: 4,
            comment: String::new(),
            created_at: 0,
            updated_at: 0,
        };
        db.collection::<Review>(REVIEWS).insert_one(&review).await.unwrap();

        delete_user_account(&db, &reader.user_id).await.unwrap();

        let stored = db.collection::<ResearchPaper>(PAPERS).find_one(doc! { "_id": paper_oid }).await.unwrap().unwrap();
        assert_eq!((stored.rating_sum, stored.rating_count), (5, 1));
        let left = db.collection::<Review>(REVIEWS).count_documents(doc! { "reviewer_id": &reader.user_id }).await.unwrap();
        assert_eq!(left, 0);
        assert!(matches!(find_user(&db, &reader.user_id).await, Err(AppError::NotFound(_))));

        db.collection::<ResearchPaper>(PAPERS).delete_one(doc! { "_id": paper_oid }).await.unwrap();
    }
}
