use crate::{
    database::{MongoDB, USERS},
    models::{PaperStatus, PaymentStatus, Role, User, UserInfo},
    services::{auth_service::Claims, now_ts},
    utils::error::{AppError, AppResult},
};
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use serde::Deserialize;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangeStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaperStatusFilter {
    pub status: Option<PaperStatus>,
}

#[derive(Debug, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayoutStatusFilter {
    pub status: Option<PaymentStatus>,
}

fn ensure_admin(claims: &Claims) -> AppResult<()> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required".into()))
    }
}

fn ensure_not_self(claims: &Claims, user_id: &str, action: &str) -> AppResult<()> {
    if claims.sub == user_id {
        return Err(AppError::InvalidRequest(format!("You cannot {}", action)));
    }
    Ok(())
}

pub async fn list_users(db: &MongoDB, claims: &Claims, role: Option<Role>) -> AppResult<Vec<UserInfo>> {
    ensure_admin(claims)?;
    let filter = match role {
        Some(role) => doc! { "role": role.as_str() },
        None => doc! {},
    };
    let users: Vec<User> = db
        .collection::<User>(USERS)
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;
    Ok(users.into_iter().map(UserInfo::from).collect())
}

pub async fn change_role(db: &MongoDB, claims: &Claims, user_id: &str, role: Role) -> AppResult<UserInfo> {
    ensure_admin(claims)?;
    if role != Role::Admin {
        ensure_not_self(claims, user_id, "remove your own admin role")?;
    }

    let user = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! { "user_id": user_id },
            doc! { "$set": { "role": role.as_str(), "updated_at": now_ts() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    log::info!("👤 {} changed role of {} to {}", claims.sub, user_id, role);
    Ok(UserInfo::from(user))
}

pub async fn set_active(db: &MongoDB, claims: &Claims, user_id: &str, is_active: bool) -> AppResult<UserInfo> {
    ensure_admin(claims)?;
    if !is_active {
        ensure_not_self(claims, user_id, "deactivate your own account")?;
    }

    let user = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! { "user_id": user_id },
            doc! { "$set": { "is_active": is_active, "updated_at": now_ts() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    log::info!(
        "👤 {} {} account {}",
        claims.sub,
        if is_active { "activated" } else { "deactivated" },
        user_id
    );
    Ok(UserInfo::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::sample_claims;

    #[test]
    fn test_only_admins_pass_guard() {
        assert!(ensure_admin(&sample_claims("a", Role::Admin)).is_ok());
        assert!(matches!(
            ensure_admin(&sample_claims("r", Role::Researcher)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_self_changes_refused() {
        let admin = sample_claims("admin-1", Role::Admin);
        assert!(ensure_not_self(&admin, "admin-1", "deactivate your own account").is_err());
        assert!(ensure_not_self(&admin, "user-9", "deactivate your own account").is_ok());
    }

    #[test]
    fn test_filters_parse_lowercase() {
        let filter: UserFilter = serde_json::from_str(r#"{"role":"researcher"}"#).unwrap();
        assert_eq!(filter.role, Some(Role::Researcher));
        let filter: PaperStatusFilter = serde_json::from_str(r#"{"status":"rejected"}"#).unwrap();
        assert_eq!(filter.status, Some(PaperStatus::Rejected));
        let filter: PayoutStatusFilter = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(filter.status, None);
    }
}
