use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Researcher,
    User,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Researcher => "researcher",
            Role::User => "user",
        }
    }

    /// Researchers and admins may publish papers
    pub fn can_publish(&self) -> bool {
        matches!(self, Role::Admin | Role::Researcher)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "user" => Ok(Role::User),
            other => Err(format!("Invalid role: {}. Supported: admin, researcher, user", other)),
        }
    }
}

/// User account (stored in the `users` collection)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String, // PRIMARY IDENTIFIER
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub last_login: Option<i64>,
}

fn default_is_active() -> bool {
    true
}

/// Public projection of a user (never carries the password hash)
#[derive(Debug, Serialize, Deserialize, Clone, utoipa::ToSchema)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub institution: Option<String>,
    pub bio: Option<String>,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        UserInfo {
            id: user.user_id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: user.is_active,
            institution: user.institution,
            bio: user.bio,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("Researcher".parse::<Role>().unwrap(), Role::Researcher);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Researcher).unwrap(), "\"researcher\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_user_info_hides_password() {
        let user = User {
            id: None,
            user_id: "u1".into(),
            email: "ada@example.org".into(),
            password: "$2b$12$hash".into(),
            name: "Ada".into(),
            role: Role::Researcher,
            is_active: true,
            institution: None,
            bio: None,
            created_at: 1,
            updated_at: 1,
            last_login: None,
        };
        let json = serde_json::to_value(UserInfo::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["id"], "u1");
        assert_eq!(json["role"], "researcher");
    }
}
