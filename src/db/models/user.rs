//! User, role and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::csv::CsvRecord;

/// Platform roles. Each role owns one area of the portal; admins reach all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    /// Management screens: users, properties, leases, finance, documents, audit
    Admin,
    /// Investment opportunities and portfolio views
    Investor,
    /// Own leases and applications
    Tenant,
}

impl Role {
    /// Whether this role may enter an area that allows `allowed` roles.
    /// Admins pass every gate.
    pub fn can_access(&self, allowed: &[Role]) -> bool {
        *self == Role::Admin || allowed.contains(self)
    }

    /// Landing page of the role's area in the web app
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Investor => "/investor",
            Role::Tenant => "/tenant",
        }
    }

    /// Roles that can be chosen on the public sign-up form
    pub fn is_self_registrable(&self) -> bool {
        matches!(self, Role::Investor | Role::Tenant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Investor => write!(f, "investor"),
            Role::Tenant => write!(f, "tenant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "investor" => Ok(Role::Investor),
            "tenant" => Ok(Role::Tenant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Pending,
}

impl UserStatus {
    pub fn can_sign_in(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Inactive => write!(f, "inactive"),
            UserStatus::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "pending" => Ok(UserStatus::Pending),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub organization_id: Option<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CsvRecord for User {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "name",
            "email",
            "phone",
            "role",
            "status",
            "organization_id",
            "last_login_at",
            "created_at",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.phone.clone().unwrap_or_default(),
            self.role.to_string(),
            self.status.to_string(),
            self.organization_id.clone().unwrap_or_default(),
            self.last_login_at.clone().unwrap_or_default(),
            self.created_at.clone(),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    /// Where the web app should navigate after sign-in
    pub redirect_to: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: Option<UserStatus>,
    pub organization_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub organization_id: Option<String>,
    pub password: Option<String>,
}

/// Body of every "set status" endpoint
#[derive(Debug, Deserialize)]
pub struct StatusUpdate<S> {
    pub status: S,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_passes_every_gate() {
        assert!(Role::Admin.can_access(&[Role::Tenant]));
        assert!(Role::Admin.can_access(&[Role::Investor]));
        assert!(Role::Admin.can_access(&[]));
    }

    #[test]
    fn test_roles_confined_to_their_area() {
        assert!(Role::Tenant.can_access(&[Role::Tenant]));
        assert!(!Role::Tenant.can_access(&[Role::Investor]));
        assert!(!Role::Investor.can_access(&[Role::Admin]));
        assert!(Role::Investor.can_access(&[Role::Investor, Role::Tenant]));
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("Investor".parse::<Role>().unwrap(), Role::Investor);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::Tenant.to_string(), "tenant");
        assert_eq!(Role::Admin.home_path(), "/admin");
    }

    #[test]
    fn test_only_active_users_sign_in() {
        assert!(UserStatus::Active.can_sign_in());
        assert!(!UserStatus::Pending.can_sign_in());
        assert!(!UserStatus::Inactive.can_sign_in());
    }

    #[test]
    fn test_admin_not_self_registrable() {
        assert!(!Role::Admin.is_self_registrable());
        assert!(Role::Tenant.is_self_registrable());
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User {
            id: "u1".into(),
            email: "a@b.co".into(),
            password_hash: "secret".into(),
            name: "A".into(),
            phone: None,
            role: Role::Tenant,
            status: UserStatus::Active,
            organization_id: None,
            last_login_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "tenant");
    }
}
