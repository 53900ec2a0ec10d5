//! Sign-in, sessions and the role gate.
//!
//! Sessions are opaque random tokens; only their SHA-256 hash is stored.
//! A token is read from `Authorization: Bearer` first, then from the
//! session cookie set at login.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    tables, AuditAction, AuditEntry, DbPool, LoginRequest, LoginResponse, RegisterRequest, Role,
    Session, Severity, User, UserStatus,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{client_ip, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_optional_phone, validate_password_strength, validate_text,
};

pub const SESSION_COOKIE: &str = "portal_session";

const ALL_ROLES: &[Role] = &[Role::Admin, Role::Investor, Role::Tenant];

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Emails are compared case-insensitively; they are stored normalized
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Issue a session for `user_id`, returning the plaintext token
async fn create_session(db: &DbPool, config: &Config, user_id: &str) -> Result<String, ApiError> {
    let token = generate_token();
    let expires_at = (chrono::Utc::now()
        + chrono::Duration::hours(config.auth.session_ttl_hours.max(1)))
    .to_rfc3339();

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(&expires_at)
    .bind(now_rfc3339())
    .execute(db)
    .await?;

    Ok(token)
}

/// Resolve a session token to an active user
pub async fn authenticate(db: &DbPool, token: &str) -> Result<User, ApiError> {
    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(hash_token(token))
            .bind(now_rfc3339())
            .fetch_optional(db)
            .await?;
    let session = session.ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))?;

    if !user.status.can_sign_in() {
        return Err(ApiError::unauthorized("Account is not active"));
    }

    Ok(user)
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.email.trim().is_empty() {
        errors.add("email", "Email is required");
    }
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let email = normalize_email(&request.email);
    let ip = client_ip(&headers, connect_info.as_ref().map(|ConnectInfo(addr)| addr));

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    let user = match user {
        Some(u) if verify_password(&request.password, &u.password_hash) => u,
        other => {
            tracing::warn!(email = %email, "Failed login attempt");
            let mut failed = AuditEntry::new(tables::SESSIONS, AuditAction::Login)
                .actor_email(email.clone())
                .ip(ip)
                .severity(Severity::Warning);
            if let Some(u) = other {
                failed = failed.record(u.id);
            }
            record(&state, failed).await;
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    match user.status {
        UserStatus::Active => {}
        UserStatus::Pending => return Err(ApiError::forbidden("Account is awaiting approval")),
        UserStatus::Inactive => return Err(ApiError::forbidden("Account is inactive")),
    }

    let token = create_session(&state.db, &state.config, &user.id).await?;

    let now = now_rfc3339();
    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        AuditEntry::new(tables::SESSIONS, AuditAction::Login)
            .record(user.id.clone())
            .actor(&user)
            .ip(ip),
    )
    .await;

    tracing::info!(user_id = %user.id, role = %user.role, "User signed in");

    let jar = jar.add(session_cookie(token.clone(), state.config.auth.secure_cookies));
    let redirect_to = user.role.home_path().to_string();
    let user = User {
        last_login_at: Some(now),
        ..user
    };

    Ok((
        jar,
        Json(LoginResponse {
            token,
            user,
            redirect_to,
        }),
    ))
}

/// End the current session
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    if let Some(token) = extract_token(&headers) {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(&token))
            .execute(&state.db)
            .await?;
    }

    record(
        &state,
        AuditEntry::new(tables::SESSIONS, AuditAction::Logout)
            .record(user.id.clone())
            .actor(&user)
            .ip(client_ip(&headers, None)),
    )
    .await;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Current account
///
/// GET /api/auth/me
pub async fn me(user: User) -> Json<User> {
    Json(user)
}

/// Self-service sign-up for tenants and investors. Accounts start pending
/// until an admin activates them.
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&request.email))
        .check("password", validate_password_strength(&request.password))
        .check("name", validate_text(&request.name, "Name", 2, 100))
        .check("phone", validate_optional_phone(&request.phone));
    if !request.role.is_self_registrable() {
        errors.add("role", "Only tenant and investor accounts can be registered");
    }
    errors.finish()?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_rfc3339();
    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to create account")
    })?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, phone, role, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(normalize_email(&request.email))
    .bind(&password_hash)
    .bind(request.name.trim())
    .bind(&request.phone)
    .bind(request.role)
    .bind(UserStatus::Pending)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await
    .map_err(|e| match ApiError::from(e) {
        err if err.status() == StatusCode::CONFLICT => {
            ApiError::conflict("An account with this email already exists")
        }
        err => err,
    })?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    record(
        &state,
        AuditEntry::new(tables::USERS, AuditAction::Create)
            .record(id.clone())
            .actor_email(user.email.clone())
            .ip(client_ip(&headers, None))
            .after(&user),
    )
    .await;

    tracing::info!(user_id = %id, role = %user.role, "Account registered, awaiting approval");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Create the bootstrap admin when no admin account exists yet.
///
/// Without a configured password a random one is generated and logged once.
pub async fn ensure_admin_user(db: &DbPool, config: &Config) -> anyhow::Result<()> {
    let (admins,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(Role::Admin)
        .fetch_one(db)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    let (password, generated) = match &config.auth.admin_password {
        Some(p) if !p.is_empty() => (p.clone(), false),
        _ => (generate_token()[..20].to_string(), true),
    };
    let hash = hash_password(&password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let email = normalize_email(&config.auth.admin_email);
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, role, status, created_at, updated_at) \
         VALUES (?, ?, ?, 'Administrator', ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&email)
    .bind(&hash)
    .bind(Role::Admin)
    .bind(UserStatus::Active)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    if generated {
        tracing::warn!(
            email = %email,
            password = %password,
            "Created admin account with a generated password; change it after signing in"
        );
    } else {
        tracing::info!(email = %email, "Created admin account");
    }
    Ok(())
}

/// Shared body of the role gates: authenticate, check the role, and stash the
/// user in request extensions for the handler.
async fn gate(
    state: &AppState,
    mut request: Request,
    next: Next,
    allowed: &[Role],
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let user = authenticate(&state.db, &token).await?;

    if !user.role.can_access(allowed) {
        tracing::warn!(
            user_id = %user.id,
            role = %user.role,
            path = %request.uri().path(),
            "Role not permitted for this area"
        );
        return Err(ApiError::forbidden("You do not have access to this area"));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Any signed-in, active account
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, ALL_ROLES).await
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, &[Role::Admin]).await
}

pub async fn require_investor(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, &[Role::Investor]).await
}

pub async fn require_tenant(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, request, next, &[Role::Tenant]).await
}

/// The signed-in user. Reuses the user resolved by a role gate when present.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        authenticate(&state.db, &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("Harbor2026x").unwrap();
        assert!(verify_password("Harbor2026x", &hash));
        assert!(!verify_password("harbor2026x", &hash));
        assert!(!verify_password("Harbor2026x", "not-a-hash"));
    }

    #[test]
    fn test_tokens_are_random_and_hashed() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[test]
    fn test_extract_token_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("portal_session=from-cookie"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_token_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Dana@Example.COM "), "dana@example.com");
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let db = crate::db::init_memory().await.unwrap();
        let mut config = Config::default();
        config.auth.admin_password = Some("Bootstrap2026x".into());

        ensure_admin_user(&db, &config).await.unwrap();
        ensure_admin_user(&db, &config).await.unwrap();

        let admins: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE role = 'admin'")
            .fetch_all(&db)
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].status, UserStatus::Active);
        assert!(verify_password("Bootstrap2026x", &admins[0].password_hash));
    }

    #[tokio::test]
    async fn test_expired_session_rejected() {
        let db = crate::db::init_memory().await.unwrap();
        let config = Config::default();
        ensure_admin_user(&db, &config).await.unwrap();
        let (admin_id,): (String,) = sqlx::query_as("SELECT id FROM users LIMIT 1")
            .fetch_one(&db)
            .await
            .unwrap();

        let token = create_session(&db, &config, &admin_id).await.unwrap();
        assert_eq!(authenticate(&db, &token).await.unwrap().id, admin_id);

        sqlx::query("UPDATE sessions SET expires_at = '2000-01-01T00:00:00+00:00'")
            .execute(&db)
            .await
            .unwrap();
        let err = authenticate(&db, &token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
