//! Admin user management.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    tables, AuditAction, CreateUserRequest, DbPool, ListQuery, Page, Role, StatusUpdate,
    UpdateUserRequest, User, UserStatus,
};
use crate::utils::{blank_to_none, now_rfc3339};
use crate::AppState;

use super::audit::{entry, record};
use super::auth::{hash_password, normalize_email};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_email, validate_id, validate_optional_phone, validate_password_strength,
    validate_text,
};

const USER_SORTS: &[(&str, &str)] = &[
    ("name", "name"),
    ("email", "email"),
    ("role", "role"),
    ("status", "status"),
    ("last_login_at", "last_login_at"),
    ("created_at", "created_at"),
];

pub(super) fn user_filter(query: &ListQuery) -> Filter {
    let mut filter = Filter::new();
    filter
        .search(&["name", "email", "phone"], query.search.as_deref())
        .eq("role", query.role.as_deref())
        .eq("status", query.status.as_deref());
    filter
}

pub(super) fn user_order(query: &ListQuery) -> String {
    order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        USER_SORTS,
        "created_at",
    )
}

pub(super) async fn fetch_user(db: &DbPool, id: &str) -> Result<User, ApiError> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

fn hash(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::internal("Failed to hash password")
    })
}

/// Leases naming the user as tenant, in any status
async fn lease_count(db: &DbPool, user_id: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leases WHERE tenant_id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let page = fetch_page(
        &state.db,
        "*",
        "users",
        &user_filter(&query),
        &user_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(fetch_user(&state.db, &id).await?))
}

/// POST /api/admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&req.email))
        .check("password", validate_password_strength(&req.password))
        .check("name", validate_text(&req.name, "Name", 2, 100))
        .check("phone", validate_optional_phone(&req.phone));
    if let Some(org) = req.organization_id.as_deref().filter(|o| !o.is_empty()) {
        errors.check("organization_id", validate_id(org, "organization_id"));
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    let status = req.status.unwrap_or(UserStatus::Active);

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, phone, role, status, organization_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(normalize_email(&req.email))
    .bind(hash(&req.password)?)
    .bind(req.name.trim())
    .bind(blank_to_none(req.phone))
    .bind(req.role)
    .bind(status)
    .bind(blank_to_none(req.organization_id))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let user = fetch_user(&state.db, &id).await?;

    record(
        &state,
        entry(tables::USERS, AuditAction::Create, &id, &admin, &headers).after(&user),
    )
    .await;
    tracing::info!(user_id = %id, role = %user.role, created_by = %admin.id, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /api/admin/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(email) = &req.email {
        errors.check("email", validate_email(email));
    }
    if let Some(name) = &req.name {
        errors.check("name", validate_text(name, "Name", 2, 100));
    }
    if let Some(password) = &req.password {
        errors.check("password", validate_password_strength(password));
    }
    errors.check("phone", validate_optional_phone(&req.phone));
    if admin.id == id && req.role.is_some_and(|r| r != admin.role) {
        errors.add("role", "You cannot change your own role");
    }
    errors.finish()?;

    let before = fetch_user(&state.db, &id).await?;

    let email = req
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_else(|| before.email.clone());
    let name = req
        .name
        .as_deref()
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| before.name.clone());
    let phone = match req.phone {
        Some(p) => blank_to_none(Some(p)),
        None => before.phone.clone(),
    };
    let organization_id = match req.organization_id {
        Some(o) => blank_to_none(Some(o)),
        None => before.organization_id.clone(),
    };
    let role = req.role.unwrap_or(before.role);
    if before.role == Role::Tenant
        && role != Role::Tenant
        && lease_count(&state.db, &id).await? > 0
    {
        return Err(ApiError::conflict(
            "User is a tenant on existing leases; their role cannot change",
        ));
    }
    let password_hash = match req.password.as_deref() {
        Some(p) => hash(p)?,
        None => before.password_hash.clone(),
    };

    sqlx::query(
        "UPDATE users SET email = ?, name = ?, phone = ?, role = ?, organization_id = ?, \
         password_hash = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&email)
    .bind(&name)
    .bind(&phone)
    .bind(role)
    .bind(&organization_id)
    .bind(&password_hash)
    .bind(now_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    // A password reset signs the user out everywhere
    if req.password.is_some() {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(&id)
            .execute(&state.db)
            .await?;
    }

    let after = fetch_user(&state.db, &id).await?;
    record(
        &state,
        entry(tables::USERS, AuditAction::Update, &id, &admin, &headers)
            .before(&before)
            .after(&after),
    )
    .await;

    Ok(Json(after))
}

/// Activate, deactivate or park an account. Setting the current status is a no-op.
///
/// PUT /api/admin/users/:id/status
pub async fn set_user_status(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate<UserStatus>>,
) -> Result<Json<User>, ApiError> {
    if admin.id == id && req.status != UserStatus::Active {
        return Err(ApiError::conflict("You cannot deactivate your own account"));
    }

    let before = fetch_user(&state.db, &id).await?;
    if before.status == req.status {
        return Ok(Json(before));
    }

    sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(req.status)
        .bind(now_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    if !req.status.can_sign_in() {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(&id)
            .execute(&state.db)
            .await?;
    }

    let after = fetch_user(&state.db, &id).await?;
    record(
        &state,
        entry(tables::USERS, AuditAction::StatusChange, &id, &admin, &headers)
            .before(&before)
            .after(&after),
    )
    .await;
    tracing::info!(user_id = %id, from = %before.status, to = %after.status, "User status changed");

    Ok(Json(after))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        return Err(ApiError::conflict("You cannot delete your own account"));
    }

    let before = fetch_user(&state.db, &id).await?;

    if lease_count(&state.db, &id).await? > 0 {
        return Err(ApiError::conflict(
            "User is a tenant on existing leases; deactivate the account instead",
        ));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        entry(tables::USERS, AuditAction::Delete, &id, &admin, &headers).before(&before),
    )
    .await;
    tracing::info!(user_id = %id, deleted_by = %admin.id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_filter_combines_search_and_role() {
        let query = ListQuery {
            search: Some("Dana".into()),
            role: Some("tenant".into()),
            ..Default::default()
        };
        let filter = user_filter(&query);
        let clause = filter.where_clause();
        assert!(clause.contains("LOWER(COALESCE(email, ''))"));
        assert!(clause.contains("role = ?"));
        assert_eq!(filter.bindings().len(), 4);
        assert_eq!(filter.bindings()[0], "%dana%");
    }

    #[test]
    fn test_user_order_allow_list() {
        let query = ListQuery {
            sort: Some("name".into()),
            order: Some("asc".into()),
            ..Default::default()
        };
        assert_eq!(user_order(&query), "ORDER BY name ASC");

        let query = ListQuery {
            sort: Some("password_hash".into()),
            ..Default::default()
        };
        assert_eq!(user_order(&query), "ORDER BY created_at DESC");
    }
}
