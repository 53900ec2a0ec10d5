//! Tenant and investor organizations.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    tables, AuditAction, CreateOrganizationRequest, ListQuery, Organization, Page, User,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{entry, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_optional_text, validate_text};

/// GET /api/admin/organizations
pub async fn list_organizations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Organization>>, ApiError> {
    let mut filter = Filter::new();
    filter.search(&["name", "industry"], query.search.as_deref());
    let order = order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        &[("name", "name"), ("created_at", "created_at")],
        "name",
    );

    let page = fetch_page(
        &state.db,
        "*",
        "organizations",
        &filter,
        &order,
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// POST /api/admin/organizations
pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_text(&req.name, "Name", 2, 200))
        .check("industry", validate_optional_text(&req.industry, "Industry", 100));
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO organizations (id, name, industry, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.industry)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    record(
        &state,
        entry(tables::ORGANIZATIONS, AuditAction::Create, &id, &admin, &headers).after(&org),
    )
    .await;

    Ok((StatusCode::CREATED, Json(org)))
}

/// Members keep their accounts; their organization is cleared.
///
/// DELETE /api/admin/organizations/:id
pub async fn delete_organization(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;

    sqlx::query("DELETE FROM organizations WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        entry(tables::ORGANIZATIONS, AuditAction::Delete, &id, &admin, &headers).before(&org),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
