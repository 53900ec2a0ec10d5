//! Leasing applications: public submission, admin review, tenant history.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    tables, ApplicationStatus, AuditAction, AuditEntry, CreateApplicationRequest, DbPool,
    ListQuery, Page, PropertyStatus, StatusMachine, StatusUpdate, TenantApplication, User,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{client_ip, entry, record};
use super::auth::{authenticate, extract_token, normalize_email};
use super::error::{ApiError, ValidationErrorBuilder};
use super::properties::fetch_property;
use super::validation::{
    validate_date, validate_email, validate_id, validate_optional_text, validate_phone,
    validate_text,
};

const MAX_TERM_MONTHS: i64 = 240;

fn application_filter(query: &ListQuery) -> Filter {
    let mut filter = Filter::new();
    filter
        .search(
            &["contact_name", "contact_email", "company_name"],
            query.search.as_deref(),
        )
        .eq("status", query.status.as_deref())
        .eq("property_id", query.property_id.as_deref());
    filter
}

fn application_order(query: &ListQuery) -> String {
    order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        &[
            ("created_at", "created_at"),
            ("company_name", "company_name"),
            ("status", "status"),
        ],
        "created_at",
    )
}

async fn fetch_application(db: &DbPool, id: &str) -> Result<TenantApplication, ApiError> {
    sqlx::query_as("SELECT * FROM tenant_applications WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Application not found"))
}

fn validate_application(req: &CreateApplicationRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("contact_name", validate_text(&req.contact_name, "Contact name", 2, 100))
        .check("contact_email", validate_email(&req.contact_email))
        .check("contact_phone", validate_phone(&req.contact_phone))
        .check("company_name", validate_text(&req.company_name, "Company name", 2, 200))
        .check("message", validate_optional_text(&req.message, "Message", 2000));
    if let Some(start) = &req.desired_start {
        errors.check("desired_start", validate_date(start, "Desired start"));
    }
    if let Some(term) = req.desired_term_months {
        if !(1..=MAX_TERM_MONTHS).contains(&term) {
            errors.add(
                "desired_term_months",
                format!("Term must be between 1 and {} months", MAX_TERM_MONTHS),
            );
        }
    }
    if let Some(property_id) = &req.property_id {
        errors.check("property_id", validate_id(property_id, "property_id"));
    }
    errors.finish()
}

/// Submit a leasing inquiry. Signed-in tenants get it linked to their account.
///
/// POST /api/applications
pub async fn submit_application(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<TenantApplication>), ApiError> {
    validate_application(&req)?;

    if let Some(property_id) = &req.property_id {
        let available = match fetch_property(&state.db, property_id).await {
            Ok(p) => p.status == PropertyStatus::Available,
            Err(e) if e.status() == StatusCode::NOT_FOUND => false,
            Err(e) => return Err(e),
        };
        if !available {
            return Err(ApiError::validation_field(
                "property_id",
                "Property is not open for applications",
            ));
        }
    }

    let applicant = match extract_token(&headers) {
        Some(token) => authenticate(&state.db, &token).await.ok(),
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO tenant_applications (id, property_id, applicant_id, contact_name, contact_email, \
         contact_phone, company_name, desired_start, desired_term_months, message, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.property_id)
    .bind(applicant.as_ref().map(|u| u.id.clone()))
    .bind(req.contact_name.trim())
    .bind(normalize_email(&req.contact_email))
    .bind(req.contact_phone.trim())
    .bind(req.company_name.trim())
    .bind(&req.desired_start)
    .bind(req.desired_term_months)
    .bind(&req.message)
    .bind(ApplicationStatus::Pending)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let application = fetch_application(&state.db, &id).await?;

    let mut audit = AuditEntry::new(tables::APPLICATIONS, AuditAction::Create)
        .record(id.clone())
        .ip(client_ip(&headers, None))
        .after(&application);
    audit = match &applicant {
        Some(user) => audit.actor(user),
        None => audit.actor_email(application.contact_email.clone()),
    };
    record(&state, audit).await;
    tracing::info!(application_id = %id, company = %application.company_name, "Application submitted");

    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /api/admin/applications
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<TenantApplication>>, ApiError> {
    let page = fetch_page(
        &state.db,
        "*",
        "tenant_applications",
        &application_filter(&query),
        &application_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/admin/applications/:id
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TenantApplication>, ApiError> {
    Ok(Json(fetch_application(&state.db, &id).await?))
}

/// Move an application along its review workflow
///
/// POST /api/admin/applications/:id/review
pub async fn review_application(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate<ApplicationStatus>>,
) -> Result<Json<TenantApplication>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("notes", validate_optional_text(&req.notes, "Notes", 2000));
    errors.finish()?;

    let before = fetch_application(&state.db, &id).await?;
    let next = before.status.transition_to(req.status)?;
    let now = now_rfc3339();

    sqlx::query(
        "UPDATE tenant_applications SET status = ?, review_notes = COALESCE(?, review_notes), \
         reviewed_by = ?, reviewed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(next)
    .bind(&req.notes)
    .bind(&admin.id)
    .bind(&now)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let after = fetch_application(&state.db, &id).await?;
    record(
        &state,
        entry(tables::APPLICATIONS, AuditAction::StatusChange, &id, &admin, &headers)
            .before(&before)
            .after(&after),
    )
    .await;
    tracing::info!(application_id = %id, from = %before.status, to = %next, "Application reviewed");

    Ok(Json(after))
}

/// The signed-in tenant's own applications, matched by account or contact email
///
/// GET /api/tenant/applications
pub async fn list_my_applications(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<TenantApplication>>, ApiError> {
    let mut filter = application_filter(&query);
    filter.raw(
        "(applicant_id = ? OR contact_email = ?)",
        &[user.id.as_str(), user.email.as_str()],
    );

    let page = fetch_page(
        &state.db,
        "*",
        "tenant_applications",
        &filter,
        &application_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}
