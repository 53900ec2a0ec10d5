//! Lease management, lifecycle transitions and rent payments.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    tables, AuditAction, CreateLeaseRequest, DbPool, Lease, LeaseDetail, LeaseStatus, ListQuery,
    Page, Payment, RecordPaymentRequest, Role, StatusMachine, StatusUpdate, TransactionKind,
    UpdateLeaseRequest, User, RENT_CATEGORY,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{entry, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_date, validate_date_range, validate_id, validate_non_negative_amount,
    validate_optional_text, validate_positive_amount,
};

pub(super) const LEASE_SELECT: &str =
    "l.*, p.title AS property_title, u.name AS tenant_name, u.email AS tenant_email";
pub(super) const LEASE_FROM: &str =
    "leases l JOIN properties p ON p.id = l.property_id JOIN users u ON u.id = l.tenant_id";

const LEASE_SORTS: &[(&str, &str)] = &[
    ("start_date", "l.start_date"),
    ("end_date", "l.end_date"),
    ("monthly_rent", "l.monthly_rent"),
    ("status", "l.status"),
    ("property", "p.title"),
    ("tenant", "u.name"),
    ("created_at", "l.created_at"),
];

pub(super) fn lease_filter(query: &ListQuery) -> Filter {
    let mut filter = Filter::new();
    filter
        .search(&["p.title", "u.name", "u.email"], query.search.as_deref())
        .eq("l.status", query.status.as_deref())
        .eq("l.property_id", query.property_id.as_deref())
        .gte("l.start_date", query.start_date.as_deref())
        .lte("l.end_date", query.end_date.as_deref());
    filter
}

pub(super) fn lease_order(query: &ListQuery) -> String {
    order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        LEASE_SORTS,
        "l.created_at",
    )
}

async fn fetch_lease(db: &DbPool, id: &str) -> Result<LeaseDetail, ApiError> {
    let sql = format!("SELECT {} FROM {} WHERE l.id = ?", LEASE_SELECT, LEASE_FROM);
    sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Lease not found"))
}

/// Reject edits to expired or terminated leases
fn ensure_editable(lease: &Lease) -> Result<(), ApiError> {
    if lease.status.is_terminal() {
        return Err(ApiError::conflict(format!(
            "Lease is {} and can no longer be changed",
            lease.status
        )));
    }
    Ok(())
}

fn validate_create(req: &CreateLeaseRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("tenant_id", validate_id(&req.tenant_id, "tenant_id"))
        .check("property_id", validate_id(&req.property_id, "property_id"))
        .check("start_date", validate_date(&req.start_date, "Start date"))
        .check("end_date", validate_date(&req.end_date, "End date"))
        .check("end_date", validate_date_range(&req.start_date, &req.end_date))
        .check("monthly_rent", validate_positive_amount(req.monthly_rent, "Monthly rent"));
    if let Some(deposit) = req.deposit {
        errors.check("deposit", validate_non_negative_amount(deposit, "Deposit"));
    }
    errors.finish()
}

/// GET /api/admin/leases
pub async fn list_leases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<LeaseDetail>>, ApiError> {
    let page = fetch_page(
        &state.db,
        LEASE_SELECT,
        LEASE_FROM,
        &lease_filter(&query),
        &lease_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/admin/leases/:id
pub async fn get_lease(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LeaseDetail>, ApiError> {
    Ok(Json(fetch_lease(&state.db, &id).await?))
}

/// Leases start as drafts; activation is a separate status change.
///
/// POST /api/admin/leases
pub async fn create_lease(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Json(req): Json<CreateLeaseRequest>,
) -> Result<(StatusCode, Json<LeaseDetail>), ApiError> {
    validate_create(&req)?;

    let tenant: Option<(Role,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
        .bind(&req.tenant_id)
        .fetch_optional(&state.db)
        .await?;
    let mut errors = ValidationErrorBuilder::new();
    match tenant {
        Some((Role::Tenant,)) => {}
        Some(_) => {
            errors.add("tenant_id", "Leases can only be issued to tenant accounts");
        }
        None => {
            errors.add("tenant_id", "Tenant not found");
        }
    }
    let (properties,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties WHERE id = ?")
        .bind(&req.property_id)
        .fetch_one(&state.db)
        .await?;
    if properties == 0 {
        errors.add("property_id", "Property not found");
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO leases (id, tenant_id, property_id, start_date, end_date, monthly_rent, deposit, \
         payment_history, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.tenant_id)
    .bind(&req.property_id)
    .bind(&req.start_date)
    .bind(&req.end_date)
    .bind(req.monthly_rent)
    .bind(req.deposit.unwrap_or(0.0))
    .bind(SqlJson(Vec::<Payment>::new()))
    .bind(LeaseStatus::Draft)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let lease = fetch_lease(&state.db, &id).await?;
    record(
        &state,
        entry(tables::LEASES, AuditAction::Create, &id, &admin, &headers).after(&lease.lease),
    )
    .await;
    tracing::info!(lease_id = %id, property_id = %req.property_id, tenant_id = %req.tenant_id, "Lease drafted");

    Ok((StatusCode::CREATED, Json(lease)))
}

/// PUT /api/admin/leases/:id
pub async fn update_lease(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateLeaseRequest>,
) -> Result<Json<LeaseDetail>, ApiError> {
    let before = fetch_lease(&state.db, &id).await?;
    ensure_editable(&before.lease)?;

    let start = req
        .start_date
        .clone()
        .unwrap_or_else(|| before.lease.start_date.clone());
    let end = req
        .end_date
        .clone()
        .unwrap_or_else(|| before.lease.end_date.clone());

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("start_date", validate_date(&start, "Start date"))
        .check("end_date", validate_date(&end, "End date"))
        .check("end_date", validate_date_range(&start, &end));
    if let Some(rent) = req.monthly_rent {
        errors.check("monthly_rent", validate_positive_amount(rent, "Monthly rent"));
    }
    if let Some(deposit) = req.deposit {
        errors.check("deposit", validate_non_negative_amount(deposit, "Deposit"));
    }
    errors.finish()?;

    sqlx::query(
        "UPDATE leases SET start_date = ?, end_date = ?, monthly_rent = ?, deposit = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&start)
    .bind(&end)
    .bind(req.monthly_rent.unwrap_or(before.lease.monthly_rent))
    .bind(req.deposit.unwrap_or(before.lease.deposit))
    .bind(now_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let after = fetch_lease(&state.db, &id).await?;
    record(
        &state,
        entry(tables::LEASES, AuditAction::Update, &id, &admin, &headers)
            .before(&before.lease)
            .after(&after.lease),
    )
    .await;

    Ok(Json(after))
}

/// Move a lease through its lifecycle. The property's occupancy follows:
/// activation occupies it, ending an active lease frees it.
///
/// PUT /api/admin/leases/:id/status
pub async fn set_lease_status(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate<LeaseStatus>>,
) -> Result<Json<LeaseDetail>, ApiError> {
    let before = fetch_lease(&state.db, &id).await?;
    let previous = before.lease.status;
    let next = previous.transition_to(req.status)?;
    let property_id = &before.lease.property_id;
    let now = now_rfc3339();

    let mut tx = state.db.begin().await?;

    if next == LeaseStatus::Active {
        let (active,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM leases WHERE property_id = ? AND status = ? AND id != ?",
        )
        .bind(property_id)
        .bind(LeaseStatus::Active)
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(ApiError::conflict(
                "Property already has an active lease",
            ));
        }
    }

    sqlx::query("UPDATE leases SET status = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(&now)
        .bind(&id)
        .execute(&mut *tx)
        .await?;

    if let Some(occupancy) = next.property_status_after(previous) {
        sqlx::query("UPDATE properties SET status = ?, updated_at = ? WHERE id = ?")
            .bind(occupancy)
            .bind(&now)
            .bind(property_id)
            .execute(&mut *tx)
            .await?;
        tracing::debug!(property_id = %property_id, status = %occupancy, "Property occupancy updated");
    }

    tx.commit().await?;

    let after = fetch_lease(&state.db, &id).await?;
    record(
        &state,
        entry(tables::LEASES, AuditAction::StatusChange, &id, &admin, &headers)
            .before(&before.lease)
            .after(&after.lease),
    )
    .await;
    tracing::info!(lease_id = %id, from = %previous, to = %next, "Lease status changed");

    Ok(Json(after))
}

/// Append a payment to the lease history and book it as rent income.
///
/// POST /api/admin/leases/:id/payments
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<LeaseDetail>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("amount", validate_positive_amount(req.amount, "Amount"))
        .check("paid_on", validate_date(&req.paid_on, "Payment date"))
        .check("note", validate_optional_text(&req.note, "Note", 500));
    errors.finish()?;

    let before = fetch_lease(&state.db, &id).await?;
    if !matches!(before.lease.status, LeaseStatus::Active | LeaseStatus::Expired) {
        return Err(ApiError::conflict(format!(
            "Cannot record payments on a {} lease",
            before.lease.status
        )));
    }

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        amount: req.amount,
        paid_on: req.paid_on.clone(),
        method: req.method,
        note: req.note.clone(),
    };
    let payment_json = serde_json::to_string(&payment).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode payment");
        ApiError::internal("Failed to record payment")
    })?;

    let now = now_rfc3339();
    let transaction_id = Uuid::new_v4().to_string();
    let mut tx = state.db.begin().await?;

    // Append in place so concurrent payments never overwrite each other
    let appended = sqlx::query(
        "UPDATE leases SET payment_history = json_insert(payment_history, '$[#]', json(?)), \
         updated_at = ? WHERE id = ? AND status IN (?, ?)",
    )
    .bind(&payment_json)
    .bind(&now)
    .bind(&id)
    .bind(LeaseStatus::Active)
    .bind(LeaseStatus::Expired)
    .execute(&mut *tx)
    .await?;
    if appended.rows_affected() == 0 {
        return Err(ApiError::conflict("Lease no longer accepts payments"));
    }

    sqlx::query(
        "INSERT INTO transactions (id, lease_id, property_id, kind, category, amount, occurred_on, \
         description, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transaction_id)
    .bind(&id)
    .bind(&before.lease.property_id)
    .bind(TransactionKind::Income)
    .bind(RENT_CATEGORY)
    .bind(payment.amount)
    .bind(&payment.paid_on)
    .bind(format!("Rent payment, {}", before.property_title))
    .bind(&admin.id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let after = fetch_lease(&state.db, &id).await?;
    record(
        &state,
        entry(tables::LEASES, AuditAction::Update, &id, &admin, &headers)
            .before(&before.lease)
            .after(&after.lease),
    )
    .await;
    record(
        &state,
        entry(
            tables::TRANSACTIONS,
            AuditAction::Create,
            &transaction_id,
            &admin,
            &headers,
        )
        .after(&payment),
    )
    .await;
    tracing::info!(lease_id = %id, amount = payment.amount, "Payment recorded");

    Ok((StatusCode::CREATED, Json(after)))
}

/// Only drafts can be deleted; signed leases are terminated instead.
///
/// DELETE /api/admin/leases/:id
pub async fn delete_lease(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let before = fetch_lease(&state.db, &id).await?;
    if before.lease.status != LeaseStatus::Draft {
        return Err(ApiError::conflict(
            "Only draft leases can be deleted; terminate the lease instead",
        ));
    }

    sqlx::query("DELETE FROM leases WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        entry(tables::LEASES, AuditAction::Delete, &id, &admin, &headers).before(&before.lease),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/tenant/leases
pub async fn list_my_leases(
    State(state): State<Arc<AppState>>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<LeaseDetail>>, ApiError> {
    let mut filter = lease_filter(&query);
    filter.raw("l.tenant_id = ?", &[user.id.as_str()]);

    let page = fetch_page(
        &state.db,
        LEASE_SELECT,
        LEASE_FROM,
        &filter,
        &lease_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// A tenant's own lease, with its payment history
///
/// GET /api/tenant/leases/:id
pub async fn get_my_lease(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<LeaseDetail>, ApiError> {
    let lease = fetch_lease(&state.db, &id).await?;
    if lease.lease.tenant_id != user.id && user.role != Role::Admin {
        return Err(ApiError::not_found("Lease not found"));
    }
    Ok(Json(lease))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateLeaseRequest {
        CreateLeaseRequest {
            tenant_id: "usr-tenant-2".into(),
            property_id: "prop-plaza".into(),
            start_date: "2027-01-01".into(),
            end_date: "2030-01-01".into(),
            monthly_rent: 12500.0,
            deposit: Some(25000.0),
        }
    }

    #[test]
    fn test_create_validation() {
        assert!(validate_create(&request()).is_ok());

        let req = CreateLeaseRequest {
            end_date: "2026-12-31".into(),
            monthly_rent: 0.0,
            ..request()
        };
        let err = validate_create(&req).unwrap_err();
        assert_eq!(err.message(), "Validation failed for 2 fields");
    }

    #[test]
    fn test_lease_filter_is_qualified() {
        let query = ListQuery {
            search: Some("dock".into()),
            status: Some("active".into()),
            ..Default::default()
        };
        let clause = lease_filter(&query).where_clause();
        assert!(clause.contains("p.title"));
        assert!(clause.contains("l.status = ?"));
        assert_eq!(lease_order(&ListQuery::default()), "ORDER BY l.created_at DESC");
    }

    #[tokio::test]
    async fn test_fetch_lease_joins_display_fields() {
        let db = crate::db::init_memory().await.unwrap();
        let hash = crate::api::auth::hash_password("Sample2026x").unwrap();
        crate::db::seed_sample_data(&db, &hash).await.unwrap();

        let detail = fetch_lease(&db, "lease-dock7").await.unwrap();
        assert_eq!(detail.tenant_name, "Dana Ortiz");
        assert_eq!(detail.lease.status, LeaseStatus::Active);
        assert_eq!(detail.lease.payment_history.0.len(), 3);
        assert!(ensure_editable(&detail.lease).is_ok());

        let missing = fetch_lease(&db, "lease-nope").await.unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
