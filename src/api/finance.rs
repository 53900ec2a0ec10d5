//! Income and expense ledger.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    summarize_transactions, tables, AuditAction, CreateTransactionRequest, DbPool, FinanceSummary,
    ListQuery, Page, Transaction, User,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{entry, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_date, validate_id, validate_optional_text, validate_positive_amount, validate_text,
};

pub(super) fn transaction_filter(query: &ListQuery) -> Filter {
    let mut filter = Filter::new();
    filter
        .search(&["category", "description"], query.search.as_deref())
        .eq("kind", query.kind.as_deref())
        .eq("category", query.category.as_deref())
        .eq("lease_id", query.lease_id.as_deref())
        .eq("property_id", query.property_id.as_deref())
        .gte("occurred_on", query.start_date.as_deref())
        .lte("occurred_on", query.end_date.as_deref());
    filter
}

pub(super) fn transaction_order(query: &ListQuery) -> String {
    order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        &[
            ("occurred_on", "occurred_on"),
            ("amount", "amount"),
            ("category", "category"),
            ("created_at", "created_at"),
        ],
        "occurred_on",
    )
}

async fn fetch_transaction(db: &DbPool, id: &str) -> Result<Transaction, ApiError> {
    sqlx::query_as("SELECT * FROM transactions WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction not found"))
}

/// GET /api/admin/finance/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Transaction>>, ApiError> {
    let page = fetch_page(
        &state.db,
        "*",
        "transactions",
        &transaction_filter(&query),
        &transaction_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// Totals for the same filters the ledger accepts
///
/// GET /api/admin/finance/summary
pub async fn finance_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FinanceSummary>, ApiError> {
    let summary = summarize_transactions(&state.db, &transaction_filter(&query)).await?;
    Ok(Json(summary))
}

/// POST /api/admin/finance/transactions
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("category", validate_text(&req.category, "Category", 2, 50))
        .check("amount", validate_positive_amount(req.amount, "Amount"))
        .check("occurred_on", validate_date(&req.occurred_on, "Date"))
        .check(
            "description",
            validate_optional_text(&req.description, "Description", 500),
        );
    if let Some(lease_id) = &req.lease_id {
        errors.check("lease_id", validate_id(lease_id, "lease_id"));
    }
    if let Some(property_id) = &req.property_id {
        errors.check("property_id", validate_id(property_id, "property_id"));
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO transactions (id, lease_id, property_id, kind, category, amount, occurred_on, \
         description, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&req.lease_id)
    .bind(&req.property_id)
    .bind(req.kind)
    .bind(req.category.trim().to_lowercase())
    .bind(req.amount)
    .bind(&req.occurred_on)
    .bind(&req.description)
    .bind(&admin.id)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await?;

    let transaction = fetch_transaction(&state.db, &id).await?;
    record(
        &state,
        entry(tables::TRANSACTIONS, AuditAction::Create, &id, &admin, &headers).after(&transaction),
    )
    .await;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// DELETE /api/admin/finance/transactions/:id
pub async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let before = fetch_transaction(&state.db, &id).await?;

    sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        entry(tables::TRANSACTIONS, AuditAction::Delete, &id, &admin, &headers).before(&before),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_filter_date_range() {
        let query = ListQuery {
            kind: Some("income".into()),
            start_date: Some("2026-09-01".into()),
            end_date: Some("2026-09-30".into()),
            ..Default::default()
        };
        let filter = transaction_filter(&query);
        assert_eq!(
            filter.where_clause(),
            "WHERE kind = ? AND occurred_on >= ? AND occurred_on <= ?"
        );
    }

    #[tokio::test]
    async fn test_summary_over_seeded_ledger() {
        let db = crate::db::init_memory().await.unwrap();
        let hash = crate::api::auth::hash_password("Sample2026x").unwrap();
        crate::db::seed_sample_data(&db, &hash).await.unwrap();

        let query = ListQuery {
            kind: Some("income".into()),
            ..Default::default()
        };
        let summary = summarize_transactions(&db, &transaction_filter(&query))
            .await
            .unwrap();
        assert_eq!(summary.income, 38500.0 * 3.0);
        assert_eq!(summary.expense, 0.0);
    }
}
