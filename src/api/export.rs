//! CSV downloads of the admin lists. Each export applies the same filters
//! as its list endpoint, without pagination.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::query::{fetch_all, Filter};
use crate::db::{
    tables, AuditAction, AuditEntry, LeaseDetail, ListQuery, Property, Transaction, User,
    MAX_EXPORT_ROWS,
};
use crate::utils::csv::{to_csv, CsvRecord};
use crate::AppState;

use super::audit::{client_ip, record};
use super::error::ApiError;
use super::{finance, leases, properties, users};

/// Wrap a rendered CSV body as a file download named `<name>-<date>.csv`
pub fn csv_response(name: &str, body: String) -> Response {
    let filename = format!("{}-{}.csv", name, chrono::Utc::now().format("%Y-%m-%d"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

#[derive(Serialize)]
struct ExportSummary<'a> {
    rows: usize,
    filters: &'a ListQuery,
}

async fn export<T>(
    state: &AppState,
    user: &User,
    headers: &HeaderMap,
    query: &ListQuery,
    name: &str,
    table: &'static str,
    rows: Vec<T>,
) -> Response
where
    T: CsvRecord,
{
    let body = to_csv(&rows);

    tracing::info!(user_id = %user.id, table, rows = rows.len(), "CSV export");
    record(
        state,
        AuditEntry::new(table, AuditAction::Export)
            .actor(user)
            .ip(client_ip(headers, None))
            .after(&ExportSummary {
                rows: rows.len(),
                filters: query,
            }),
    )
    .await;

    csv_response(name, body)
}

fn capped(order: String) -> String {
    format!("{} LIMIT {}", order, MAX_EXPORT_ROWS)
}

async fn rows<T>(
    state: &AppState,
    select: &str,
    from: &str,
    filter: &Filter,
    order: String,
) -> Result<Vec<T>, ApiError>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    Ok(fetch_all(&state.db, select, from, filter, &capped(order)).await?)
}

/// GET /api/admin/users/export
pub async fn export_users(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter = users::user_filter(&query);
    let items: Vec<User> = rows(&state, "*", "users", &filter, users::user_order(&query)).await?;
    Ok(export(&state, &user, &headers, &query, "users", tables::USERS, items).await)
}

/// GET /api/admin/properties/export
pub async fn export_properties(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter = properties::property_filter(&query);
    let items: Vec<Property> = rows(
        &state,
        "*",
        "properties",
        &filter,
        properties::property_order(&query),
    )
    .await?;
    Ok(export(&state, &user, &headers, &query, "properties", tables::PROPERTIES, items).await)
}

/// GET /api/admin/leases/export
pub async fn export_leases(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter = leases::lease_filter(&query);
    let items: Vec<LeaseDetail> = rows(
        &state,
        leases::LEASE_SELECT,
        leases::LEASE_FROM,
        &filter,
        leases::lease_order(&query),
    )
    .await?;
    Ok(export(&state, &user, &headers, &query, "leases", tables::LEASES, items).await)
}

/// GET /api/admin/finance/transactions/export
pub async fn export_transactions(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter = finance::transaction_filter(&query);
    let items: Vec<Transaction> = rows(
        &state,
        "*",
        "transactions",
        &filter,
        finance::transaction_order(&query),
    )
    .await?;
    Ok(export(
        &state,
        &user,
        &headers,
        &query,
        "transactions",
        tables::TRANSACTIONS,
        items,
    )
    .await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_response_headers() {
        let response = csv_response("users", "id\r\n".to_string());
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "text/csv; charset=utf-8"
        );
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(disposition.starts_with("attachment; filename=\"users-"));
        assert!(disposition.ends_with(".csv\""));
    }

    #[test]
    fn test_export_rows_are_capped() {
        assert_eq!(
            capped("ORDER BY created_at DESC".into()),
            format!("ORDER BY created_at DESC LIMIT {}", MAX_EXPORT_ROWS)
        );
    }
}
