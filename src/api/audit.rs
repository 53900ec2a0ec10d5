//! Audit log API endpoints and helpers.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::db::{
    export_audit_logs, list_audit_logs, log_audit, tables, AuditAction, AuditEntry, AuditLog,
    AuditLogQuery, Page, User,
};
use crate::utils::csv::to_csv;
use crate::AppState;

use super::error::ApiError;
use super::export::csv_response;

/// Client address from proxy headers (X-Forwarded-For first hop, then
/// X-Real-IP), falling back to the connection address.
pub fn client_ip(headers: &HeaderMap, conn_info: Option<&SocketAddr>) -> Option<String> {
    forwarded_ip(headers)
        .or_else(|| conn_info.map(SocketAddr::ip))
        .map(|ip| ip.to_string())
}

/// Address claimed by proxy headers. Values that do not parse as an IP are ignored.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| if first_hop { v.split(',').next() } else { Some(v) })
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for", true).or_else(|| header_ip("x-real-ip", false))
}

/// Write an audit entry. A failure is logged and never fails the request.
pub async fn record(state: &AppState, entry: AuditEntry) {
    if let Err(e) = log_audit(&state.db, &entry).await {
        tracing::warn!(
            table = entry.table_name,
            action = %entry.action,
            error = %e,
            "Failed to create audit log entry"
        );
    }
}

/// Shorthand for the common case: `user` did `action` to `table` row `record_id`
pub fn entry(
    table: &'static str,
    action: AuditAction,
    record_id: &str,
    user: &User,
    headers: &HeaderMap,
) -> AuditEntry {
    AuditEntry::new(table, action)
        .record(record_id)
        .actor(user)
        .ip(client_ip(headers, None))
}

/// List audit logs with filtering and pagination
///
/// GET /api/admin/audit-logs
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Page<AuditLog>>, ApiError> {
    let page = list_audit_logs(&state.db, &query).await?;
    Ok(Json(page))
}

/// Distinct table names for the filter dropdown
///
/// GET /api/admin/audit-logs/tables
pub async fn list_tables(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    let names: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT table_name FROM audit_logs ORDER BY table_name")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(names.into_iter().map(|(n,)| n).collect()))
}

/// Download the filtered audit trail as CSV
///
/// GET /api/admin/audit-logs/export
pub async fn export_logs(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Query(query): Query<AuditLogQuery>,
) -> Result<Response, ApiError> {
    let logs = export_audit_logs(&state.db, &query).await?;
    let body = to_csv(&logs);

    record(
        &state,
        AuditEntry::new(tables::AUDIT_LOGS, AuditAction::Export)
            .actor(&user)
            .ip(client_ip(&headers, None))
            .after(&serde_json::json!({ "rows": logs.len() })),
    )
    .await;

    Ok(csv_response("audit-logs", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, None).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip_then_connection() {
        let peer = SocketAddr::from(([192, 0, 2, 4], 51000));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 10.0.0.9 "));
        assert_eq!(client_ip(&headers, Some(&peer)).as_deref(), Some("10.0.0.9"));

        assert_eq!(client_ip(&HeaderMap::new(), Some(&peer)).as_deref(), Some("192.0.2.4"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_non_ip_header_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(forwarded_ip(&headers), "2001:db8::1".parse().ok());
    }
}
