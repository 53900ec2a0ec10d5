//! Audit trail of create/update/delete actions taken against table rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, SqlitePool};

use super::user::User;
use crate::db::query::{self, Filter, Page, Pagination};
use crate::utils::csv::CsvRecord;

/// Upper bound on rows a single CSV export returns
pub const MAX_EXPORT_ROWS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    Login,
    Logout,
    Export,
}

impl AuditAction {
    pub fn default_severity(&self) -> Severity {
        match self {
            AuditAction::Delete => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::StatusChange => "status_change",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::Export => "export",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Table names recorded in the audit trail
pub mod tables {
    pub const USERS: &str = "users";
    pub const ORGANIZATIONS: &str = "organizations";
    pub const PROPERTIES: &str = "properties";
    pub const APPLICATIONS: &str = "tenant_applications";
    pub const LEASES: &str = "leases";
    pub const TRANSACTIONS: &str = "transactions";
    pub const DOCUMENTS: &str = "documents";
    pub const SESSIONS: &str = "sessions";
    pub const AUDIT_LOGS: &str = "audit_logs";
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub table_name: String,
    pub record_id: Option<String>,
    pub action: AuditAction,
    pub before_data: Option<Json<Value>>,
    pub after_data: Option<Json<Value>>,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub ip_address: Option<String>,
    pub severity: Severity,
    pub created_at: String,
}

impl CsvRecord for AuditLog {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "created_at",
            "table_name",
            "record_id",
            "action",
            "severity",
            "actor_email",
            "ip_address",
            "before",
            "after",
        ]
    }

    fn fields(&self) -> Vec<String> {
        let json = |v: &Option<Json<Value>>| v.as_ref().map(|j| j.0.to_string()).unwrap_or_default();
        vec![
            self.id.clone(),
            self.created_at.clone(),
            self.table_name.clone(),
            self.record_id.clone().unwrap_or_default(),
            self.action.to_string(),
            self.severity.to_string(),
            self.actor_email.clone().unwrap_or_default(),
            self.ip_address.clone().unwrap_or_default(),
            json(&self.before_data),
            json(&self.after_data),
        ]
    }
}

/// A pending audit record. Built by handlers after a successful write.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub table_name: &'static str,
    pub record_id: Option<String>,
    pub action: AuditAction,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub ip_address: Option<String>,
    pub severity: Severity,
}

impl AuditEntry {
    pub fn new(table_name: &'static str, action: AuditAction) -> Self {
        Self {
            table_name,
            record_id: None,
            action,
            before: None,
            after: None,
            actor_id: None,
            actor_email: None,
            ip_address: None,
            severity: action.default_severity(),
        }
    }

    pub fn record(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Snapshot of the row before the change
    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    /// Snapshot of the row after the change
    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    pub fn actor(mut self, user: &User) -> Self {
        self.actor_id = Some(user.id.clone());
        self.actor_email = Some(user.email.clone());
        self
    }

    pub fn actor_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Query parameters for filtering audit logs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub severity: Option<String>,
    /// Start of the date range (ISO 8601)
    pub start_date: Option<String>,
    /// End of the date range (ISO 8601)
    pub end_date: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 25, max 100)
    pub per_page: Option<i64>,
}

impl AuditLogQuery {
    fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter
            .eq("table_name", self.table_name.as_deref())
            .eq("record_id", self.record_id.as_deref())
            .eq("action", self.action.as_deref())
            .eq("actor_id", self.actor_id.as_deref())
            .eq("severity", self.severity.as_deref())
            .gte("created_at", self.start_date.as_deref())
            .lte("created_at", self.end_date.as_deref());
        filter
    }
}

/// Persist an audit entry
pub async fn log_audit(db: &SqlitePool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = crate::utils::now_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, table_name, record_id, action, before_data, after_data,
                                actor_id, actor_email, ip_address, severity, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(entry.table_name)
    .bind(&entry.record_id)
    .bind(entry.action)
    .bind(entry.before.clone().map(Json))
    .bind(entry.after.clone().map(Json))
    .bind(&entry.actor_id)
    .bind(&entry.actor_email)
    .bind(&entry.ip_address)
    .bind(entry.severity)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::debug!(
        table = entry.table_name,
        action = %entry.action,
        record_id = entry.record_id.as_deref(),
        actor_id = entry.actor_id.as_deref(),
        "Audit log recorded"
    );

    Ok(())
}

/// List audit logs with filtering and pagination, newest first
pub async fn list_audit_logs(
    db: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<Page<AuditLog>, sqlx::Error> {
    query::fetch_page(
        db,
        "*",
        "audit_logs",
        &query.filter(),
        "ORDER BY created_at DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await
}

/// Every audit log matching the filter (capped at [`MAX_EXPORT_ROWS`]), newest first
pub async fn export_audit_logs(
    db: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<Vec<AuditLog>, sqlx::Error> {
    let order = format!("ORDER BY created_at DESC LIMIT {}", MAX_EXPORT_ROWS);
    query::fetch_all(db, "*", "audit_logs", &query.filter(), &order).await
}

/// Most recent entries, for the dashboard activity feed
pub async fn recent_audit_logs(db: &SqlitePool, limit: i64) -> Result<Vec<AuditLog>, sqlx::Error> {
    sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn test_delete_defaults_to_warning() {
        let entry = AuditEntry::new(tables::PROPERTIES, AuditAction::Delete);
        assert_eq!(entry.severity, Severity::Warning);
        let entry = AuditEntry::new(tables::PROPERTIES, AuditAction::Create);
        assert_eq!(entry.severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_log_and_filter() {
        let db = init_memory().await.unwrap();

        log_audit(
            &db,
            &AuditEntry::new(tables::PROPERTIES, AuditAction::Create)
                .record("p1")
                .after(&serde_json::json!({"title": "Dock 7"})),
        )
        .await
        .unwrap();
        log_audit(
            &db,
            &AuditEntry::new(tables::LEASES, AuditAction::Delete)
                .record("l1")
                .before(&serde_json::json!({"status": "draft"})),
        )
        .await
        .unwrap();

        let all = list_audit_logs(&db, &AuditLogQuery::default()).await.unwrap();
        assert_eq!(all.total, 2);

        let leases = list_audit_logs(
            &db,
            &AuditLogQuery {
                table_name: Some("leases".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(leases.total, 1);
        let entry = &leases.items[0];
        assert_eq!(entry.action, AuditAction::Delete);
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(
            entry.before_data.as_ref().unwrap().0["status"],
            serde_json::json!("draft")
        );
        assert!(entry.after_data.is_none());

        let warnings = export_audit_logs(
            &db,
            &AuditLogQuery {
                severity: Some("warning".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_csv_fields_render_json_snapshots() {
        let log = AuditLog {
            id: "a1".into(),
            table_name: "users".into(),
            record_id: Some("u1".into()),
            action: AuditAction::StatusChange,
            before_data: Some(Json(serde_json::json!({"status": "pending"}))),
            after_data: None,
            actor_id: None,
            actor_email: Some("ops@example.com".into()),
            ip_address: None,
            severity: Severity::Info,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        };
        let fields = log.fields();
        assert_eq!(fields.len(), AuditLog::headers().len());
        assert_eq!(fields[4], "status_change");
        assert_eq!(fields[8], r#"{"status":"pending"}"#);
        assert_eq!(fields[9], "");
    }
}
