//! Dashboard and portfolio aggregates.
//!
//! The admin dashboard is assembled from independent aggregate queries that
//! run concurrently; each one is a single GROUP BY over its table.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::audit::{recent_audit_logs, AuditLog};
use super::finance::{summarize_transactions, FinanceSummary};
use super::property::{Property, PropertyStatus};
use super::user::{Role, UserStatus};
use crate::db::query::Filter;

/// Active leases ending within this many days count as "expiring soon"
pub const EXPIRING_WINDOW_DAYS: i64 = 60;

const RECENT_ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub pending: i64,
    pub admins: i64,
    pub investors: i64,
    pub tenants: i64,
}

impl UserStats {
    fn add(&mut self, role: Role, status: UserStatus, count: i64) {
        self.total += count;
        match status {
            UserStatus::Active => self.active += count,
            UserStatus::Inactive => self.inactive += count,
            UserStatus::Pending => self.pending += count,
        }
        match role {
            Role::Admin => self.admins += count,
            Role::Investor => self.investors += count,
            Role::Tenant => self.tenants += count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct PropertyStats {
    pub total: i64,
    pub available: i64,
    pub occupied: i64,
    pub maintenance: i64,
    pub total_sqft: f64,
    /// Percentage of properties currently occupied
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct LeaseStats {
    pub total: i64,
    pub draft: i64,
    pub active: i64,
    pub expired: i64,
    pub terminated: i64,
    /// Sum of monthly rent over active leases
    pub monthly_recurring_rent: f64,
    pub expiring_soon: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub users: UserStats,
    pub properties: PropertyStats,
    pub leases: LeaseStats,
    pub finance: FinanceSummary,
    pub pending_applications: i64,
    pub recent_activity: Vec<AuditLog>,
    pub generated_at: String,
}

/// Occupied share of `total`, as a percentage rounded to one decimal
pub fn occupancy_rate(occupied: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((occupied as f64 / total as f64) * 1000.0).round() / 10.0
}

pub async fn user_stats(db: &SqlitePool) -> Result<UserStats, sqlx::Error> {
    let rows: Vec<(Role, UserStatus, i64)> =
        sqlx::query_as("SELECT role, status, COUNT(*) FROM users GROUP BY role, status")
            .fetch_all(db)
            .await?;

    let mut stats = UserStats::default();
    for (role, status, count) in rows {
        stats.add(role, status, count);
    }
    Ok(stats)
}

pub async fn property_stats(db: &SqlitePool) -> Result<PropertyStats, sqlx::Error> {
    let rows: Vec<(PropertyStatus, i64, f64)> = sqlx::query_as(
        "SELECT status, COUNT(*), COALESCE(SUM(size_sqft), 0.0) FROM properties GROUP BY status",
    )
    .fetch_all(db)
    .await?;

    let mut stats = PropertyStats::default();
    for (status, count, sqft) in rows {
        stats.total += count;
        stats.total_sqft += sqft;
        match status {
            PropertyStatus::Available => stats.available += count,
            PropertyStatus::Occupied => stats.occupied += count,
            PropertyStatus::Maintenance => stats.maintenance += count,
        }
    }
    stats.occupancy_rate = occupancy_rate(stats.occupied, stats.total);
    Ok(stats)
}

/// Lease counts as of `today` (YYYY-MM-DD)
pub async fn lease_stats(db: &SqlitePool, today: &str) -> Result<LeaseStats, sqlx::Error> {
    let rows: Vec<(String, i64, f64)> = sqlx::query_as(
        "SELECT status, COUNT(*), COALESCE(SUM(monthly_rent), 0.0) FROM leases GROUP BY status",
    )
    .fetch_all(db)
    .await?;

    let mut stats = LeaseStats::default();
    for (status, count, rent) in rows {
        stats.total += count;
        match status.as_str() {
            "draft" => stats.draft += count,
            "active" => {
                stats.active += count;
                stats.monthly_recurring_rent += rent;
            }
            "expired" => stats.expired += count,
            "terminated" => stats.terminated += count,
            other => tracing::warn!(status = other, "Unknown lease status in database"),
        }
    }

    let (expiring,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM leases WHERE status = 'active' AND end_date >= ? \
         AND end_date <= date(?, '+' || ? || ' days')",
    )
    .bind(today)
    .bind(today)
    .bind(EXPIRING_WINDOW_DAYS)
    .fetch_one(db)
    .await?;
    stats.expiring_soon = expiring;

    Ok(stats)
}

pub async fn pending_application_count(db: &SqlitePool) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM tenant_applications WHERE status IN ('pending', 'under_review')",
    )
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Collect every dashboard figure. The aggregates are independent, so they are
/// awaited together and the first failure aborts the whole snapshot.
pub async fn dashboard_stats(db: &SqlitePool) -> Result<DashboardStats, sqlx::Error> {
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let all_transactions = Filter::new();

    let (users, properties, leases, finance, pending_applications, recent_activity) = tokio::try_join!(
        user_stats(db),
        property_stats(db),
        lease_stats(db, &today),
        summarize_transactions(db, &all_transactions),
        pending_application_count(db),
        recent_audit_logs(db, RECENT_ACTIVITY_LIMIT),
    )?;

    Ok(DashboardStats {
        users,
        properties,
        leases,
        finance,
        pending_applications,
        recent_activity,
        generated_at: crate::utils::now_rfc3339(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioEntry {
    pub property: Property,
    pub active_leases: i64,
    pub monthly_income: f64,
    pub annualized_income: f64,
    /// Income transactions booked against the property so far
    pub collected: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub total_properties: i64,
    pub occupancy_rate: f64,
    pub monthly_income: f64,
    pub annualized_income: f64,
    pub collected: f64,
    pub properties: Vec<PortfolioEntry>,
}

/// Per-property income view used by the investor portfolio page
pub async fn portfolio_summary(db: &SqlitePool) -> Result<PortfolioSummary, sqlx::Error> {
    let properties_query = async {
        sqlx::query_as::<_, Property>("SELECT * FROM properties ORDER BY title ASC")
            .fetch_all(db)
            .await
    };
    let leases_query = async {
        sqlx::query_as::<_, (String, i64, f64)>(
            "SELECT property_id, COUNT(*), COALESCE(SUM(monthly_rent), 0.0) FROM leases \
             WHERE status = 'active' GROUP BY property_id",
        )
        .fetch_all(db)
        .await
    };
    let collected_query = async {
        sqlx::query_as::<_, (String, f64)>(
            "SELECT property_id, COALESCE(SUM(amount), 0.0) FROM transactions \
             WHERE kind = 'income' AND property_id IS NOT NULL GROUP BY property_id",
        )
        .fetch_all(db)
        .await
    };

    let (properties, lease_rows, collected_rows) =
        tokio::try_join!(properties_query, leases_query, collected_query)?;

    let leases: HashMap<String, (i64, f64)> = lease_rows
        .into_iter()
        .map(|(id, count, rent)| (id, (count, rent)))
        .collect();
    let collected: HashMap<String, f64> = collected_rows.into_iter().collect();

    let entries: Vec<PortfolioEntry> = properties
        .into_iter()
        .map(|property| {
            let (active_leases, monthly_income) =
                leases.get(&property.id).copied().unwrap_or((0, 0.0));
            let collected = collected.get(&property.id).copied().unwrap_or(0.0);
            PortfolioEntry {
                property,
                active_leases,
                monthly_income,
                annualized_income: monthly_income * 12.0,
                collected,
            }
        })
        .collect();

    let total = entries.len() as i64;
    let occupied = entries
        .iter()
        .filter(|e| e.property.status == PropertyStatus::Occupied)
        .count() as i64;
    let monthly_income: f64 = entries.iter().map(|e| e.monthly_income).sum();

    Ok(PortfolioSummary {
        total_properties: total,
        occupancy_rate: occupancy_rate(occupied, total),
        monthly_income,
        annualized_income: monthly_income * 12.0,
        collected: entries.iter().map(|e| e.collected).sum(),
        properties: entries,
    })
}
