//! Demonstration data for a fresh install.
//!
//! Only runs against a database with no properties yet, so restarting with
//! `seed.sample_data = true` never duplicates or overwrites real records.

use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

use crate::utils::now_rfc3339;

/// Insert sample organizations, accounts, properties, a lease and its ledger.
///
/// Every sample account shares `password_hash`. Returns `false` when the
/// database already held data and nothing was inserted.
pub async fn seed_sample_data(pool: &SqlitePool, password_hash: &str) -> Result<bool> {
    let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        info!("Database already has properties, skipping sample data");
        return Ok(false);
    }

    info!("Seeding sample data...");
    let now = now_rfc3339();
    let mut tx = pool.begin().await?;

    let organizations = [
        ("org-harbor", "Harbor Freight Partners", "Logistics"),
        ("org-summit", "Summit Capital Group", "Investment"),
        ("org-bluebird", "Bluebird Cafe Co.", "Hospitality"),
    ];
    for (id, name, industry) in organizations {
        sqlx::query(
            "INSERT INTO organizations (id, name, industry, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(industry)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let users = [
        ("usr-investor-1", "morgan.lee@summitcap.example", "Morgan Lee", "investor", "active", "org-summit"),
        ("usr-investor-2", "priya.shah@summitcap.example", "Priya Shah", "investor", "pending", "org-summit"),
        ("usr-tenant-1", "dana.ortiz@harborfreight.example", "Dana Ortiz", "tenant", "active", "org-harbor"),
        ("usr-tenant-2", "sam.keller@bluebird.example", "Sam Keller", "tenant", "active", "org-bluebird"),
        ("usr-tenant-3", "alex.chen@harborfreight.example", "Alex Chen", "tenant", "inactive", "org-harbor"),
    ];
    for (id, email, name, role, status, org) in users {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, status, organization_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .bind(status)
        .bind(org)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let properties = [
        (
            "prop-dock7",
            "Dock 7 Distribution Center",
            "700 Harbor Way",
            "Oakland",
            "warehouse",
            42000.0,
            38500.0,
            "occupied",
            json!(["Loading docks", "24/7 access", "Rail spur"]),
        ),
        (
            "prop-midtown",
            "Midtown Office Suites",
            "1200 Market St, Floor 9",
            "San Francisco",
            "office",
            6500.0,
            27000.0,
            "available",
            json!(["Conference rooms", "Bike storage", "Concierge"]),
        ),
        (
            "prop-corner",
            "Corner Retail Space",
            "88 Valencia St",
            "San Francisco",
            "retail",
            1800.0,
            9200.0,
            "available",
            json!(["Street frontage", "Signage rights"]),
        ),
        (
            "prop-foundry",
            "Foundry Flex Industrial",
            "45 Foundry Rd",
            "Hayward",
            "industrial",
            15000.0,
            16800.0,
            "maintenance",
            json!(["3-phase power", "Crane"]),
        ),
        (
            "prop-plaza",
            "Lakeside Mixed-Use Plaza",
            "300 Lakeshore Ave",
            "Oakland",
            "mixed_use",
            9800.0,
            21000.0,
            "available",
            json!(["Parking", "Rooftop deck"]),
        ),
    ];
    for (id, title, address, city, kind, sqft, price, status, amenities) in properties {
        sqlx::query(
            "INSERT INTO properties (id, title, address, city, property_type, size_sqft, price, status, amenities, media, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, '[]', NULL, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(address)
        .bind(city)
        .bind(kind)
        .bind(sqft)
        .bind(price)
        .bind(status)
        .bind(amenities.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    let payments = json!([
        {"id": "pay-1", "amount": 38500.0, "paid_on": "2026-08-01", "method": "bank_transfer", "note": null},
        {"id": "pay-2", "amount": 38500.0, "paid_on": "2026-09-01", "method": "bank_transfer", "note": null},
        {"id": "pay-3", "amount": 38500.0, "paid_on": "2026-10-01", "method": "bank_transfer", "note": "Paid 2 days late"}
    ]);
    sqlx::query(
        "INSERT INTO leases (id, tenant_id, property_id, start_date, end_date, monthly_rent, deposit, payment_history, status, created_at, updated_at) \
         VALUES ('lease-dock7', 'usr-tenant-1', 'prop-dock7', '2026-08-01', '2029-07-31', 38500, 77000, ?, 'active', ?, ?)",
    )
    .bind(payments.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO leases (id, tenant_id, property_id, start_date, end_date, monthly_rent, deposit, payment_history, status, created_at, updated_at) \
         VALUES ('lease-corner', 'usr-tenant-2', 'prop-corner', '2027-01-01', '2029-12-31', 9200, 18400, '[]', 'draft', ?, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let transactions = [
        ("txn-1", Some("lease-dock7"), "income", "rent", 38500.0, "2026-08-01", "August rent"),
        ("txn-2", Some("lease-dock7"), "income", "rent", 38500.0, "2026-09-01", "September rent"),
        ("txn-3", Some("lease-dock7"), "income", "rent", 38500.0, "2026-10-01", "October rent"),
        ("txn-4", None, "expense", "maintenance", 6200.0, "2026-09-14", "Roof membrane repair"),
        ("txn-5", None, "expense", "insurance", 4100.0, "2026-10-01", "Quarterly premium"),
    ];
    for (id, lease_id, kind, category, amount, day, description) in transactions {
        let property_id = if lease_id.is_some() { "prop-dock7" } else { "prop-foundry" };
        sqlx::query(
            "INSERT INTO transactions (id, lease_id, property_id, kind, category, amount, occurred_on, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(lease_id)
        .bind(property_id)
        .bind(kind)
        .bind(category)
        .bind(amount)
        .bind(day)
        .bind(description)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO tenant_applications (id, property_id, contact_name, contact_email, contact_phone, company_name, desired_start, desired_term_months, message, status, created_at, updated_at) \
         VALUES ('app-1', 'prop-midtown', 'Jordan Blake', 'jordan@northwind.example', '+1 415 555 0142', 'Northwind Analytics', '2027-02-01', 36, 'Looking for 40 desks near transit.', 'pending', ?, ?)",
    )
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Sample data seeded");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[tokio::test]
    async fn test_seed_once() {
        let db = init_memory().await.unwrap();
        assert!(seed_sample_data(&db, "hash").await.unwrap());
        assert!(!seed_sample_data(&db, "hash").await.unwrap());

        let (properties,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(properties, 5);

        let lease = sqlx::query_as::<_, crate::db::Lease>("SELECT * FROM leases WHERE id = 'lease-dock7'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(lease.payment_history.0.len(), 3);
        assert_eq!(lease.total_paid(), 115500.0);
    }
}
