//! Leases and their embedded payment history.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use super::property::PropertyStatus;
use super::status::StatusMachine;
use crate::utils::csv::CsvRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeaseStatus {
    Draft,
    Active,
    Expired,
    Terminated,
}

impl LeaseStatus {
    /// Occupancy the leased property should have once a lease enters this state,
    /// coming from `previous`. `None` means the property is left alone.
    pub fn property_status_after(&self, previous: LeaseStatus) -> Option<PropertyStatus> {
        match (previous, self) {
            (_, LeaseStatus::Active) => Some(PropertyStatus::Occupied),
            (LeaseStatus::Active, LeaseStatus::Expired | LeaseStatus::Terminated) => {
                Some(PropertyStatus::Available)
            }
            _ => None,
        }
    }
}

impl StatusMachine for LeaseStatus {
    const ENTITY: &'static str = "lease";

    fn allowed_next(&self) -> &'static [Self] {
        use LeaseStatus::*;
        match self {
            Draft => &[Active, Terminated],
            Active => &[Expired, Terminated],
            Expired | Terminated => &[],
        }
    }
}

impl std::fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseStatus::Draft => write!(f, "draft"),
            LeaseStatus::Active => write!(f, "active"),
            LeaseStatus::Expired => write!(f, "expired"),
            LeaseStatus::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Check,
    Card,
    Cash,
    Other,
}

/// One entry of a lease's payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub amount: f64,
    pub paid_on: String,
    pub method: PaymentMethod,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lease {
    pub id: String,
    pub tenant_id: String,
    pub property_id: String,
    pub start_date: String,
    pub end_date: String,
    pub monthly_rent: f64,
    pub deposit: f64,
    pub payment_history: Json<Vec<Payment>>,
    pub status: LeaseStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Lease {
    pub fn total_paid(&self) -> f64 {
        self.payment_history.0.iter().map(|p| p.amount).sum()
    }

    /// Whole months between start and end dates, or 0 when they do not parse
    pub fn term_months(&self) -> i64 {
        match (parse_date(&self.start_date), parse_date(&self.end_date)) {
            (Some(start), Some(end)) => months_between(start, end),
            _ => 0,
        }
    }

    pub fn annual_rent(&self) -> f64 {
        self.monthly_rent * 12.0
    }
}

/// Lease joined with the display fields admins search by
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeaseDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lease: Lease,
    pub property_title: String,
    pub tenant_name: String,
    pub tenant_email: String,
}

impl CsvRecord for LeaseDetail {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "property",
            "tenant",
            "tenant_email",
            "start_date",
            "end_date",
            "monthly_rent",
            "deposit",
            "total_paid",
            "status",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.lease.id.clone(),
            self.property_title.clone(),
            self.tenant_name.clone(),
            self.tenant_email.clone(),
            self.lease.start_date.clone(),
            self.lease.end_date.clone(),
            format!("{:.2}", self.lease.monthly_rent),
            format!("{:.2}", self.lease.deposit),
            format!("{:.2}", self.lease.total_paid()),
            self.lease.status.to_string(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLeaseRequest {
    pub tenant_id: String,
    pub property_id: String,
    pub start_date: String,
    pub end_date: String,
    pub monthly_rent: f64,
    pub deposit: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateLeaseRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub monthly_rent: Option<f64>,
    pub deposit: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: f64,
    pub paid_on: String,
    pub method: PaymentMethod,
    pub note: Option<String>,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut months = (end.year() - start.year()) as i64 * 12 + end.month() as i64
        - start.month() as i64;
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use LeaseStatus::*;

    fn lease(start: &str, end: &str, payments: &[f64]) -> Lease {
        Lease {
            id: "l1".into(),
            tenant_id: "t1".into(),
            property_id: "p1".into(),
            start_date: start.into(),
            end_date: end.into(),
            monthly_rent: 4200.0,
            deposit: 8400.0,
            payment_history: Json(
                payments
                    .iter()
                    .enumerate()
                    .map(|(i, amount)| Payment {
                        id: format!("pay-{}", i),
                        amount: *amount,
                        paid_on: "2026-01-01".into(),
                        method: PaymentMethod::BankTransfer,
                        note: None,
                    })
                    .collect(),
            ),
            status: Active,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_lease_lifecycle() {
        assert!(Draft.can_transition_to(Active));
        assert!(Draft.can_transition_to(Terminated));
        assert!(!Draft.can_transition_to(Expired));
        assert!(Active.can_transition_to(Expired));
        assert!(!Active.can_transition_to(Draft));
        assert!(Expired.is_terminal());
        assert!(Terminated.transition_to(Active).is_err());
    }

    #[test]
    fn test_property_occupancy_follows_lease() {
        assert_eq!(
            Active.property_status_after(Draft),
            Some(PropertyStatus::Occupied)
        );
        assert_eq!(
            Terminated.property_status_after(Active),
            Some(PropertyStatus::Available)
        );
        assert_eq!(Terminated.property_status_after(Draft), None);
    }

    #[test]
    fn test_total_paid_and_annual_rent() {
        let l = lease("2026-01-01", "2027-01-01", &[4200.0, 4200.0, 100.5]);
        assert!((l.total_paid() - 8500.5).abs() < 1e-9);
        assert!((l.annual_rent() - 50400.0).abs() < 1e-9);
    }

    #[test]
    fn test_term_months() {
        assert_eq!(lease("2026-01-01", "2027-01-01", &[]).term_months(), 12);
        assert_eq!(lease("2026-01-15", "2026-03-14", &[]).term_months(), 1);
        assert_eq!(lease("bad", "2026-03-14", &[]).term_months(), 0);
    }

    #[test]
    fn test_payment_history_json_shape() {
        let l = lease("2026-01-01", "2027-01-01", &[10.0]);
        let json = serde_json::to_value(&l).unwrap();
        assert_eq!(json["payment_history"][0]["method"], "bank_transfer");
        assert_eq!(json["status"], "active");
    }
}
