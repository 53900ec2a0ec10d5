//! Tenant applications submitted through the leasing inquiry form.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl StatusMachine for ApplicationStatus {
    const ENTITY: &'static str = "application";

    fn allowed_next(&self) -> &'static [Self] {
        use ApplicationStatus::*;
        match self {
            Pending => &[UnderReview, Approved, Rejected],
            UnderReview => &[Approved, Rejected],
            Approved | Rejected => &[],
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationStatus::Pending => write!(f, "pending"),
            ApplicationStatus::UnderReview => write!(f, "under_review"),
            ApplicationStatus::Approved => write!(f, "approved"),
            ApplicationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantApplication {
    pub id: String,
    pub property_id: Option<String>,
    /// Account that submitted the application, when signed in
    pub applicant_id: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub company_name: String,
    pub desired_start: Option<String>,
    pub desired_term_months: Option<i64>,
    pub message: Option<String>,
    pub status: ApplicationStatus,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub property_id: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub company_name: String,
    pub desired_start: Option<String>,
    pub desired_term_months: Option<i64>,
    pub message: Option<String>,
}
