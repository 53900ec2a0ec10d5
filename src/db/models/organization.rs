use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Company a user belongs to (a tenant business or an investment firm)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub industry: Option<String>,
}
