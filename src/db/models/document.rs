use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Categories offered by the document manager
pub const DOCUMENT_CATEGORIES: &[&str] = &["general", "lease", "financial", "legal", "marketing"];

/// Metadata of an uploaded file. The bytes live under the documents directory.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub category: String,
    pub property_id: Option<String>,
    pub lease_id: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    #[serde(skip_serializing)]
    pub storage_path: String,
    pub uploaded_by: Option<String>,
    pub created_at: String,
}
