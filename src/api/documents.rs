//! Document manager: multipart uploads stored on disk, metadata in the database.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    tables, AuditAction, DbPool, Document, ListQuery, Page, User, DOCUMENT_CATEGORIES,
};
use crate::utils::now_rfc3339;
use crate::AppState;

use super::audit::{entry, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_id, validate_text};

const DEFAULT_CATEGORY: &str = "general";

async fn fetch_document(db: &DbPool, id: &str) -> Result<Document, ApiError> {
    sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))
}

/// Content type for a download: the one recorded at upload, else a guess from the name
fn content_type_for(doc: &Document) -> String {
    if !doc.content_type.is_empty() && doc.content_type != "application/octet-stream" {
        return doc.content_type.clone();
    }
    mime_guess::from_path(&doc.name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Filename safe to put inside a quoted Content-Disposition value
fn disposition_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.trim().is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    category: Option<String>,
    property_id: Option<String>,
    lease_id: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    size: i64,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    tracing::debug!(error = %e, "Malformed multipart upload");
    ApiError::bad_request(format!("Invalid upload: {}", e))
}

/// Read the multipart body, streaming the `file` part to `dest`
async fn read_upload(
    mut multipart: Multipart,
    dest: &std::path::Path,
    max_bytes: u64,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);

                let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
                    tracing::error!(error = %e, path = %dest.display(), "Failed to create document file");
                    ApiError::internal("Failed to store document")
                })?;
                let mut written: u64 = 0;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    written += chunk.len() as u64;
                    if written > max_bytes {
                        return Err(ApiError::payload_too_large(format!(
                            "Document exceeds the {} byte upload limit",
                            max_bytes
                        )));
                    }
                    file.write_all(&chunk).await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to write document chunk");
                        ApiError::internal("Failed to store document")
                    })?;
                }
                file.flush().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to flush document");
                    ApiError::internal("Failed to store document")
                })?;
                form.size = written as i64;
            }
            "name" | "category" | "property_id" | "lease_id" => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match field_name.as_str() {
                    "name" => form.name = value,
                    "category" => form.category = value,
                    "property_id" => form.property_id = value,
                    _ => form.lease_id = value,
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

fn validate_upload(form: &UploadForm) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if form.file_name.is_none() && form.size == 0 {
        errors.add("file", "A file is required");
    }
    if let Some(name) = &form.name {
        errors.check("name", validate_text(name, "Name", 1, 255));
    }
    if let Some(category) = &form.category {
        if !DOCUMENT_CATEGORIES.contains(&category.as_str()) {
            errors.add(
                "category",
                format!("Category must be one of: {}", DOCUMENT_CATEGORIES.join(", ")),
            );
        }
    }
    if let Some(property_id) = &form.property_id {
        errors.check("property_id", validate_id(property_id, "property_id"));
    }
    if let Some(lease_id) = &form.lease_id {
        errors.check("lease_id", validate_id(lease_id, "lease_id"));
    }
    errors.finish()
}

/// GET /api/admin/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Document>>, ApiError> {
    let mut filter = Filter::new();
    filter
        .search(&["name", "category"], query.search.as_deref())
        .eq("category", query.category.as_deref())
        .eq("property_id", query.property_id.as_deref())
        .eq("lease_id", query.lease_id.as_deref());
    let order = order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        &[
            ("name", "name"),
            ("size_bytes", "size_bytes"),
            ("created_at", "created_at"),
        ],
        "created_at",
    );

    let page = fetch_page(&state.db, "*", "documents", &filter, &order, query.pagination()).await?;
    Ok(Json(page))
}

/// GET /api/admin/documents/:id
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(fetch_document(&state.db, &id).await?))
}

/// Multipart fields: `file` (required), `name`, `category`, `property_id`, `lease_id`
///
/// POST /api/admin/documents
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let dir = state.config.documents_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        tracing::error!(error = %e, dir = %dir.display(), "Failed to create documents directory");
        ApiError::internal("Document storage is unavailable")
    })?;

    let id = Uuid::new_v4().to_string();
    let path: PathBuf = dir.join(&id);
    let max_bytes = state.config.documents.max_upload_bytes as u64;

    let form = match read_upload(multipart, &path, max_bytes).await {
        Ok(form) => match validate_upload(&form) {
            Ok(()) => form,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        },
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
    };

    let name = form
        .name
        .clone()
        .or_else(|| form.file_name.clone())
        .unwrap_or_else(|| "document".to_string());
    let content_type = form
        .content_type
        .clone()
        .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());

    let inserted = sqlx::query(
        "INSERT INTO documents (id, name, category, property_id, lease_id, content_type, size_bytes, \
         storage_path, uploaded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&name)
    .bind(form.category.as_deref().unwrap_or(DEFAULT_CATEGORY))
    .bind(&form.property_id)
    .bind(&form.lease_id)
    .bind(&content_type)
    .bind(form.size)
    .bind(path.to_string_lossy().to_string())
    .bind(&admin.id)
    .bind(now_rfc3339())
    .execute(&state.db)
    .await;
    if let Err(e) = inserted {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e.into());
    }

    let document = fetch_document(&state.db, &id).await?;
    record(
        &state,
        entry(tables::DOCUMENTS, AuditAction::Create, &id, &admin, &headers).after(&document),
    )
    .await;
    tracing::info!(document_id = %id, size = form.size, "Document uploaded");

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/admin/documents/:id/download
pub async fn download_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let document = fetch_document(&state.db, &id).await?;

    let file = tokio::fs::File::open(&document.storage_path)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, document_id = %id, "Failed to open document file");
            ApiError::not_found("Document file not found on disk")
        })?;
    let metadata = file.metadata().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read document metadata");
        ApiError::internal("Failed to read document")
    })?;

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&document))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", disposition_name(&document.name)),
        )
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(body)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            ApiError::internal("Failed to build response")
        })
}

/// DELETE /api/admin/documents/:id
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let document = fetch_document(&state.db, &id).await?;

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if let Err(e) = tokio::fs::remove_file(&document.storage_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, document_id = %id, "Failed to remove document file");
        }
    }

    record(
        &state,
        entry(tables::DOCUMENTS, AuditAction::Delete, &id, &admin, &headers).before(&document),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
