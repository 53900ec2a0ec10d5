//! Property listings: admin management and the public catalogue.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::query::{fetch_page, order_by, Filter};
use crate::db::{
    normalize_amenities, tables, AuditAction, CreatePropertyRequest, DbPool, LeaseStatus,
    ListQuery, Page, Property, PropertyStatus, StatusUpdate, UpdatePropertyRequest, User,
};
use crate::utils::{blank_to_none, now_rfc3339};
use crate::AppState;

use super::audit::{entry, record};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_amenities, validate_media_urls, validate_non_negative_amount,
    validate_optional_text, validate_positive_amount, validate_text,
};

const PROPERTY_SORTS: &[(&str, &str)] = &[
    ("title", "title"),
    ("city", "city"),
    ("price", "price"),
    ("size_sqft", "size_sqft"),
    ("status", "status"),
    ("created_at", "created_at"),
];

pub(super) fn property_filter(query: &ListQuery) -> Filter {
    let mut filter = Filter::new();
    filter
        .search(
            &["title", "address", "city", "property_type"],
            query.search.as_deref(),
        )
        .eq("status", query.status.as_deref())
        .eq("property_type", query.property_type.as_deref());
    filter
}

pub(super) fn property_order(query: &ListQuery) -> String {
    order_by(
        query.sort.as_deref(),
        query.order.as_deref(),
        PROPERTY_SORTS,
        "created_at",
    )
}

pub(super) async fn fetch_property(db: &DbPool, id: &str) -> Result<Property, ApiError> {
    sqlx::query_as("SELECT * FROM properties WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Property not found"))
}

pub(super) async fn has_active_lease(db: &DbPool, property_id: &str) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM leases WHERE property_id = ? AND status = ?")
            .bind(property_id)
            .bind(LeaseStatus::Active)
            .fetch_one(db)
            .await?;
    Ok(count > 0)
}

fn check_listing(
    errors: &mut ValidationErrorBuilder,
    size_sqft: Option<f64>,
    price: Option<f64>,
    amenities: Option<&[String]>,
    media: Option<&[String]>,
    description: &Option<String>,
) {
    if let Some(size) = size_sqft {
        errors.check("size_sqft", validate_positive_amount(size, "Size"));
    }
    if let Some(price) = price {
        errors.check("price", validate_non_negative_amount(price, "Price"));
    }
    if let Some(amenities) = amenities {
        errors.check("amenities", validate_amenities(amenities));
    }
    if let Some(media) = media {
        errors.check("media", validate_media_urls(media));
    }
    errors.check(
        "description",
        validate_optional_text(description, "Description", 5000),
    );
}

/// GET /api/admin/properties
pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Property>>, ApiError> {
    let page = fetch_page(
        &state.db,
        "*",
        "properties",
        &property_filter(&query),
        &property_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// Available listings for the marketing site. Status filters are ignored.
///
/// GET /api/public/properties
pub async fn list_public_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Property>>, ApiError> {
    let query = ListQuery {
        status: Some(PropertyStatus::Available.to_string()),
        ..query
    };
    let page = fetch_page(
        &state.db,
        "*",
        "properties",
        &property_filter(&query),
        &property_order(&query),
        query.pagination(),
    )
    .await?;
    Ok(Json(page))
}

/// GET /api/public/properties/:id
pub async fn get_public_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Property>, ApiError> {
    let property = fetch_property(&state.db, &id).await?;
    if property.status != PropertyStatus::Available {
        return Err(ApiError::not_found("Property not found"));
    }
    Ok(Json(property))
}

/// GET /api/admin/properties/:id
pub async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Property>, ApiError> {
    Ok(Json(fetch_property(&state.db, &id).await?))
}

/// POST /api/admin/properties
pub async fn create_property(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<(StatusCode, Json<Property>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("title", validate_text(&req.title, "Title", 2, 200))
        .check("address", validate_text(&req.address, "Address", 3, 300))
        .check("city", validate_text(&req.city, "City", 2, 100));
    check_listing(
        &mut errors,
        Some(req.size_sqft),
        Some(req.price),
        Some(req.amenities.as_slice()),
        Some(req.media.as_slice()),
        &req.description,
    );
    if req.status == Some(PropertyStatus::Occupied) {
        errors.add("status", "A new property cannot start occupied; activate a lease instead");
    }
    errors.finish()?;

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO properties (id, title, address, city, property_type, size_sqft, price, status, \
         amenities, media, description, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.title.trim())
    .bind(req.address.trim())
    .bind(req.city.trim())
    .bind(req.property_type)
    .bind(req.size_sqft)
    .bind(req.price)
    .bind(req.status.unwrap_or(PropertyStatus::Available))
    .bind(SqlJson(normalize_amenities(&req.amenities)))
    .bind(SqlJson(&req.media))
    .bind(blank_to_none(req.description.clone()))
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let property = fetch_property(&state.db, &id).await?;
    record(
        &state,
        entry(tables::PROPERTIES, AuditAction::Create, &id, &admin, &headers).after(&property),
    )
    .await;
    tracing::info!(property_id = %id, title = %property.title, "Property created");

    Ok((StatusCode::CREATED, Json(property)))
}

/// PUT /api/admin/properties/:id
pub async fn update_property(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<Json<Property>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(title) = &req.title {
        errors.check("title", validate_text(title, "Title", 2, 200));
    }
    if let Some(address) = &req.address {
        errors.check("address", validate_text(address, "Address", 3, 300));
    }
    if let Some(city) = &req.city {
        errors.check("city", validate_text(city, "City", 2, 100));
    }
    check_listing(
        &mut errors,
        req.size_sqft,
        req.price,
        req.amenities.as_deref(),
        req.media.as_deref(),
        &req.description,
    );
    errors.finish()?;

    let before = fetch_property(&state.db, &id).await?;

    let amenities = req
        .amenities
        .as_deref()
        .map(normalize_amenities)
        .unwrap_or_else(|| before.amenities.0.clone());
    let media = req.media.unwrap_or_else(|| before.media.0.clone());
    let description = match req.description {
        Some(d) => blank_to_none(Some(d)),
        None => before.description.clone(),
    };

    sqlx::query(
        "UPDATE properties SET title = ?, address = ?, city = ?, property_type = ?, size_sqft = ?, \
         price = ?, amenities = ?, media = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(req.title.as_deref().map(str::trim).unwrap_or(&before.title))
    .bind(req.address.as_deref().map(str::trim).unwrap_or(&before.address))
    .bind(req.city.as_deref().map(str::trim).unwrap_or(&before.city))
    .bind(req.property_type.unwrap_or(before.property_type))
    .bind(req.size_sqft.unwrap_or(before.size_sqft))
    .bind(req.price.unwrap_or(before.price))
    .bind(SqlJson(amenities))
    .bind(SqlJson(media))
    .bind(description)
    .bind(now_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let after = fetch_property(&state.db, &id).await?;
    record(
        &state,
        entry(tables::PROPERTIES, AuditAction::Update, &id, &admin, &headers)
            .before(&before)
            .after(&after),
    )
    .await;

    Ok(Json(after))
}

/// PUT /api/admin/properties/:id/status
pub async fn set_property_status(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate<PropertyStatus>>,
) -> Result<Json<Property>, ApiError> {
    let before = fetch_property(&state.db, &id).await?;
    if before.status == req.status {
        return Ok(Json(before));
    }

    if req.status == PropertyStatus::Available && has_active_lease(&state.db, &id).await? {
        return Err(ApiError::conflict(
            "Property has an active lease; end the lease before listing it as available",
        ));
    }

    sqlx::query("UPDATE properties SET status = ?, updated_at = ? WHERE id = ?")
        .bind(req.status)
        .bind(now_rfc3339())
        .bind(&id)
        .execute(&state.db)
        .await?;

    let after = fetch_property(&state.db, &id).await?;
    record(
        &state,
        entry(tables::PROPERTIES, AuditAction::StatusChange, &id, &admin, &headers)
            .before(&before)
            .after(&after),
    )
    .await;

    Ok(Json(after))
}

/// DELETE /api/admin/properties/:id
pub async fn delete_property(
    State(state): State<Arc<AppState>>,
    admin: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let before = fetch_property(&state.db, &id).await?;

    let (leases,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leases WHERE property_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    if leases > 0 {
        return Err(ApiError::conflict(
            "Property is referenced by leases and cannot be deleted",
        ));
    }

    sqlx::query("DELETE FROM properties WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    record(
        &state,
        entry(tables::PROPERTIES, AuditAction::Delete, &id, &admin, &headers).before(&before),
    )
    .await;
    tracing::info!(property_id = %id, "Property deleted");

    Ok(StatusCode::NO_CONTENT)
}
