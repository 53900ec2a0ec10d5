//! Investor area: portfolio performance and open opportunities.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::db::query::fetch_page;
use crate::db::{portfolio_summary, ListQuery, Page, PortfolioSummary, Property, PropertyStatus};
use crate::AppState;

use super::error::ApiError;
use super::properties::{property_filter, property_order};

/// GET /api/investor/portfolio
pub async fn portfolio(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    Ok(Json(portfolio_summary(&state.db).await?))
}

/// Vacant space open for acquisition or leasing
///
/// GET /api/investor/opportunities
pub async fn opportunities(
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
