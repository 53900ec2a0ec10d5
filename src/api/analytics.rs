//! Admin dashboard figures.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::db::{dashboard_stats, DashboardStats};
use crate::AppState;

use super::error::ApiError;

/// GET /api/admin/analytics/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = dashboard_stats(&state.db).await?;
    Ok(Json(stats))
}
