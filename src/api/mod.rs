mod analytics;
mod applications;
pub mod audit;
pub mod auth;
mod documents;
pub mod error;
mod export;
mod finance;
mod leases;
mod organizations;
mod portal;
mod properties;
pub mod rate_limit;
mod users;
pub mod validation;


use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::AppState;

/// Multipart framing on top of the document itself
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Sign-in and sign-up, rate limited per client
    let auth_public = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let auth_session = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    // Marketing site
    let public_routes = Router::new()
        .route("/properties", get(properties::list_public_properties))
        .route("/properties/:id", get(properties::get_public_property))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_public,
        ));

    let upload_limit = state.config.documents.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;

    let admin_routes = Router::new()
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/export", get(export::export_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/status", put(users::set_user_status))
        // Organizations
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/:id",
            axum::routing::delete(organizations::delete_organization),
        )
        // Properties
        .route(
            "/properties",
            get(properties::list_properties).post(properties::create_property),
        )
        .route("/properties/export", get(export::export_properties))
        .route(
            "/properties/:id",
            get(properties::get_property)
                .put(properties::update_property)
                .delete(properties::delete_property),
        )
        .route("/properties/:id/status", put(properties::set_property_status))
        // Applications
        .route("/applications", get(applications::list_applications))
        .route("/applications/:id", get(applications::get_application))
        .route(
            "/applications/:id/review",
            post(applications::review_application),
        )
        // Leases
        .route(
            "/leases",
            get(leases::list_leases).post(leases::create_lease),
        )
        .route("/leases/export", get(export::export_leases))
        .route(
            "/leases/:id",
            get(leases::get_lease)
                .put(leases::update_lease)
                .delete(leases::delete_lease),
        )
        .route("/leases/:id/status", put(leases::set_lease_status))
        .route("/leases/:id/payments", post(leases::record_payment))
        // Finance
        .route(
            "/finance/transactions",
            get(finance::list_transactions).post(finance::create_transaction),
        )
        .route(
            "/finance/transactions/export",
            get(export::export_transactions),
        )
        .route(
            "/finance/transactions/:id",
            axum::routing::delete(finance::delete_transaction),
        )
        .route("/finance/summary", get(finance::finance_summary))
        // Documents
        .route(
            "/documents",
            get(documents::list_documents)
                .post(documents::upload_document)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/download", get(documents::download_document))
        // Audit logs
        .route("/audit-logs", get(audit::list_logs))
        .route("/audit-logs/tables", get(audit::list_tables))
        .route("/audit-logs/export", get(audit::export_logs))
        // Analytics
        .route("/analytics/dashboard", get(analytics::dashboard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let investor_routes = Router::new()
        .route("/portfolio", get(portal::portfolio))
        .route("/opportunities", get(portal::opportunities))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_investor,
        ));

    let tenant_routes = Router::new()
        .route("/leases", get(leases::list_my_leases))
        .route("/leases/:id", get(leases::get_my_lease))
        .route("/applications", get(applications::list_my_applications))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_tenant,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_public.merge(auth_session))
        .nest("/api/public", public_routes)
        .route(
            "/api/applications",
            post(applications::submit_application).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::rate_limit_public,
            )),
        )
        .nest("/api/admin", admin_routes)
        .nest("/api/investor", investor_routes)
        .nest("/api/tenant", tenant_routes)
        .layer(cors_layer(&state.config.server))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Cross-origin access for the configured web app origins. With none
/// configured only same-origin requests are served.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health_check() -> &'static str {
    "OK"
}
