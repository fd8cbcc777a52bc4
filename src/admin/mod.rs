//! Admin API: read-only view of the admission stack, behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::http::GuardStack;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub stack: GuardStack,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(stack: GuardStack, api_key: &str) -> Router {
    let state = AdminState {
        stack,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/admission", get(get_admission))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
