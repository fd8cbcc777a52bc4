use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::http::AdmissionSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_admission(State(state): State<AdminState>) -> Json<AdmissionSnapshot> {
    Json(state.stack.snapshot())
}
