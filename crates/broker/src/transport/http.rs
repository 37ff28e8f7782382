// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::HttpState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub accounts: usize,
    pub topics: usize,
}

/// `GET /api/v1/health`: liveness plus registry sizes.
pub async fn health(State(s): State<Arc<HttpState>>) -> impl IntoResponse {
    let broker = &s.broker;
    let status = if broker.shutdown.is_cancelled() { "stopping" } else { "running" };
    Json(HealthResponse {
        status: status.to_owned(),
        connections: broker.connection_count(),
        accounts: broker.accounts.len(),
        topics: broker.topics.len(),
    })
}
