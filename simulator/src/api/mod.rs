use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::Simulator;

mod http;

/// Largest accepted `/submit` body.
const MAX_BODY_BYTES: usize = 512 * 1024;

pub struct Api {
    simulator: Arc<Simulator>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(http::healthz))
            .route("/submit", post(http::submit))
            .route("/receipt/:digest", get(http::get_receipt))
            .route("/wager/:id", get(http::get_wager))
            .route("/vault/:id", get(http::get_vault))
            .route("/account/:pubkey", get(http::get_account))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.simulator.clone())
    }
}
