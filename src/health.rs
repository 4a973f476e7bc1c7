//! Health check module
//! Reports in-flight checkouts and the wallet SDK cache

use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    fn record(&mut self, name: &str, health: ComponentHealth) {
        if health.status == ComponentState::Down {
            self.status = HealthState::Degraded;
        }
        self.checks.insert(name.to_string(), health);
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Up,
            details,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            details,
        }
    }

    pub fn warning(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            details,
        }
    }
}

pub fn check_health(state: &AppState) -> HealthStatus {
    let mut health = HealthStatus::new();

    let methods = state.checkouts.available_methods();
    let orchestrator = if methods.is_empty() {
        ComponentHealth::down(Some("no payment methods registered".to_string()))
    } else {
        match state.checkouts.in_flight() {
            0 => ComponentHealth::up(Some("idle".to_string())),
            n => ComponentHealth::up(Some(format!("{} sessions in flight", n))),
        }
    };
    health.record("orchestrator", orchestrator);

    // Loaded lazily on the first wallet submission.
    let sdk = if state.sdk.is_loaded() {
        ComponentHealth::up(None)
    } else {
        ComponentHealth::warning(Some("not loaded yet".to_string()))
    };
    health.record("wallet_sdk", sdk);

    health
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(check_health(&state))
}
