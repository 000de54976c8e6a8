//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Session Metrics
    pub static ref SESSION_LOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("signin_starter_session_loads_total", "Session loads by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref AUTH_ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("signin_starter_auth_actions_total", "Auth route requests by action"),
        &["action"]
    ).expect("metric can be created");
    pub static ref SIGNINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("signin_starter_signins_total", "Completed OAuth callbacks by result"),
        &["provider", "result"]
    ).expect("metric can be created");

    // Build Metrics
    pub static ref BUILD_RELOADS_TOTAL: IntCounter = IntCounter::new(
        "signin_starter_build_reloads_total",
        "Total number of page build reloads"
    ).expect("metric can be created");
    pub static ref BUILD_VERSION: IntGauge = IntGauge::new(
        "signin_starter_build_version",
        "Version of the active page build"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("signin_starter_errors_total", "Total number of errors"),
        &["type"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_metrics() {
    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SESSION_LOADS_TOTAL.clone()),
            Box::new(AUTH_ACTIONS_TOTAL.clone()),
            Box::new(SIGNINS_TOTAL.clone()),
            Box::new(BUILD_RELOADS_TOTAL.clone()),
            Box::new(BUILD_VERSION.clone()),
            Box::new(ERRORS_TOTAL.clone()),
        ];

        for collector in collectors {
            if let Err(error) = REGISTRY.register(collector) {
                tracing::warn!(%error, "Failed to register metric");
            }
        }

        tracing::info!("Metrics registry initialized");
    });
}
