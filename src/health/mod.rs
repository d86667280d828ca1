//! Health probes backing `GET /health/check`. See spec §4.11 and
//! `original_source/cc/pbs/health_service/src/health_service.h`.

pub mod service;

pub use service::{HealthConfig, HealthProbeError, HealthService};
