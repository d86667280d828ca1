//! In-process metric registry keyed the way the teacher's metric names are
//! keyed in the original C++ (`(phase, reporting_origin)` label pairs). The
//! OpenTelemetry OTLP *exporter* is out of scope (spec §1); this is the
//! in-process counter/registry contract ambient-stack §1 calls for.

pub mod router;

pub use router::MetricRouter;
