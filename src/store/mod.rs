//! Store Context (§4.1, component A): connection lifecycle, schema,
//! operation metrics, and health probing, wired into one handle the rest
//! of the engine depends on.

pub mod connection;
pub mod health;
pub mod metrics;
pub mod migrations;

pub use connection::Storage;
pub use health::{probe, HealthProbe, HealthStatus};
pub use metrics::{Metrics, OperationStats, SlowQuery};
