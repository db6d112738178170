//! Workflow engine for civil-registration applications.
//!
//! The [`workflows::registration`] module owns the whole lifecycle: application
//! intake and its status state machine, appointment scheduling against a
//! capacity-bounded slot calendar, biometric capture tracking, and the
//! credential issuance pipeline. Everything else here is service plumbing:
//! configuration, telemetry bootstrap, and the error surface exposed to the
//! HTTP layer.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
