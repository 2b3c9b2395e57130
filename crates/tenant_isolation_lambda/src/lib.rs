//! AWS-oriented adapters and handlers for tenant-scoped data access.
//!
//! This crate owns runtime integration details (Lambda handlers, STS session
//! brokering, DynamoDB and S3 adapters). Request contracts, configuration and
//! policy documents come from `tenant_isolation_core`.

pub mod adapters;
pub mod handlers;
pub mod runtime;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
