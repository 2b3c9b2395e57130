//! Shared tenant isolation domain primitives.
//!
//! This crate owns the request/response contract, handler catalogue, session
//! request construction, tenant-scoped storage keys, IAM policy documents and
//! the declarative stack model. It intentionally excludes AWS SDK and Lambda
//! runtime concerns; those live in `tenant_isolation_lambda`.

pub mod config;
pub mod contract;
pub mod error;
pub mod policy;
pub mod seed;
pub mod session;
pub mod stack;
pub mod storage_keys;
