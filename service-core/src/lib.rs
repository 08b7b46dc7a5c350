//! service-core: shared infrastructure for jobgate platform services.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
