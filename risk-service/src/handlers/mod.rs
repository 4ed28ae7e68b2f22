//! HTTP handlers for risk-service.

pub mod approvals;
pub mod auth;
pub mod metrics;
pub mod sessions;
pub mod two_factor;
pub mod users;
