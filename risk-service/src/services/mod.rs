//! Services layer for risk-service.
//!
//! Business logic for authentication, sessions, the second factor, the
//! permission gate and the approval engine, over a pluggable store.

pub mod admin;
mod approvals;
mod auth;
mod database;
pub mod error;
mod jwt;
mod memory_store;
mod permissions;
mod second_factor;
pub mod sequence;
mod sessions;
pub mod store;

pub use admin::AdminService;
pub use approvals::{ApprovalEngine, DecisionOutcome, Proposal};
pub use auth::{AuthContext, AuthService, LoginAttempt};
pub use database::Database;
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use memory_store::MemoryStore;
pub use permissions::PermissionGate;
pub use second_factor::SecondFactorService;
pub use sessions::{generate_refresh_token, hash_refresh_token, IssuedSession, SessionRegistry};
pub use store::{
    ApprovalEffect, ApprovalStore, DecisionCommit, IdentityStore, ProposedRequest,
    SecondFactorStore, SessionStore, Store,
};
