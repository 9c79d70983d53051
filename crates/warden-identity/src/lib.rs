//! # warden-identity
//!
//! Agent principals and what they are allowed to do.
//!
//! `AgentIdentityManager` owns the identity lifecycle (active, suspended,
//! revoked), direct permission grants, the fixed role table in [`roles`],
//! and issued credentials. Revoking an agent removes all of its credentials
//! in the same step.

pub mod manager;
pub mod roles;

pub use manager::{AgentIdentityManager, MAX_CREDENTIAL_TTL_HOURS};
