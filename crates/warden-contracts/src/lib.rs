//! # warden-contracts
//!
//! Shared types, configuration schema, and error contracts for the Warden
//! agent-governance core.
//!
//! Every crate in the workspace imports from here. No business logic lives in
//! this crate, only data definitions, the TOML configuration schema, and the
//! error type.

pub mod adherence;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod event;
pub mod history;
pub mod identity;
pub mod injection;
pub mod pii;
pub mod policy;
pub mod report;
pub mod risk;
pub mod severity;
pub mod violation;
