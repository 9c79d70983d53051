//! # warden-core
//!
//! The seams and shared machinery of the Warden governance core.
//!
//! This crate provides:
//! - The component traits (`PolicyEvaluator`, `PiiScanner`, `InjectionScanner`,
//!   `RiskAssessor`, `AdherenceMonitor`, `PermissionChecker`, `EventSink`,
//!   `AuditWriter`)
//! - `EventBus`, the publish/subscribe registry for governance events
//! - `TimeSeriesLog`, the per-agent history log behind risk and adherence
//!   trends
//! - `maintenance`, the retention and ticker helpers behind the periodic sweeps
//! - `GovernancePipeline`, which runs the components in order for one request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{GovernancePipeline, GovernanceRequest, EventBus};
//! ```

pub mod events;
pub mod history;
pub mod maintenance;
pub mod pipeline;
pub mod traits;

pub use events::{CollectingSink, EventBus, NoopSink, SubscriptionId};
pub use history::{Scored, TimeSeriesLog, Timestamped};
pub use pipeline::{GovernanceDecision, GovernancePipeline, GovernanceRequest};
