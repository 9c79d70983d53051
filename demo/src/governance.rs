//! Wires every Warden component from one `GovernanceConfig`.

use std::sync::Arc;
use std::time::Duration;

use warden_adherence::TaskAdherenceMonitor;
use warden_audit::{ComplianceAuditor, InMemoryAuditTrail, JsonReporter};
use warden_contracts::{config::GovernanceConfig, error::WardenResult};
use warden_core::{CollectingSink, EventBus, GovernancePipeline};
use warden_identity::AgentIdentityManager;
use warden_pii::PiiDetector;
use warden_policy::PolicyEngine;
use warden_risk::RiskEvaluator;
use warden_shield::PromptShield;

/// Risk and adherence history is swept once a day.
const HISTORY_SWEEP: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Governance {
    /// Every published event, for the scenario printouts.
    pub events: Arc<CollectingSink>,
    pub engine: Arc<PolicyEngine>,
    pub risk: Arc<RiskEvaluator>,
    pub pii: Arc<PiiDetector>,
    pub shield: Arc<PromptShield>,
    pub adherence: Arc<TaskAdherenceMonitor>,
    pub identity: Arc<AgentIdentityManager>,
    pub trail: Arc<InMemoryAuditTrail>,
    pub auditor: Arc<ComplianceAuditor>,
    pub pipeline: GovernancePipeline,
}

impl Governance {
    /// Build every component and start the periodic sweeps. Must be called
    /// from within a tokio runtime; the sweeps end when `Governance` drops.
    pub fn build(config: GovernanceConfig) -> WardenResult<Self> {
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(CollectingSink::new());
        bus.subscribe_sink(events.clone());
        bus.subscribe(|event| {
            tracing::debug!(kind = event.kind(), "governance event");
        });

        let engine = Arc::new(PolicyEngine::new(config.policy, bus.clone())?);
        let risk = Arc::new(RiskEvaluator::new(config.risk)?);
        let pii = Arc::new(PiiDetector::new(config.pii, bus.clone()));
        let shield = Arc::new(PromptShield::new(config.shield, bus.clone()));
        let adherence = Arc::new(TaskAdherenceMonitor::new(config.adherence, bus.clone())?);
        let identity = Arc::new(AgentIdentityManager::new(config.identity, bus.clone())?);
        engine.set_permission_checker(identity.clone());

        identity.spawn_credential_sweeper(identity.sweep_interval());
        risk.spawn_maintenance(HISTORY_SWEEP);
        adherence.spawn_maintenance(HISTORY_SWEEP);

        let trail = Arc::new(InMemoryAuditTrail::new("demo"));
        let auditor = Arc::new(ComplianceAuditor::new(engine.clone()));
        let pipeline = GovernancePipeline::new(engine.clone(), trail.clone())
            .with_pii_scanner(pii.clone())
            .with_injection_scanner(shield.clone())
            .with_risk_assessor(risk.clone())
            .with_adherence_monitor(adherence.clone());

        Ok(Self {
            events,
            engine,
            risk,
            pii,
            shield,
            adherence,
            identity,
            trail,
            auditor,
            pipeline,
        })
    }

    pub fn reporter(&self) -> JsonReporter {
        JsonReporter::new(self.engine.clone(), self.trail.clone(), self.auditor.clone())
            .with_risk(self.risk.clone())
            .with_pii(self.pii.clone())
            .with_shield(self.shield.clone())
    }
}
