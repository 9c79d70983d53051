//! Condition evaluation.
//!
//! A condition is evaluated in two steps: extract the named field from the
//! context as a JSON value, then apply the operator to the extracted value and
//! the condition's expected value. Both steps dispatch on closed enums.
//!
//! Operator semantics:
//!
//! | Operator | scalar field | list field |
//! |---|---|---|
//! | `equals` | equal (numbers compared as `f64`) | equal as whole lists |
//! | `contains` | substring | some element equals `value` |
//! | `greater_than`, `less_than` | numeric, or severity ordering | error |
//! | `matches` | regex match | some element matches |
//! | `in` | member of `value` | every element is a member |
//! | `not_in` | not a member of `value` | no element is a member |

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;
use serde_json::{json, Value};

use warden_contracts::{
    context::PolicyContext,
    error::{WardenError, WardenResult},
    policy::{ConditionField, Operator, Policy, PolicyCondition},
    severity::Severity,
};
use warden_core::traits::PermissionChecker;

/// A caller-supplied field extractor for `custom` conditions.
pub type CustomExtractor = Box<dyn Fn(&PolicyContext) -> WardenResult<Value> + Send + Sync>;

/// Evaluates policy conditions against contexts.
///
/// Shared by every in-flight evaluation behind an `Arc`; all interior state
/// is lock-protected.
#[derive(Default)]
pub struct ConditionEvaluator {
    extractors: RwLock<HashMap<String, Arc<CustomExtractor>>>,
    regexes: RwLock<HashMap<String, Regex>>,
    permissions: RwLock<Option<Arc<dyn PermissionChecker>>>,
}

impl ConditionEvaluator {
    /// An evaluator with no custom extractors or permission checker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor for `custom { name }` conditions, replacing any
    /// extractor previously registered under `name`.
    pub fn register_extractor(&self, name: impl Into<String>, extractor: CustomExtractor) {
        self.extractors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(extractor));
    }

    /// Checker consulted by `permission` conditions.
    pub fn set_permission_checker(&self, checker: Arc<dyn PermissionChecker>) {
        *self
            .permissions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(checker);
    }

    /// Check that every condition of `policy` is well-formed: list operators
    /// carry list values and `matches` patterns compile.
    pub fn validate(&self, policy: &Policy) -> WardenResult<()> {
        for condition in &policy.conditions {
            match condition.operator {
                Operator::In | Operator::NotIn if !condition.value.is_array() => {
                    return Err(WardenError::ConfigError {
                        reason: format!(
                            "policy '{}': condition '{}' needs a list value",
                            policy.id, condition
                        ),
                    });
                }
                Operator::Matches => {
                    let pattern = condition.value.as_str().ok_or_else(|| {
                        WardenError::ConfigError {
                            reason: format!(
                                "policy '{}': condition '{}' needs a string pattern",
                                policy.id, condition
                            ),
                        }
                    })?;
                    self.regex(pattern).map_err(|e| WardenError::ConfigError {
                        reason: format!("policy '{}': {}", policy.id, e),
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Evaluate `policy` with AND semantics.
    ///
    /// Returns `Ok(None)` when every condition holds, `Ok(Some(message))`
    /// describing the first condition that does not, and `Err` when a field
    /// cannot be extracted or compared.
    pub fn evaluate(&self, policy: &Policy, ctx: &PolicyContext) -> WardenResult<Option<String>> {
        for condition in &policy.conditions {
            let actual = self
                .extract(&condition.field, ctx)
                .map_err(|reason| WardenError::EvaluationFailed {
                    policy_id: policy.id.clone(),
                    reason,
                })?;
            let holds = self
                .apply(condition, &actual)
                .map_err(|reason| WardenError::EvaluationFailed {
                    policy_id: policy.id.clone(),
                    reason,
                })?;
            if !holds {
                return Ok(Some(format!(
                    "condition '{}' failed: actual value {}",
                    condition, actual
                )));
            }
        }
        Ok(None)
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    fn extract(&self, field: &ConditionField, ctx: &PolicyContext) -> Result<Value, String> {
        let attached = &ctx.attachments;
        let value = match field {
            ConditionField::DataAccess => {
                serde_json::to_value(&ctx.data_access).map_err(|e| e.to_string())?
            }
            ConditionField::DataClassifications => strings(
                ctx.data_access
                    .iter()
                    .map(|a| a.classification.as_str().to_string()),
            ),
            ConditionField::DataAccessTypes => strings(
                ctx.data_access
                    .iter()
                    .map(|a| a.access_type.as_str().to_string()),
            ),
            ConditionField::DataAccessOperations => {
                strings(ctx.data_access.iter().map(|a| a.operation()))
            }
            ConditionField::ApiCall => strings(ctx.api_calls.iter().map(|c| c.endpoint.clone())),
            ConditionField::ExternalApiCalls => {
                json!(ctx.api_calls.iter().filter(|c| c.external).count())
            }
            ConditionField::UnauthenticatedApiCalls => json!(ctx
                .api_calls
                .iter()
                .filter(|c| c.external && !c.auth_required)
                .count()),
            ConditionField::PiiDetection => json!(ctx.touches_pii()),
            ConditionField::PiiTypes => strings(
                attached
                    .pii
                    .iter()
                    .flat_map(|p| p.types.iter().map(|t| t.as_str().to_string())),
            ),
            ConditionField::RiskScore => json!(attached
                .risk
                .as_ref()
                .ok_or("no risk score attached to context")?
                .overall),
            ConditionField::RiskSeverity => json!(attached
                .risk
                .as_ref()
                .ok_or("no risk score attached to context")?
                .severity
                .as_str()),
            ConditionField::AdherenceScore => json!(attached
                .adherence
                .as_ref()
                .ok_or("no adherence metrics attached to context")?
                .overall_score),
            ConditionField::DriftDetected => {
                json!(attached.adherence.as_ref().is_some_and(|a| a.drift_detected))
            }
            ConditionField::InjectionDetected => {
                json!(attached.injection.as_ref().is_some_and(|i| i.is_injection))
            }
            ConditionField::InjectionSeverity => {
                let injection = attached
                    .injection
                    .as_ref()
                    .ok_or("no injection analysis attached to context")?;
                match injection.severity {
                    Some(s) => json!(s.as_str()),
                    None => Value::Null,
                }
            }
            ConditionField::EstimatedCost => json!(ctx.estimated_cost.unwrap_or(0.0)),
            ConditionField::EstimatedDuration => json!(ctx.estimated_duration_ms.unwrap_or(0)),
            ConditionField::RequestedActions => strings(ctx.requested_actions.iter().cloned()),
            ConditionField::AgentId => json!(ctx.agent_id),
            ConditionField::UserId => json!(ctx.user_id),
            ConditionField::Permission => json!(self.all_actions_granted(ctx)?),
            ConditionField::Metadata { path } => metadata_path(&ctx.metadata, path),
            ConditionField::Custom { name } => {
                let extractor = self
                    .extractors
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("no custom extractor registered as '{}'", name))?;
                extractor(ctx).map_err(|e| e.to_string())?
            }
        };
        Ok(value)
    }

    fn all_actions_granted(&self, ctx: &PolicyContext) -> Result<bool, String> {
        let checker = self
            .permissions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or("no permission checker configured")?;
        Ok(ctx.requested_actions.iter().all(|requested| {
            let (resource, action) = requested
                .rsplit_once(':')
                .unwrap_or((requested.as_str(), "execute"));
            checker.has_permission(&ctx.agent_id, resource, action)
        }))
    }

    // ── Operators ────────────────────────────────────────────────────────────

    fn apply(&self, condition: &PolicyCondition, actual: &Value) -> Result<bool, String> {
        let expected = &condition.value;
        match condition.operator {
            Operator::Equals => Ok(loose_eq(actual, expected)),
            Operator::Contains => match actual {
                Value::Array(items) => Ok(items.iter().any(|i| loose_eq(i, expected))),
                Value::String(s) => expected
                    .as_str()
                    .map(|needle| s.contains(needle))
                    .ok_or_else(|| format!("'{}' needs a string value", condition)),
                other => Err(format!("cannot apply contains to {}", other)),
            },
            Operator::GreaterThan => {
                compare(actual, expected).map(|o| o == std::cmp::Ordering::Greater)
            }
            Operator::LessThan => compare(actual, expected).map(|o| o == std::cmp::Ordering::Less),
            Operator::Matches => {
                let pattern = expected
                    .as_str()
                    .ok_or_else(|| format!("'{}' needs a string pattern", condition))?;
                let re = self.regex(pattern)?;
                match actual {
                    Value::String(s) => Ok(re.is_match(s)),
                    Value::Array(items) => Ok(items
                        .iter()
                        .filter_map(Value::as_str)
                        .any(|s| re.is_match(s))),
                    other => Err(format!("cannot match pattern against {}", other)),
                }
            }
            Operator::In | Operator::NotIn => {
                let allowed = expected
                    .as_array()
                    .ok_or_else(|| format!("'{}' needs a list value", condition))?;
                let member = |v: &Value| allowed.iter().any(|a| loose_eq(v, a));
                let holds = match (condition.operator, actual) {
                    (Operator::In, Value::Array(items)) => items.iter().all(member),
                    (Operator::In, scalar) => member(scalar),
                    (_, Value::Array(items)) => !items.iter().any(member),
                    (_, scalar) => !member(scalar),
                };
                Ok(holds)
            }
        }
    }

    fn regex(&self, pattern: &str) -> Result<Regex, String> {
        if let Some(re) = self
            .regexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
        self.regexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

fn strings<I: Iterator<Item = String>>(items: I) -> Value {
    Value::Array(items.map(Value::String).collect())
}

fn metadata_path(metadata: &serde_json::Map<String, Value>, path: &str) -> Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Value::Null;
    };
    let mut current = match metadata.get(first) {
        Some(v) => v,
        None => return Value::Null,
    };
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn severity_of(v: &Value) -> Option<Severity> {
    serde_json::from_value(v.clone()).ok()
}

fn compare(actual: &Value, expected: &Value) -> Result<std::cmp::Ordering, String> {
    if let (Some(a), Some(e)) = (actual.as_f64(), expected.as_f64()) {
        return a
            .partial_cmp(&e)
            .ok_or_else(|| format!("cannot order {} and {}", a, e));
    }
    if let (Some(a), Some(e)) = (severity_of(actual), severity_of(expected)) {
        return Ok(a.cmp(&e));
    }
    Err(format!("cannot order {} against {}", actual, expected))
}
