//! Injection rule table and heuristic vocabulary.
//!
//! Rule order matters: the first matching rule names the reported attack
//! type.

use once_cell::sync::Lazy;
use regex::Regex;

use warden_contracts::{injection::AttackType, severity::Severity};

/// One ordered injection pattern.
pub struct InjectionRule {
    pub name: &'static str,
    pub attack_type: AttackType,
    pub severity: Severity,
    pub pattern: Regex,
}

fn rule(
    name: &'static str,
    attack_type: AttackType,
    severity: Severity,
    pattern: &str,
) -> InjectionRule {
    InjectionRule {
        name,
        attack_type,
        severity,
        pattern: Regex::new(&format!("(?i){}", pattern))
            .expect("built-in injection pattern must compile"),
    }
}

pub static RULES: Lazy<Vec<InjectionRule>> = Lazy::new(|| {
    use AttackType::*;
    vec![
        rule(
            "ignore_previous_instructions",
            InstructionOverride,
            Severity::Critical,
            r"\b(?:ignore|disregard|forget|skip)\s+(?:all\s+|any\s+|the\s+|your\s+)*(?:previous|prior|above|earlier|preceding)\s+(?:instructions|directions|rules|prompts?|commands)",
        ),
        rule(
            "override_rules",
            InstructionOverride,
            Severity::Critical,
            r"\boverride\s+(?:your|the|all)\s+(?:rules|instructions|guidelines|safety)",
        ),
        rule(
            "new_instructions",
            InstructionOverride,
            Severity::High,
            r"\b(?:new|updated|revised)\s+instructions\s*:",
        ),
        rule(
            "fake_system_tag",
            ContextManipulation,
            Severity::High,
            r"\[/?(?:system|inst)\]|<\|?/?(?:system|im_start|im_end)\|?>",
        ),
        rule(
            "end_of_context",
            ContextManipulation,
            Severity::Medium,
            r"\b(?:end\s+of\s+(?:context|conversation|prompt)|begin\s+new\s+(?:session|conversation))\b",
        ),
        rule(
            "context_reset",
            ContextManipulation,
            Severity::Medium,
            r"\b(?:reset|clear|wipe)\s+(?:the\s+|your\s+)?(?:context|memory|conversation)\b",
        ),
        rule(
            "act_as_unrestricted",
            RoleConfusion,
            Severity::High,
            r"\b(?:act|behave|respond)\s+as\s+(?:an?\s+)?(?:unrestricted|unfiltered|uncensored|unlimited)\b",
        ),
        rule(
            "you_are_now",
            RoleConfusion,
            Severity::High,
            r"\byou\s+are\s+now\s+(?:a|an|the|my)\b",
        ),
        rule(
            "pretend_to_be",
            RoleConfusion,
            Severity::Medium,
            r"\bpretend\s+(?:to\s+be|you\s+are)\b",
        ),
        rule(
            "replace_goal",
            GoalHijacking,
            Severity::High,
            r"\byour\s+(?:new|real|true|primary)\s+(?:goal|task|objective|purpose)\s+is\b",
        ),
        rule(
            "instead_do",
            GoalHijacking,
            Severity::Medium,
            r"\binstead\s*,?\s+(?:you\s+(?:should|must|will)|do\s+the\s+following)\b",
        ),
        rule(
            "send_data_to",
            DataExfiltration,
            Severity::High,
            r"\b(?:send|post|upload|forward|exfiltrate|transmit)\s+(?:all\s+|the\s+|this\s+|any\s+)*(?:data|information|records|credentials|secrets|files|passwords)\s+to\b",
        ),
        rule(
            "markdown_image_beacon",
            DataExfiltration,
            Severity::High,
            r"!\[[^\]]*\]\(https?://[^)\s]*\?[^)\s]*=",
        ),
        rule(
            "elevated_mode",
            PrivilegeEscalation,
            Severity::Critical,
            r"\b(?:enable|enter|activate|switch\s+to)\s+(?:admin|developer|debug|god|root|sudo)\s+mode\b",
        ),
        rule(
            "grant_access",
            PrivilegeEscalation,
            Severity::Critical,
            r"\b(?:grant|give)\s+(?:me|yourself|us)\s+(?:admin|root|full|elevated|unrestricted)\s+(?:access|privileges|permissions|rights)\b",
        ),
        rule(
            "sudo_command",
            PrivilegeEscalation,
            Severity::Medium,
            r"\bsudo\s+[a-z]",
        ),
        rule(
            "reveal_prompt",
            SystemPromptLeak,
            Severity::High,
            r"\b(?:reveal|show|print|display|repeat|output)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+|initial\s+|original\s+)?(?:prompt|instructions)\b",
        ),
        rule(
            "ask_instructions",
            SystemPromptLeak,
            Severity::Medium,
            r"\bwhat\s+(?:are|were)\s+your\s+(?:original\s+|initial\s+|system\s+)?instructions\b",
        ),
        rule(
            "dan_mode",
            Jailbreak,
            Severity::Critical,
            r"\bDAN\s+mode\b|\bdo\s+anything\s+now\b",
        ),
        rule(
            "bypass_restrictions",
            Jailbreak,
            Severity::High,
            r"\b(?:without|bypass|ignore|disable)\s+(?:any\s+|all\s+|your\s+)*(?:restrictions|limitations|content\s+filters?|safety\s+(?:rules|guidelines|filters?))\b",
        ),
        rule(
            "fictional_framing",
            Jailbreak,
            Severity::Medium,
            r"\b(?:hypothetically|in\s+a\s+fictional\s+world|for\s+a\s+story)\b.{0,60}\b(?:how\s+to|instructions\s+for)\b",
        ),
    ]
});

/// One heuristic vocabulary group: each distinct hit adds `weight`, the
/// group contributes at most `cap`.
pub struct HeuristicGroup {
    pub name: &'static str,
    pub terms: &'static [&'static str],
    pub weight: f64,
    pub cap: f64,
}

pub const HEURISTICS: &[HeuristicGroup] = &[
    HeuristicGroup {
        name: "override_vocabulary",
        terms: &["ignore", "disregard", "forget", "override", "bypass", "instead"],
        weight: 0.15,
        cap: 0.4,
    },
    HeuristicGroup {
        name: "role_change",
        terms: &["you are now", "act as", "pretend", "roleplay", "persona", "from now on"],
        weight: 0.15,
        cap: 0.3,
    },
    HeuristicGroup {
        name: "system_access",
        terms: &["system prompt", "admin", "root", "sudo", "developer mode", "jailbreak"],
        weight: 0.1,
        cap: 0.3,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_attack_type_has_a_rule() {
        for ty in [
            AttackType::InstructionOverride,
            AttackType::ContextManipulation,
            AttackType::RoleConfusion,
            AttackType::GoalHijacking,
            AttackType::DataExfiltration,
            AttackType::PrivilegeEscalation,
            AttackType::SystemPromptLeak,
            AttackType::Jailbreak,
        ] {
            assert!(RULES.iter().any(|r| r.attack_type == ty), "{ty}");
        }
    }

    #[test]
    fn rule_names_are_unique() {
        let mut names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }
}
