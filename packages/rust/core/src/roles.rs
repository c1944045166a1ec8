//! Ordered rule table assigning exactly one role per scored candidate.

use tracing::{debug, instrument};

use buyergroup_shared::text::{contains_any, normalize};
use buyergroup_shared::{DealBand, Role, RoleAssignment, ScoredCandidate, Seniority};

use crate::presets::ResolvedKeywords;

const MANAGER_KEYWORDS: &[&str] = &["manager", "lead", "supervisor"];

const BLOCKER_KEYWORDS: &[&str] = &[
    "security",
    "legal",
    "compliance",
    "procurement",
    "purchasing",
    "risk",
    "counsel",
    "privacy",
    "audit",
    "vendor management",
];

/// Normalized facts the rules look at.
#[derive(Debug)]
pub struct RuleInput {
    pub title: String,
    pub department: String,
    pub seniority: Seniority,
    pub relevant_department: bool,
    pub band: DealBand,
}

impl RuleInput {
    pub fn new(scored: &ScoredCandidate, keywords: &ResolvedKeywords, band: DealBand) -> Self {
        let department = normalize(&scored.candidate.department);
        Self {
            title: normalize(&scored.candidate.title),
            relevant_department: contains_any(&department, &keywords.relevant_departments),
            department,
            seniority: scored.seniority,
            band,
        }
    }
}

/// One predicate→role rule.
pub struct RoleRule {
    pub role: Role,
    pub name: &'static str,
    pub matches: fn(&RuleInput) -> bool,
    pub confidence: fn(&RuleInput) -> f64,
}

impl std::fmt::Debug for RoleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleRule")
            .field("role", &self.role)
            .field("name", &self.name)
            .finish()
    }
}

fn is_decision_tier(input: &RuleInput) -> bool {
    matches!(
        input.seniority,
        Seniority::Executive | Seniority::VicePresident | Seniority::Director
    )
}

fn decision_confidence(input: &RuleInput) -> f64 {
    match input.seniority {
        Seniority::Executive => 0.95,
        Seniority::VicePresident => 0.9,
        _ if matches!(input.band, DealBand::Large | DealBand::Enterprise) => 0.65,
        _ => 0.8,
    }
}

fn is_relevant_manager(input: &RuleInput) -> bool {
    input.relevant_department && contains_any(&input.title, MANAGER_KEYWORDS)
}

fn is_relevant_department(input: &RuleInput) -> bool {
    input.relevant_department
}

fn is_gatekeeper(input: &RuleInput) -> bool {
    contains_any(&input.title, BLOCKER_KEYWORDS) || contains_any(&input.department, BLOCKER_KEYWORDS)
}

fn always(_: &RuleInput) -> bool {
    true
}

/// Evaluated top to bottom; the first match wins. Decision-maker detection
/// precedes department rules so a VP in a relevant department stays a
/// decision-maker.
pub static RULES: &[RoleRule] = &[
    RoleRule {
        role: Role::Decision,
        name: "decision-tier title",
        matches: is_decision_tier,
        confidence: decision_confidence,
    },
    RoleRule {
        role: Role::Champion,
        name: "manager in a deal-relevant department",
        matches: is_relevant_manager,
        confidence: |_| 0.75,
    },
    RoleRule {
        role: Role::Stakeholder,
        name: "deal-relevant department",
        matches: is_relevant_department,
        confidence: |_| 0.6,
    },
    RoleRule {
        role: Role::Blocker,
        name: "security, legal, compliance, procurement or risk function",
        matches: is_gatekeeper,
        confidence: |_| 0.7,
    },
    RoleRule {
        role: Role::Introducer,
        name: "no stronger signal",
        matches: always,
        confidence: |_| 0.4,
    },
];

/// Assign a role to one candidate.
pub fn classify(scored: ScoredCandidate, keywords: &ResolvedKeywords, band: DealBand) -> RoleAssignment {
    let input = RuleInput::new(&scored, keywords, band);
    let (role, confidence, justification) = RULES
        .iter()
        .find(|rule| (rule.matches)(&input))
        .map(|rule| (rule.role, (rule.confidence)(&input), rule.name))
        .unwrap_or((Role::Introducer, 0.4, "no stronger signal"));

    RoleAssignment {
        scored,
        role,
        confidence,
        justification: justification.to_string(),
    }
}

/// Classify every ranked candidate, preserving order.
#[instrument(skip_all, fields(candidates = ranked.len(), band = %band))]
pub fn assign_roles(
    ranked: Vec<ScoredCandidate>,
    keywords: &ResolvedKeywords,
    band: DealBand,
) -> Vec<RoleAssignment> {
    let assignments: Vec<_> = ranked
        .into_iter()
        .map(|s| classify(s, keywords, band))
        .collect();
    debug!(
        decision = assignments.iter().filter(|a| a.role == Role::Decision).count(),
        champion = assignments.iter().filter(|a| a.role == Role::Champion).count(),
        "roles assigned"
    );
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::resolve_keywords;
    use crate::scoring::score_candidate;
    use buyergroup_shared::{Candidate, DealContext};

    fn role_of(title: &str, dept: &str, deal_size: f64) -> RoleAssignment {
        let deal = DealContext::new(deal_size, "sales engagement");
        let kw = resolve_keywords(&deal);
        let scored = score_candidate(&Candidate::new("X", title, dept), 0, &kw, &deal);
        classify(scored, &kw, deal.band())
    }

    #[test]
    fn rule_order_is_fixed() {
        let roles: Vec<_> = RULES.iter().map(|r| r.role).collect();
        assert_eq!(roles, Role::ALL.to_vec());
    }

    #[test]
    fn vp_in_relevant_department_is_decision() {
        let a = role_of("VP Sales", "Sales", 50_000.0);
        assert_eq!(a.role, Role::Decision);
        assert_eq!(a.confidence, 0.9);
    }

    #[test]
    fn manager_in_relevant_department_is_champion() {
        assert_eq!(role_of("Sales Manager", "Sales", 50_000.0).role, Role::Champion);
        assert_eq!(role_of("Team Lead", "Revenue Operations", 50_000.0).role, Role::Champion);
    }

    #[test]
    fn manager_elsewhere_is_not_champion() {
        assert_eq!(role_of("Facilities Manager", "Facilities", 50_000.0).role, Role::Introducer);
    }

    #[test]
    fn relevant_department_without_manager_is_stakeholder() {
        assert_eq!(role_of("Account Executive", "Sales", 50_000.0).role, Role::Stakeholder);
    }

    #[test]
    fn gatekeepers_are_blockers() {
        assert_eq!(role_of("Procurement Specialist", "Finance", 50_000.0).role, Role::Blocker);
        assert_eq!(role_of("Associate", "Legal", 50_000.0).role, Role::Blocker);
        // Seniority still wins over gatekeeping.
        assert_eq!(role_of("Director of Security", "Security", 50_000.0).role, Role::Decision);
    }

    #[test]
    fn director_confidence_drops_in_large_deals() {
        assert_eq!(role_of("Director of Sales", "Sales", 50_000.0).confidence, 0.8);
        assert_eq!(role_of("Director of Sales", "Sales", 500_000.0).confidence, 0.65);
        assert_eq!(role_of("CEO", "Executive", 2_000_000.0).confidence, 0.95);
    }
}
