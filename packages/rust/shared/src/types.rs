//! Core domain types for buyer-group discovery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BuyerGroupError, Result};
use crate::text::{department_key, normalize};

// ---------------------------------------------------------------------------
// DealContext
// ---------------------------------------------------------------------------

/// Immutable description of the deal a buyer group is being built for.
///
/// Usually deserialized from a TOML deal file; every list defaults to empty,
/// in which case keyword presets are derived from `product_category`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealContext {
    /// Expected deal value in the seller's currency.
    pub deal_size: f64,
    /// Free-text product category (e.g. "sales engagement", "security").
    pub product_category: String,
    /// Keywords whose presence marks a strong topical fit.
    #[serde(default)]
    pub primary_keywords: Vec<String>,
    /// Keywords whose presence marks a weaker topical fit.
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    /// Departments considered deal-relevant for champion/stakeholder rules.
    #[serde(default)]
    pub relevant_departments: Vec<String>,
    /// Allow/deny filters applied before scoring.
    #[serde(default)]
    pub filters: CandidateFilters,
    /// Buyer-group size bounds.
    #[serde(default)]
    pub sizing: GroupSizing,
    /// Relative slot weights per role.
    #[serde(default)]
    pub role_priorities: RolePriorities,
    /// Cohesion component weights.
    #[serde(default)]
    pub cohesion_weights: CohesionWeights,
}

impl DealContext {
    /// Minimal deal context with default sizing and priorities.
    pub fn new(deal_size: f64, product_category: impl Into<String>) -> Self {
        Self {
            deal_size,
            product_category: product_category.into(),
            primary_keywords: Vec::new(),
            secondary_keywords: Vec::new(),
            relevant_departments: Vec::new(),
            filters: CandidateFilters::default(),
            sizing: GroupSizing::default(),
            role_priorities: RolePriorities::default(),
            cohesion_weights: CohesionWeights::default(),
        }
    }

    /// Parse a deal context from TOML text and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let deal: Self = toml::from_str(content)
            .map_err(|e| BuyerGroupError::parse(format!("invalid deal file: {e}")))?;
        deal.validate()?;
        Ok(deal)
    }

    /// Band used to size searches and tune thresholds.
    pub fn band(&self) -> DealBand {
        DealBand::from_size(self.deal_size)
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !self.deal_size.is_finite() || self.deal_size < 0.0 {
            return Err(BuyerGroupError::validation(format!(
                "deal_size must be a non-negative number, got {}",
                self.deal_size
            )));
        }
        self.sizing.validate()?;
        self.role_priorities.validate()?;
        self.cohesion_weights.validate()?;
        Ok(())
    }
}

/// Deal-size bands; thresholds are inclusive lower bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealBand {
    /// Under 25k.
    Small,
    /// 25k up to 250k.
    MidMarket,
    /// 250k up to 1M.
    Large,
    /// 1M and above.
    Enterprise,
}

impl DealBand {
    pub fn from_size(deal_size: f64) -> Self {
        if deal_size >= 1_000_000.0 {
            Self::Enterprise
        } else if deal_size >= 250_000.0 {
            Self::Large
        } else if deal_size >= 25_000.0 {
            Self::MidMarket
        } else {
            Self::Small
        }
    }
}

impl std::fmt::Display for DealBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Small => "small",
            Self::MidMarket => "mid_market",
            Self::Large => "large",
            Self::Enterprise => "enterprise",
        };
        f.write_str(s)
    }
}

/// Pre-scoring candidate filters. Empty allow-lists admit everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateFilters {
    #[serde(default)]
    pub department_allow: Vec<String>,
    #[serde(default)]
    pub department_deny: Vec<String>,
    #[serde(default)]
    pub title_allow: Vec<String>,
    #[serde(default)]
    pub title_deny: Vec<String>,
    /// When set, candidates must be located in one of `regions`.
    #[serde(default)]
    pub geography_restricted: bool,
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Buyer-group size bounds `{min, max, ideal}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSizing {
    pub min: usize,
    pub max: usize,
    pub ideal: usize,
}

impl Default for GroupSizing {
    fn default() -> Self {
        Self {
            min: 3,
            max: 12,
            ideal: 7,
        }
    }
}

impl GroupSizing {
    pub fn validate(&self) -> Result<()> {
        if self.max == 0 {
            return Err(BuyerGroupError::validation("sizing.max must be at least 1"));
        }
        if self.min > self.ideal || self.ideal > self.max {
            return Err(BuyerGroupError::validation(format!(
                "sizing must satisfy min <= ideal <= max (got min={}, ideal={}, max={})",
                self.min, self.ideal, self.max
            )));
        }
        Ok(())
    }
}

/// Slot weight per role. Weights are relative; they need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RolePriorities {
    pub decision: f64,
    pub champion: f64,
    pub stakeholder: f64,
    pub blocker: f64,
    pub introducer: f64,
}

impl Default for RolePriorities {
    fn default() -> Self {
        Self {
            decision: 0.30,
            champion: 0.25,
            stakeholder: 0.25,
            blocker: 0.10,
            introducer: 0.10,
        }
    }
}

impl RolePriorities {
    pub fn weight(&self, role: Role) -> f64 {
        match role {
            Role::Decision => self.decision,
            Role::Champion => self.champion,
            Role::Stakeholder => self.stakeholder,
            Role::Blocker => self.blocker,
            Role::Introducer => self.introducer,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for role in Role::ALL {
            let w = self.weight(role);
            if !w.is_finite() || w < 0.0 {
                return Err(BuyerGroupError::validation(format!(
                    "role_priorities.{role} must be a non-negative number, got {w}"
                )));
            }
        }
        Ok(())
    }
}

/// Relative weights of the three cohesion components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohesionWeights {
    pub roles: f64,
    pub departments: f64,
    pub seniority: f64,
}

impl Default for CohesionWeights {
    fn default() -> Self {
        Self {
            roles: 1.0,
            departments: 1.0,
            seniority: 1.0,
        }
    }
}

impl CohesionWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [self.roles, self.departments, self.seniority];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(BuyerGroupError::validation(
                "cohesion_weights must be non-negative numbers",
            ));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(BuyerGroupError::validation(
                "cohesion_weights must not all be zero",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Company
// ---------------------------------------------------------------------------

/// Resolved company identity and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFacts {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

impl CompanyFacts {
    /// Facts for a degraded run: only the caller's identifier is known.
    pub fn degraded(identifier: &str) -> Self {
        Self {
            name: identifier.trim().to_string(),
            domain: None,
            social_profile: None,
            employee_count: None,
            revenue: None,
            industry: None,
        }
    }

    /// Reference handed to the candidate directory.
    pub fn company_ref(&self) -> CompanyRef {
        CompanyRef {
            name: self.name.clone(),
            domain: self.domain.clone(),
            social_profile: self.social_profile.clone(),
        }
    }
}

/// Lightweight company reference used for paging the candidate directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_profile: Option<String>,
}

impl CompanyRef {
    /// Stable lookup key: domain, then social profile, then normalized name.
    pub fn key(&self) -> String {
        self.domain
            .clone()
            .or_else(|| self.social_profile.clone())
            .unwrap_or_else(|| normalize(&self.name).replace(' ', "-"))
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A lightweight stakeholder record from bulk discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Network size hints some providers return with preview records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<u32>,
}

impl Candidate {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            department: department.into(),
            location: String::new(),
            profile_url: None,
            connections: None,
            followers: None,
        }
    }

    /// Discovery dedup key: normalized (name, title, department).
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            name: normalize(&self.name),
            title: normalize(&self.title),
            department: normalize(&self.department),
        }
    }

    /// Group identity: normalized (name, title).
    pub fn identity(&self) -> (String, String) {
        (normalize(&self.name), normalize(&self.title))
    }

    /// Diversity bucket for coverage and cohesion.
    pub fn department_key(&self) -> String {
        department_key(&self.department)
    }

    /// Combined network size, if the provider reported any.
    pub fn network_size(&self) -> Option<u64> {
        match (self.connections, self.followers) {
            (None, None) => None,
            (c, f) => Some(u64::from(c.unwrap_or(0)) + u64::from(f.unwrap_or(0))),
        }
    }
}

/// Normalized candidate identity used for cross-page deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub name: String,
    pub title: String,
    pub department: String,
}

/// One page of directory results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<Candidate>,
    /// False once the directory has no further pages.
    #[serde(default)]
    pub has_more: bool,
}

/// Organizational seniority tier, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    IndividualContributor,
    Senior,
    Manager,
    Director,
    VicePresident,
    Executive,
}

impl Seniority {
    /// 0 (individual contributor) through 5 (executive).
    pub fn rank(self) -> u8 {
        match self {
            Self::IndividualContributor => 0,
            Self::Senior => 1,
            Self::Manager => 2,
            Self::Director => 3,
            Self::VicePresident => 4,
            Self::Executive => 5,
        }
    }
}

/// A candidate with relevance and influence attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// Topical fit in `[0, 1]`.
    pub relevance: f64,
    /// Organizational authority, typically 0..=100.
    pub influence: f64,
    pub seniority: Seniority,
    /// Position in the deduplicated discovery stream; final tie-breaker.
    pub discovery_index: usize,
}

// ---------------------------------------------------------------------------
// Roles and groups
// ---------------------------------------------------------------------------

/// Buyer-group role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Decision,
    Champion,
    Stakeholder,
    Blocker,
    Introducer,
}

impl Role {
    /// Fixed role order used for tie-breaks and group ordering.
    pub const ALL: [Role; 5] = [
        Role::Decision,
        Role::Champion,
        Role::Stakeholder,
        Role::Blocker,
        Role::Introducer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Champion => "champion",
            Self::Stakeholder => "stakeholder",
            Self::Blocker => "blocker",
            Self::Introducer => "introducer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = BuyerGroupError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| BuyerGroupError::parse(format!("unknown role '{s}'")))
    }
}

/// A role attached to a scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub scored: ScoredCandidate,
    pub role: Role,
    pub confidence: f64,
    pub justification: String,
}

impl RoleAssignment {
    pub fn candidate(&self) -> &Candidate {
        &self.scored.candidate
    }

    pub fn influence(&self) -> f64 {
        self.scored.influence
    }
}

/// Buyer group under construction.
///
/// Only the group selector creates one and only the coverage validator
/// extends it; [`BuyerGroup::freeze`] ends mutation before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuyerGroup {
    members: Vec<RoleAssignment>,
}

impl BuyerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[RoleAssignment] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True if a member already has this candidate's (name, title) identity.
    pub fn contains(&self, candidate: &Candidate) -> bool {
        let identity = candidate.identity();
        self.members
            .iter()
            .any(|m| m.candidate().identity() == identity)
    }

    /// Append a member. Returns `false` (and does nothing) on a duplicate identity.
    pub fn push(&mut self, assignment: RoleAssignment) -> bool {
        if self.contains(assignment.candidate()) {
            return false;
        }
        self.members.push(assignment);
        true
    }

    /// Replace the member at `index`. Returns the removed member, or gives the
    /// replacement back if it would duplicate another member.
    pub fn replace(
        &mut self,
        index: usize,
        assignment: RoleAssignment,
    ) -> std::result::Result<RoleAssignment, RoleAssignment> {
        let identity = assignment.candidate().identity();
        let clash = self
            .members
            .iter()
            .enumerate()
            .any(|(i, m)| i != index && m.candidate().identity() == identity);
        if clash || index >= self.members.len() {
            return Err(assignment);
        }
        Ok(std::mem::replace(&mut self.members[index], assignment))
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.members.iter().filter(|m| m.role == role).count()
    }

    /// Member count per department bucket.
    pub fn department_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for m in &self.members {
            *counts.entry(m.candidate().department_key()).or_insert(0) += 1;
        }
        counts
    }

    /// End mutation; the result is what gets enriched.
    pub fn freeze(self) -> FrozenGroup {
        FrozenGroup {
            members: self.members,
        }
    }
}

/// A finalized, read-only buyer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenGroup {
    members: Vec<RoleAssignment>,
}

impl FrozenGroup {
    pub fn members(&self) -> &[RoleAssignment] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Full profile detail fetched for finalized members only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub career: Vec<Position>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// One career history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Outcome of a member's enrichment call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Enriched,
    /// The call failed or timed out; preview data only.
    Failed { reason: String },
}

/// A finalized member with (possibly) full profile detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMember {
    /// 1-based position in the finalized group.
    pub rank: usize,
    pub assignment: RoleAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<FullProfile>,
    pub enrichment: EnrichmentStatus,
}

impl EnrichedMember {
    pub fn is_enriched(&self) -> bool {
        matches!(self.enrichment, EnrichmentStatus::Enriched)
    }
}

// ---------------------------------------------------------------------------
// Cohesion
// ---------------------------------------------------------------------------

/// Qualitative cohesion bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohesionLevel {
    Strong,
    Moderate,
    Weak,
}

impl CohesionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
        }
    }
}

/// Suggested engagement approach for the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStrategy {
    DecisionLed,
    ChampionLed,
    BlockerMitigation,
    Exploratory,
}

/// Relative priority of pursuing this group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPriority {
    High,
    Medium,
    Low,
}

/// How well-distributed the finalized group is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohesionReport {
    /// 0..=100.
    pub score: f64,
    pub level: CohesionLevel,
    /// Normalized role-distribution entropy in `[0, 1]`.
    pub role_balance: f64,
    /// Normalized department-distribution entropy in `[0, 1]`.
    pub department_balance: f64,
    /// Normalized influence spread in `[0, 1]`.
    pub seniority_spread: f64,
    pub role_counts: BTreeMap<Role, usize>,
    pub department_counts: BTreeMap<String, usize>,
    pub strategy: EngagementStrategy,
    pub priority: GroupPriority,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(name: &str, title: &str, dept: &str, role: Role) -> RoleAssignment {
        RoleAssignment {
            scored: ScoredCandidate {
                candidate: Candidate::new(name, title, dept),
                relevance: 0.5,
                influence: 50.0,
                seniority: Seniority::Manager,
                discovery_index: 0,
            },
            role,
            confidence: 0.5,
            justification: String::new(),
        }
    }

    #[test]
    fn deal_band_thresholds() {
        assert_eq!(DealBand::from_size(0.0), DealBand::Small);
        assert_eq!(DealBand::from_size(24_999.0), DealBand::Small);
        assert_eq!(DealBand::from_size(25_000.0), DealBand::MidMarket);
        assert_eq!(DealBand::from_size(250_000.0), DealBand::Large);
        assert_eq!(DealBand::from_size(1_000_000.0), DealBand::Enterprise);
    }

    #[test]
    fn deal_from_toml_applies_defaults() {
        let deal = DealContext::from_toml(
            r#"
deal_size = 120000
product_category = "sales engagement"

[sizing]
min = 2
ideal = 5
max = 8
"#,
        )
        .expect("parse deal");
        assert_eq!(deal.band(), DealBand::MidMarket);
        assert_eq!(deal.sizing.ideal, 5);
        assert!(deal.primary_keywords.is_empty());
        assert_eq!(deal.role_priorities, RolePriorities::default());
    }

    #[test]
    fn deal_validation_rejects_bad_sizing() {
        let mut deal = DealContext::new(10_000.0, "sales");
        deal.sizing = GroupSizing {
            min: 5,
            ideal: 3,
            max: 8,
        };
        assert!(deal.validate().is_err());

        deal.sizing = GroupSizing {
            min: 0,
            ideal: 0,
            max: 0,
        };
        let err = deal.validate().unwrap_err();
        assert!(err.to_string().contains("sizing.max"));
    }

    #[test]
    fn deal_validation_rejects_negative_weights() {
        let mut deal = DealContext::new(10_000.0, "sales");
        deal.role_priorities.blocker = -1.0;
        assert!(deal.validate().is_err());

        let mut deal = DealContext::new(f64::NAN, "sales");
        deal.sizing = GroupSizing::default();
        assert!(deal.validate().is_err());
    }

    #[test]
    fn candidate_keys_normalize() {
        let a = Candidate::new("Jane  Doe", "VP, Sales", "Sales");
        let b = Candidate::new("jane doe", "vp sales", "SALES");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn company_ref_key_prefers_domain() {
        let mut facts = CompanyFacts::degraded("Acme Corp");
        assert_eq!(facts.company_ref().key(), "acme-corp");
        facts.domain = Some("acme.io".into());
        assert_eq!(facts.company_ref().key(), "acme.io");
    }

    #[test]
    fn group_rejects_duplicate_identity() {
        let mut group = BuyerGroup::new();
        assert!(group.push(assignment("Jane Doe", "VP Sales", "Sales", Role::Decision)));
        assert!(!group.push(assignment("jane doe", "vp sales", "Revenue", Role::Champion)));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn group_replace_guards_duplicates() {
        let mut group = BuyerGroup::new();
        group.push(assignment("A", "Manager", "Sales", Role::Champion));
        group.push(assignment("B", "Manager", "Sales", Role::Champion));

        let dup = assignment("A", "Manager", "Marketing", Role::Stakeholder);
        assert!(group.replace(1, dup).is_err());

        let fresh = assignment("C", "Analyst", "Finance", Role::Introducer);
        let removed = group.replace(1, fresh).expect("replace");
        assert_eq!(removed.candidate().name, "B");
        assert_eq!(group.department_counts().get("finance"), Some(&1));
    }

    #[test]
    fn role_roundtrip_str() {
        for role in Role::ALL {
            let parsed: Role = role.as_str().parse().expect("parse role");
            assert_eq!(parsed, role);
        }
        assert!("sponsor".parse::<Role>().is_err());
    }
}
