//! Relevance and influence scoring, floor filtering, and floor relaxation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, instrument, warn};

use buyergroup_shared::text::{contains_any, normalize};
use buyergroup_shared::{
    Candidate, CandidateFilters, DealBand, DealContext, RunFlag, ScoredCandidate, Seniority,
};

use crate::presets::ResolvedKeywords;

// ---------------------------------------------------------------------------
// Seniority
// ---------------------------------------------------------------------------

/// Title keywords per tier, highest first. First match wins.
const TIERS: &[(Seniority, &[&str])] = &[
    (
        Seniority::Executive,
        &[
            "chief", "ceo", "cto", "cfo", "coo", "cro", "cmo", "ciso", "cio", "cpo", "president",
            "founder", "co founder", "cofounder", "owner", "managing director", "general manager",
        ],
    ),
    (
        Seniority::VicePresident,
        &["vp", "svp", "evp", "avp", "vice president"],
    ),
    (Seniority::Director, &["director", "head", "head of"]),
    (Seniority::Manager, &["manager", "lead", "supervisor", "team lead"]),
    (Seniority::Senior, &["senior", "sr", "principal", "staff"]),
];

/// Network size above which an untitled candidate counts as a manager.
const MANAGER_NETWORK: u64 = 2_000;
/// Network size above which an untitled candidate counts as senior.
const SENIOR_NETWORK: u64 = 1_000;

/// Seniority tier from title keywords, falling back to network size.
pub fn classify_seniority(candidate: &Candidate) -> Seniority {
    let title = normalize(&candidate.title);
    if let Some((tier, _)) = TIERS.iter().find(|(_, kws)| contains_any(&title, *kws)) {
        return *tier;
    }
    match candidate.network_size() {
        Some(n) if n > MANAGER_NETWORK => Seniority::Manager,
        Some(n) if n > SENIOR_NETWORK => Seniority::Senior,
        _ => Seniority::IndividualContributor,
    }
}

fn base_influence(seniority: Seniority) -> f64 {
    match seniority {
        Seniority::Executive => 90.0,
        Seniority::VicePresident => 75.0,
        Seniority::Director => 60.0,
        Seniority::Manager => 45.0,
        Seniority::Senior => 30.0,
        Seniority::IndividualContributor => 15.0,
    }
}

fn deal_multiplier(band: DealBand) -> f64 {
    match band {
        DealBand::Small => 0.9,
        DealBand::MidMarket => 1.0,
        DealBand::Large => 1.2,
        DealBand::Enterprise => 1.4,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Influence of a tier in a given deal band. Senior tiers are amplified more.
pub fn influence(seniority: Seniority, band: DealBand) -> f64 {
    let rank = f64::from(seniority.rank());
    let scale = 1.0 + (deal_multiplier(band) - 1.0) * rank / 5.0;
    round_to(base_influence(seniority) * scale, 2)
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

const PRIMARY_TITLE: f64 = 0.45;
const PRIMARY_DEPARTMENT: f64 = 0.30;
const SECONDARY_TITLE: f64 = 0.15;
const SECONDARY_DEPARTMENT: f64 = 0.10;
const RELEVANT_DEPARTMENT: f64 = 0.20;

/// Topical fit in `[0, 1]`. Any deny-list hit forces 0.
pub fn relevance(candidate: &Candidate, keywords: &ResolvedKeywords, filters: &CandidateFilters) -> f64 {
    let title = normalize(&candidate.title);
    let department = normalize(&candidate.department);

    if contains_any(&title, &filters.title_deny) || contains_any(&department, &filters.department_deny) {
        return 0.0;
    }

    let mut score = 0.0;
    if contains_any(&title, &keywords.primary) {
        score += PRIMARY_TITLE;
    }
    if contains_any(&department, &keywords.primary) {
        score += PRIMARY_DEPARTMENT;
    }
    if contains_any(&title, &keywords.secondary) {
        score += SECONDARY_TITLE;
    }
    if contains_any(&department, &keywords.secondary) {
        score += SECONDARY_DEPARTMENT;
    }
    if contains_any(&department, &keywords.relevant_departments) {
        score += RELEVANT_DEPARTMENT;
    }

    round_to(score.clamp(0.0, 1.0), 3)
}

/// Score one candidate at its position in the discovery stream.
pub fn score_candidate(
    candidate: &Candidate,
    discovery_index: usize,
    keywords: &ResolvedKeywords,
    deal: &DealContext,
) -> ScoredCandidate {
    let seniority = classify_seniority(candidate);
    ScoredCandidate {
        candidate: candidate.clone(),
        relevance: relevance(candidate, keywords, &deal.filters),
        influence: influence(seniority, deal.band()),
        seniority,
        discovery_index,
    }
}

/// Relevance desc, then influence desc, then discovery order.
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.relevance
        .total_cmp(&a.relevance)
        .then_with(|| b.influence.total_cmp(&a.influence))
        .then_with(|| a.discovery_index.cmp(&b.discovery_index))
}

// ---------------------------------------------------------------------------
// Floor and relaxation
// ---------------------------------------------------------------------------

/// Floor configuration for one scoring pass.
#[derive(Debug, Clone, Copy)]
pub struct FloorOptions {
    pub relevance_floor: f64,
    pub influence_floor: f64,
    /// Multiplier applied to both floors during relaxation.
    pub relaxation_factor: f64,
    /// Survivor count below which relaxation runs.
    pub min_survivors: usize,
}

impl FloorOptions {
    fn admits(&self, c: &ScoredCandidate, factor: f64) -> bool {
        c.relevance >= self.relevance_floor * factor || c.influence >= self.influence_floor * factor
    }
}

/// Result of the scoring stage.
#[derive(Debug, Clone, Default)]
pub struct ScoringOutcome {
    /// Surviving candidates, ranked and deduplicated by (name, title).
    pub ranked: Vec<ScoredCandidate>,
    /// Number of candidates scored.
    pub scored: usize,
    /// Candidates still below the floor after relaxation, in discovery order.
    pub below_floor: Vec<ScoredCandidate>,
    /// Departments whose floor was relaxed, in relaxation order.
    pub relaxed_departments: Vec<String>,
    pub flags: Vec<RunFlag>,
}

/// Score, apply the floor (relaxing once if needed), rank, and dedup.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub fn score_candidates(
    candidates: &[Candidate],
    keywords: &ResolvedKeywords,
    deal: &DealContext,
    floors: &FloorOptions,
) -> ScoringOutcome {
    let scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| score_candidate(c, i, keywords, deal))
        .collect();

    let (mut survivors, mut below_floor): (Vec<_>, Vec<_>) =
        scored.iter().cloned().partition(|c| floors.admits(c, 1.0));

    let mut flags = Vec::new();
    let mut relaxed_departments = Vec::new();

    // An empty pool always triggers the one relaxation pass.
    let required = floors.min_survivors.max(1);
    if survivors.len() < required {
        warn!(
            survivors = survivors.len(),
            required,
            "too few candidates above floor, relaxing once"
        );
        flags.push(RunFlag::NoCandidatesAboveFloor {
            survivors: survivors.len(),
            required,
        });

        let before = survivors.len();
        relaxed_departments = relax_by_department(&mut below_floor, floors, required, &mut survivors);
        let readmitted = survivors.len() - before;
        if readmitted > 0 {
            flags.push(RunFlag::FloorRelaxed {
                departments: relaxed_departments.clone(),
                readmitted,
            });
        }
    }

    survivors.sort_by(compare_ranked);

    let mut seen = HashSet::new();
    let before_dedup = survivors.len();
    survivors.retain(|c| seen.insert(c.candidate.identity()));
    if survivors.len() < before_dedup {
        debug!(removed = before_dedup - survivors.len(), "dropped duplicate identities");
    }

    info!(
        scored = scored.len(),
        survivors = survivors.len(),
        relaxed = relaxed_departments.len(),
        "scoring completed"
    );

    ScoringOutcome {
        ranked: survivors,
        scored: scored.len(),
        below_floor,
        relaxed_departments,
        flags,
    }
}

/// Single deterministic widening pass, one department at a time.
///
/// Departments are visited by best composite score (`relevance * 100 +
/// influence`), then by earliest discovery index. Stops once `required`
/// is reached or departments run out. Returns the departments that
/// readmitted at least one candidate; `dropped` keeps the rest.
fn relax_by_department(
    dropped: &mut Vec<ScoredCandidate>,
    floors: &FloorOptions,
    required: usize,
    survivors: &mut Vec<ScoredCandidate>,
) -> Vec<String> {
    let mut by_department: BTreeMap<String, Vec<ScoredCandidate>> = BTreeMap::new();
    for c in dropped.drain(..) {
        by_department
            .entry(c.candidate.department_key())
            .or_default()
            .push(c);
    }

    let composite = |c: &ScoredCandidate| c.relevance * 100.0 + c.influence;
    let mut order: Vec<(String, f64, usize)> = by_department
        .iter()
        .map(|(dept, members)| {
            let best = members.iter().map(composite).fold(f64::MIN, f64::max);
            let first = members.iter().map(|c| c.discovery_index).min().unwrap_or(usize::MAX);
            (dept.clone(), best, first)
        })
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.2.cmp(&b.2)));

    let mut relaxed = Vec::new();
    for (dept, _, _) in order {
        if survivors.len() >= required {
            break;
        }
        let Some(members) = by_department.remove(&dept) else {
            continue;
        };
        let (readmit, still_below): (Vec<_>, Vec<_>) = members
            .into_iter()
            .partition(|c| floors.admits(c, floors.relaxation_factor));
        dropped.extend(still_below);
        if !readmit.is_empty() {
            debug!(department = %dept, readmitted = readmit.len(), "floor relaxed");
            survivors.extend(readmit);
            relaxed.push(dept);
        }
    }
    dropped.extend(by_department.into_values().flatten());
    dropped.sort_by_key(|c| c.discovery_index);
    relaxed
}
