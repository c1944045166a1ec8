//! Post-enrichment cohesion scoring.

use std::collections::BTreeMap;

use tracing::{info, instrument};

use buyergroup_shared::{
    CohesionLevel, CohesionReport, CohesionWeights, EngagementStrategy, EnrichedMember,
    GroupPriority, Role,
};

/// Influence standard deviation that counts as a full spread.
const SPREAD_SCALE: f64 = 25.0;

const STRONG_THRESHOLD: f64 = 70.0;
const MODERATE_THRESHOLD: f64 = 40.0;

/// Shannon entropy of `counts`, normalized by `ln(categories)`.
fn normalized_entropy<I>(counts: I, total: usize, categories: usize) -> f64
where
    I: IntoIterator<Item = usize>,
{
    if total <= 1 || categories <= 1 {
        return 0.0;
    }
    let n = total as f64;
    let h: f64 = counts
        .into_iter()
        .filter(|c| *c > 0)
        .map(|c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum();
    (h / (categories as f64).ln()).clamp(0.0, 1.0)
}

fn population_stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Level bucket for a 0..=100 score.
pub fn level_for(score: f64) -> CohesionLevel {
    if score >= STRONG_THRESHOLD {
        CohesionLevel::Strong
    } else if score >= MODERATE_THRESHOLD {
        CohesionLevel::Moderate
    } else {
        CohesionLevel::Weak
    }
}

/// Strategy follows the strongest role present.
pub fn strategy_for(role_counts: &BTreeMap<Role, usize>) -> EngagementStrategy {
    let has = |r: Role| role_counts.get(&r).copied().unwrap_or(0) > 0;
    if has(Role::Decision) {
        EngagementStrategy::DecisionLed
    } else if has(Role::Champion) {
        EngagementStrategy::ChampionLed
    } else if has(Role::Blocker) {
        EngagementStrategy::BlockerMitigation
    } else {
        EngagementStrategy::Exploratory
    }
}

pub fn priority_for(total_influence: f64, mean_influence: f64) -> GroupPriority {
    if total_influence >= 300.0 && mean_influence >= 55.0 {
        GroupPriority::High
    } else if total_influence >= 150.0 && mean_influence >= 40.0 {
        GroupPriority::Medium
    } else {
        GroupPriority::Low
    }
}

/// Score the finalized group.
#[instrument(skip_all, fields(members = members.len()))]
pub fn evaluate(members: &[EnrichedMember], weights: &CohesionWeights) -> CohesionReport {
    let n = members.len();

    let mut role_counts: BTreeMap<Role, usize> = BTreeMap::new();
    let mut department_counts: BTreeMap<String, usize> = BTreeMap::new();
    for m in members {
        *role_counts.entry(m.assignment.role).or_insert(0) += 1;
        *department_counts
            .entry(m.assignment.candidate().department_key())
            .or_insert(0) += 1;
    }

    let role_balance = normalized_entropy(role_counts.values().copied(), n, n.min(Role::ALL.len()));
    let department_balance = normalized_entropy(department_counts.values().copied(), n, n);

    let influences: Vec<f64> = members.iter().map(|m| m.assignment.influence()).collect();
    let seniority_spread = (population_stddev(&influences) / SPREAD_SCALE).min(1.0);

    let weight_sum = weights.roles + weights.departments + weights.seniority;
    let mean_component = if weight_sum > 0.0 {
        (weights.roles * role_balance
            + weights.departments * department_balance
            + weights.seniority * seniority_spread)
            / weight_sum
    } else {
        0.0
    };
    let score = round_to(100.0 * mean_component, 1);

    let total_influence: f64 = influences.iter().sum();
    let mean_influence = if n == 0 { 0.0 } else { total_influence / n as f64 };

    let mut notes = Vec::new();
    if !role_counts.contains_key(&Role::Decision) {
        notes.push("no decision-maker identified".to_string());
    }
    if !role_counts.contains_key(&Role::Champion) {
        notes.push("no champion identified".to_string());
    }
    if department_counts.len() == 1 && n > 1 {
        notes.push("all members come from a single department".to_string());
    }
    let unenriched = members.iter().filter(|m| !m.is_enriched()).count();
    if unenriched > 0 {
        notes.push(format!("{unenriched} member(s) without full profile data"));
    }

    let report = CohesionReport {
        score,
        level: level_for(score),
        role_balance: round_to(role_balance, 3),
        department_balance: round_to(department_balance, 3),
        seniority_spread: round_to(seniority_spread, 3),
        strategy: strategy_for(&role_counts),
        priority: priority_for(total_influence, mean_influence),
        role_counts,
        department_counts,
        notes,
    };

    info!(
        score = report.score,
        level = ?report.level,
        strategy = ?report.strategy,
        priority = ?report.priority,
        "cohesion evaluated"
    );
    report
}
