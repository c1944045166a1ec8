//! Cross-functional coverage backfill.
//!
//! Single greedy pass: for each unrepresented department, best candidate
//! first, either append (group has room) or swap out the weakest member of
//! the most over-represented department. Not globally optimal.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument, warn};

use buyergroup_shared::{BuyerGroup, Role, RoleAssignment, RunFlag};

use crate::selection::compare_by_influence;

/// Result of the coverage stage.
#[derive(Debug, Clone, Default)]
pub struct CoverageOutcome {
    pub group: BuyerGroup,
    /// Distinct departments required.
    pub threshold: usize,
    /// Distinct departments represented after backfill.
    pub departments: usize,
    pub flags: Vec<RunFlag>,
}

/// `ceil(len / 3)`, capped at the departments actually available.
pub fn diversity_threshold(group_len: usize, available_departments: usize) -> usize {
    group_len.div_ceil(3).min(available_departments)
}

/// Backfill unrepresented departments from the unselected pool.
#[instrument(skip_all, fields(group = group.len(), unselected = unselected.len(), max))]
pub fn ensure_coverage(mut group: BuyerGroup, unselected: &[RoleAssignment], max: usize) -> CoverageOutcome {
    let mut flags = Vec::new();

    let available: BTreeSet<String> = group
        .members()
        .iter()
        .chain(unselected)
        .map(|a| a.candidate().department_key())
        .collect();
    let threshold = diversity_threshold(group.len(), available.len());

    if group.is_empty() || group.department_counts().len() >= threshold {
        let departments = group.department_counts().len();
        return CoverageOutcome {
            group,
            threshold,
            departments,
            flags,
        };
    }

    // Best unselected candidate per unrepresented department.
    let represented = group.department_counts();
    let mut best: BTreeMap<String, &RoleAssignment> = BTreeMap::new();
    for a in unselected {
        let dept = a.candidate().department_key();
        if represented.contains_key(&dept) || group.contains(a.candidate()) {
            continue;
        }
        best.entry(dept)
            .and_modify(|current| {
                if compare_by_influence(a, current).is_lt() {
                    *current = a;
                }
            })
            .or_insert(a);
    }
    let mut queue: Vec<(String, &RoleAssignment)> = best.into_iter().collect();
    queue.sort_by(|a, b| compare_by_influence(a.1, b.1));

    for (department, candidate) in queue {
        if group.department_counts().len() >= threshold {
            break;
        }

        if group.len() < max {
            if group.push(candidate.clone()) {
                debug!(%department, added = %candidate.candidate().name, "appended for coverage");
                flags.push(RunFlag::CoverageBackfilled {
                    department,
                    added: candidate.candidate().name.clone(),
                    replaced: None,
                });
            }
            continue;
        }

        let Some(victim) = pick_victim(&group) else {
            debug!(%department, "no replaceable member, stopping backfill");
            break;
        };
        match group.replace(victim, candidate.clone()) {
            Ok(removed) => {
                debug!(
                    %department,
                    added = %candidate.candidate().name,
                    replaced = %removed.candidate().name,
                    "swapped for coverage"
                );
                flags.push(RunFlag::CoverageBackfilled {
                    department,
                    added: candidate.candidate().name.clone(),
                    replaced: Some(removed.candidate().name.clone()),
                });
            }
            Err(_) => continue,
        }
    }

    let departments = group.department_counts().len();
    if departments < threshold {
        warn!(departments, required = threshold, "coverage below diversity threshold");
        flags.push(RunFlag::CoverageShortfall {
            departments,
            required: threshold,
        });
    }

    info!(
        members = group.len(),
        departments,
        threshold,
        backfilled = flags
            .iter()
            .filter(|f| matches!(f, RunFlag::CoverageBackfilled { .. }))
            .count(),
        "coverage validated"
    );

    CoverageOutcome {
        group,
        threshold,
        departments,
        flags,
    }
}

/// Index of the member to swap out, or `None` if no swap keeps role minimums.
///
/// Departments are tried from most to least over-represented (count >= 2,
/// ties by first appearance). Within one, lowest influence goes first; a
/// member that is the last decision-maker or last champion is skipped.
fn pick_victim(group: &BuyerGroup) -> Option<usize> {
    let members = group.members();
    let counts = group.department_counts();

    let mut first_seen: Vec<String> = Vec::new();
    for m in members {
        let dept = m.candidate().department_key();
        if !first_seen.contains(&dept) {
            first_seen.push(dept);
        }
    }

    let mut departments: Vec<(usize, usize, String)> = first_seen
        .into_iter()
        .enumerate()
        .filter_map(|(pos, dept)| {
            let count = counts.get(&dept).copied().unwrap_or(0);
            (count >= 2).then_some((count, pos, dept))
        })
        .collect();
    departments.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let protected = |m: &RoleAssignment| {
        matches!(m.role, Role::Decision | Role::Champion) && group.count_role(m.role) <= 1
    };

    for (_, _, dept) in departments {
        let mut in_dept: Vec<usize> = (0..members.len())
            .filter(|&i| members[i].candidate().department_key() == dept)
            .collect();
        // Lowest influence first; later group position first on ties.
        in_dept.sort_by(|&a, &b| {
            members[a]
                .influence()
                .total_cmp(&members[b].influence())
                .then_with(|| b.cmp(&a))
        });
        if let Some(i) = in_dept.into_iter().find(|&i| !protected(&members[i])) {
            return Some(i);
        }
    }
    None
}
