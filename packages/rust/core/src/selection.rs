//! Role-quota group selection.
//!
//! Slots are apportioned by largest remainder over the role weights after
//! guaranteeing one decision-maker and one champion. Slots a role cannot
//! fill flow to the highest-weighted role that still has candidates.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use buyergroup_shared::{BuyerGroup, GroupSizing, Role, RoleAssignment, RolePriorities, RunFlag};

/// Absorbs float error when splitting slots by weight.
const QUOTA_EPSILON: f64 = 1e-9;

/// Result of the selection stage.
#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub group: BuyerGroup,
    /// Assignments not selected, best first.
    pub unselected: Vec<RoleAssignment>,
    /// Slots granted per role.
    pub allocation: BTreeMap<Role, usize>,
    pub under_filled: bool,
    pub flags: Vec<RunFlag>,
}

/// Influence desc, relevance desc, discovery order.
pub fn compare_by_influence(a: &RoleAssignment, b: &RoleAssignment) -> Ordering {
    b.scored
        .influence
        .total_cmp(&a.scored.influence)
        .then_with(|| b.scored.relevance.total_cmp(&a.scored.relevance))
        .then_with(|| a.scored.discovery_index.cmp(&b.scored.discovery_index))
}

/// Select the buyer group from classified candidates.
#[instrument(skip_all, fields(pool = assignments.len(), target_size = target))]
pub fn select_group(
    assignments: Vec<RoleAssignment>,
    target: usize,
    sizing: &GroupSizing,
    priorities: &RolePriorities,
) -> SelectionOutcome {
    let mut pools: BTreeMap<Role, Vec<RoleAssignment>> = BTreeMap::new();
    for a in assignments {
        pools.entry(a.role).or_default().push(a);
    }
    for pool in pools.values_mut() {
        pool.sort_by(compare_by_influence);
    }

    let available: BTreeMap<Role, usize> = Role::ALL
        .iter()
        .map(|r| (*r, pools.get(r).map_or(0, Vec::len)))
        .collect();
    let pool_size: usize = available.values().sum();
    let size = target.min(sizing.max).min(pool_size);

    let mut flags = Vec::new();
    let under_filled = pool_size < sizing.min;
    if under_filled {
        warn!(pool = pool_size, min = sizing.min, "candidate pool smaller than minimum group size");
        flags.push(RunFlag::UnderFilled {
            selected: size,
            min: sizing.min,
        });
    }

    let allocation = allocate(size, &available, priorities);

    let mut group = BuyerGroup::new();
    let mut unselected = Vec::new();
    for role in Role::ALL {
        let quota = allocation.get(&role).copied().unwrap_or(0);
        let Some(pool) = pools.remove(&role) else {
            continue;
        };
        for (i, a) in pool.into_iter().enumerate() {
            if i < quota && group.push(a.clone()) {
                continue;
            }
            unselected.push(a);
        }
    }
    unselected.sort_by(compare_by_influence);

    info!(
        selected = group.len(),
        unselected = unselected.len(),
        under_filled,
        "group selected"
    );

    SelectionOutcome {
        group,
        unselected,
        allocation,
        under_filled,
        flags,
    }
}

/// Apportion `size` slots across roles, bounded by each role's availability.
pub fn allocate(
    size: usize,
    available: &BTreeMap<Role, usize>,
    priorities: &RolePriorities,
) -> BTreeMap<Role, usize> {
    let capacity = |r: Role| available.get(&r).copied().unwrap_or(0);
    let mut quota: BTreeMap<Role, usize> = Role::ALL.iter().map(|r| (*r, 0)).collect();
    let mut remaining = size;

    // Guaranteed slots.
    for (role, min_size) in [(Role::Decision, 1), (Role::Champion, 2)] {
        if remaining > 0 && size >= min_size && capacity(role) > 0 {
            *quota.entry(role).or_default() += 1;
            remaining -= 1;
        }
    }

    // Largest remainder over weighted roles that have candidates.
    let weighted: Vec<(Role, f64)> = Role::ALL
        .iter()
        .map(|r| (*r, priorities.weight(*r)))
        .filter(|(r, w)| *w > 0.0 && capacity(*r) > 0)
        .collect();
    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();

    let mut overflow = 0;
    if remaining > 0 && total_weight > 0.0 {
        let mut fractions = Vec::with_capacity(weighted.len());
        let mut granted = 0;
        for (i, (role, weight)) in weighted.iter().enumerate() {
            let exact = remaining as f64 * weight / total_weight;
            let whole = (exact + QUOTA_EPSILON).floor() as usize;
            *quota.entry(*role).or_default() += whole;
            granted += whole;
            fractions.push((i, *role, (exact - whole as f64).max(0.0)));
        }
        // Ties on the fractional part keep fixed role order.
        fractions.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        let leftover = remaining.saturating_sub(granted);
        for (_, role, _) in fractions.iter().take(leftover) {
            *quota.entry(*role).or_default() += 1;
        }
    } else {
        overflow = remaining;
    }

    // Redistribute overflow to the highest-weighted role with spare candidates.
    for role in Role::ALL {
        let q = quota.entry(role).or_default();
        let cap = capacity(role);
        if *q > cap {
            overflow += *q - cap;
            *q = cap;
        }
    }
    while overflow > 0 {
        let next = Role::ALL
            .iter()
            .filter(|r| quota.get(r).copied().unwrap_or(0) < capacity(**r))
            .copied()
            .fold(None::<Role>, |best, r| match best {
                Some(b) if priorities.weight(b) >= priorities.weight(r) => Some(b),
                _ => Some(r),
            });
        let Some(role) = next else {
            break;
        };
        let q = quota.entry(role).or_default();
        let take = (capacity(role) - *q).min(overflow);
        *q += take;
        overflow -= take;
    }

    quota.retain(|_, q| *q > 0);
    quota
}
