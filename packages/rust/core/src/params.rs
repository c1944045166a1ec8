//! Search-depth and group-size derivation.
//!
//! Pure functions of company facts, deal band, and sizing bounds.

use buyergroup_shared::{CompanyFacts, DealBand, DealContext, DerivedParameters, GroupSizing};

/// Pages requested when the employee count is unknown.
const UNKNOWN_SIZE_PAGES: u32 = 2;

/// Companies below this headcount never get more than `ideal` members.
const SMALL_COMPANY_EMPLOYEES: u64 = 50;

/// Derive discovery depth and target size for a run.
pub fn derive_parameters(
    facts: &CompanyFacts,
    deal: &DealContext,
    page_ceiling: u32,
) -> DerivedParameters {
    let band = deal.band();
    DerivedParameters {
        band,
        max_pages: max_pages(facts.employee_count, band, page_ceiling),
        target_size: target_size(facts.employee_count, band, &deal.sizing),
    }
}

/// Base pages scale with headcount; larger deals buy deeper search.
pub fn max_pages(employee_count: Option<u64>, band: DealBand, page_ceiling: u32) -> u32 {
    let base: u32 = match employee_count {
        None => UNKNOWN_SIZE_PAGES,
        Some(n) if n < 50 => 1,
        Some(n) if n < 200 => 2,
        Some(n) if n < 1_000 => 3,
        Some(n) if n < 5_000 => 5,
        Some(n) if n < 10_000 => 7,
        Some(_) => 10,
    };

    let adjusted = match band {
        DealBand::Small => base.saturating_sub(1).max(1),
        DealBand::MidMarket => base,
        DealBand::Large => base + 2,
        DealBand::Enterprise => base + 4,
    };

    adjusted.clamp(1, page_ceiling.max(1))
}

/// Target group size, biased toward `ideal` and pulled toward the bounds by band.
pub fn target_size(employee_count: Option<u64>, band: DealBand, sizing: &GroupSizing) -> usize {
    let GroupSizing { min, max, ideal } = *sizing;
    let target = match band {
        DealBand::Small => (min + ideal) / 2,
        DealBand::MidMarket => ideal,
        DealBand::Large => (ideal + max).div_ceil(2),
        DealBand::Enterprise => max,
    };

    let target = match employee_count {
        Some(n) if n < SMALL_COMPANY_EMPLOYEES => target.min(ideal),
        _ => target,
    };

    target.clamp(min, max)
}
