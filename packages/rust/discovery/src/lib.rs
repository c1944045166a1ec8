//! Preview candidate discovery.
//!
//! Pages through the candidate directory up to the derived page ceiling,
//! requesting pages concurrently in batches bounded by the capability's
//! limiter. Every page call is charged, failed ones included. Results are
//! merged in page order after each batch, deduplicated across pages, and
//! filtered before scoring.

mod filter;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use buyergroup_providers::{Capability, CandidateDirectory};
use buyergroup_shared::{
    BuyerGroupError, CallKind, Candidate, CandidateFilters, CandidatePage, CompanyRef, CostLedger,
    Result, RunFlag,
};

pub use filter::{CandidateFilter, Rejection};

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

/// Limits for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Page ceiling derived for this run.
    pub max_pages: u32,
    /// Pages requested per batch.
    pub concurrency: usize,
    /// Deadline for a single page call.
    pub page_timeout: Duration,
    /// Credits charged per page call.
    pub page_cost: u64,
}

/// Everything discovery produced, isolated from the run state until merged.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Deduplicated, filtered candidates in discovery order.
    pub candidates: Vec<Candidate>,
    pub pages_requested: u32,
    pub duplicates: usize,
    pub filtered_out: usize,
    pub costs: CostLedger,
    pub flags: Vec<RunFlag>,
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Run the discovery stage. Page failures are absorbed as flags.
#[instrument(skip_all, fields(company = %company.name, max_pages = opts.max_pages))]
pub async fn discover(
    directory: Arc<dyn CandidateDirectory>,
    cap: &Capability,
    company: &CompanyRef,
    filters: &CandidateFilters,
    opts: &DiscoveryOptions,
) -> DiscoveryOutcome {
    let mut outcome = DiscoveryOutcome::default();
    let mut seen = HashSet::new();
    let filter = CandidateFilter::new(filters);
    let batch_size = opts.concurrency.max(1) as u32;

    let mut next_page = 1u32;
    let mut exhausted_at: Option<u32> = None;

    while next_page <= opts.max_pages && exhausted_at.is_none() {
        let last = next_page
            .saturating_add(batch_size - 1)
            .min(opts.max_pages);

        let mut handles = Vec::new();
        for page in next_page..=last {
            let directory = directory.clone();
            let cap = cap.clone();
            let company = company.clone();
            let timeout = opts.page_timeout;

            handles.push((
                page,
                tokio::spawn(async move { fetch_page(directory, cap, company, page, timeout).await }),
            ));
        }
        outcome.pages_requested += last - next_page + 1;
        next_page = last + 1;

        // Merge in page order once the whole batch has landed.
        for (page, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(BuyerGroupError::Provider(format!("page {page} task failed: {e}"))),
            };
            outcome
                .costs
                .record(CallKind::DiscoveryPage, opts.page_cost, result.is_ok(), format!("page {page}"));

            match result {
                Ok(fetched) => {
                    debug!(page, candidates = fetched.candidates.len(), has_more = fetched.has_more, "page merged");
                    if !fetched.has_more && exhausted_at.is_none() {
                        exhausted_at = Some(page);
                    }
                    merge_page(&mut outcome, &mut seen, &filter, fetched.candidates);
                }
                Err(e) => {
                    warn!(page, error = %e, "discovery page failed");
                    outcome.flags.push(RunFlag::DiscoveryPageFailed {
                        page,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some(pages) = exhausted_at {
        outcome.flags.push(RunFlag::DiscoveryExhausted { pages });
    }

    info!(
        pages = outcome.pages_requested,
        candidates = outcome.candidates.len(),
        duplicates = outcome.duplicates,
        filtered_out = outcome.filtered_out,
        cost = outcome.costs.total(),
        "discovery completed"
    );

    outcome
}

async fn fetch_page(
    directory: Arc<dyn CandidateDirectory>,
    cap: Capability,
    company: CompanyRef,
    page: u32,
    timeout: Duration,
) -> Result<CandidatePage> {
    let _permit = cap.acquire().await?;
    match tokio::time::timeout(timeout, directory.list_candidates(&cap, &company, page)).await {
        Ok(result) => result,
        Err(_) => Err(BuyerGroupError::timeout(format!("discovery page {page}"), timeout)),
    }
}

fn merge_page(
    outcome: &mut DiscoveryOutcome,
    seen: &mut HashSet<buyergroup_shared::CandidateKey>,
    filter: &CandidateFilter<'_>,
    candidates: Vec<Candidate>,
) {
    for candidate in candidates {
        if !seen.insert(candidate.key()) {
            outcome.duplicates += 1;
            continue;
        }
        if let Err(reason) = filter.check(&candidate) {
            debug!(name = %candidate.name, ?reason, "candidate filtered");
            outcome.filtered_out += 1;
            continue;
        }
        outcome.candidates.push(candidate);
    }
}
