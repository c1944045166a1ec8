//! Profile collection for the finalized buyer group.
//!
//! Exactly one enrichment call per member, fanned out as spawned tasks and
//! bounded by the capability's limiter. Every call is charged whether it
//! succeeds, fails or times out. A failed member stays in the group with
//! preview data only.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use buyergroup_providers::{Capability, ProfileEnricher, profile_key};
use buyergroup_shared::{
    BuyerGroupError, CallKind, Candidate, CostLedger, EnrichedMember, EnrichmentStatus,
    FrozenGroup, FullProfile, Result, RunFlag,
};

/// Limits for one collection pass.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Deadline for a single enrichment call.
    pub timeout: Duration,
    /// Credits charged per call.
    pub cost: u64,
}

/// Enriched members plus what the pass cost.
#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    /// Members in group order, ranks 1-based.
    pub members: Vec<EnrichedMember>,
    pub costs: CostLedger,
    pub flags: Vec<RunFlag>,
}

impl CollectionOutcome {
    pub fn failed(&self) -> usize {
        self.members.iter().filter(|m| !m.is_enriched()).count()
    }
}

/// Progress callback for per-member collection.
pub trait CollectionProgress: Send + Sync {
    fn member_collected(&self, current: usize, total: usize, name: &str);
}

/// No-op progress for headless usage.
pub struct NoCollectionProgress;

impl CollectionProgress for NoCollectionProgress {
    fn member_collected(&self, _current: usize, _total: usize, _name: &str) {}
}

/// Enrich every member of the frozen group.
#[instrument(skip_all, fields(members = group.len()))]
pub async fn collect_profiles(
    enricher: Arc<dyn ProfileEnricher>,
    cap: &Capability,
    group: &FrozenGroup,
    opts: &CollectionOptions,
    progress: &dyn CollectionProgress,
) -> CollectionOutcome {
    let mut outcome = CollectionOutcome::default();
    let total = group.len();

    let handles: Vec<_> = group
        .members()
        .iter()
        .map(|assignment| {
            let enricher = enricher.clone();
            let cap = cap.clone();
            let candidate = assignment.candidate().clone();
            let timeout = opts.timeout;
            tokio::spawn(async move { fetch_profile(enricher, cap, candidate, timeout).await })
        })
        .collect();

    // Merge in group order.
    for (i, (assignment, handle)) in group.members().iter().zip(handles).enumerate() {
        let key = profile_key(assignment.candidate());
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(BuyerGroupError::Provider(format!("enrichment task for {key} failed: {e}"))),
        };
        outcome
            .costs
            .record(CallKind::ProfileEnrichment, opts.cost, result.is_ok(), key.clone());

        let (profile, enrichment) = match result {
            Ok(profile) => {
                debug!(member = %key, "profile collected");
                (Some(profile), EnrichmentStatus::Enriched)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(member = %key, error = %reason, "profile enrichment failed, keeping preview data");
                outcome.flags.push(RunFlag::EnrichmentPartialFailure {
                    member: key,
                    reason: reason.clone(),
                });
                (None, EnrichmentStatus::Failed { reason })
            }
        };

        progress.member_collected(i + 1, total, &assignment.candidate().name);
        outcome.members.push(EnrichedMember {
            rank: i + 1,
            assignment: assignment.clone(),
            profile,
            enrichment,
        });
    }

    info!(
        members = outcome.members.len(),
        failed = outcome.failed(),
        cost = outcome.costs.total(),
        "profile collection completed"
    );

    outcome
}

async fn fetch_profile(
    enricher: Arc<dyn ProfileEnricher>,
    cap: Capability,
    candidate: Candidate,
    timeout: Duration,
) -> Result<FullProfile> {
    let _permit = cap.acquire().await?;
    match tokio::time::timeout(timeout, enricher.enrich(&cap, &candidate)).await {
        Ok(result) => result,
        Err(_) => Err(BuyerGroupError::timeout(
            format!("profile enrichment for {}", candidate.name),
            timeout,
        )),
    }
}
