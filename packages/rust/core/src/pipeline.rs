//! End-to-end buyer-group pipeline:
//! CONTEXT → DISCOVERY → SCORING → ROLE_ASSIGNMENT → GROUP_SELECTION →
//! COVERAGE_VALIDATION → PROFILE_COLLECTION → COHESION_VALIDATION → REPORT_READY.
//!
//! Each stage consumes the previous stage's output. Stages that call
//! collaborators keep their own cost ledger and flags, which the run absorbs
//! once the stage's units have all landed.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use buyergroup_discovery::{DiscoveryOptions, discover};
use buyergroup_providers::{Capability, Collaborators};
use buyergroup_shared::{
    BuyerGroupError, CallKind, CompanyFacts, CostLedger, DealContext, FailureCause,
    PartialResults, PipelineFailure, PipelineReport, PipelineRun, PipelineSettings, Result,
    RunFlag, RunStatus, Stage,
};

use crate::cohesion;
use crate::coverage::ensure_coverage;
use crate::enrichment::{CollectionOptions, CollectionProgress, collect_profiles};
use crate::params::derive_parameters;
use crate::presets::resolve_keywords;
use crate::roles::assign_roles;
use crate::scoring::{FloorOptions, score_candidates};
use crate::selection::select_group;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, stage: Stage);
    /// Called per unit of work inside a stage (pages, profiles).
    fn unit(&self, stage: Stage, current: usize, total: usize, detail: &str);
    /// Called when the run completes successfully.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn unit(&self, _stage: Stage, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _report: &PipelineReport) {}
}

/// Buyer-group pipeline bound to its collaborators and settings.
#[derive(Debug, Clone)]
pub struct Pipeline {
    collaborators: Collaborators,
    capability: Capability,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, capability: Capability, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            capability,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the pipeline without progress reporting.
    pub async fn run(
        &self,
        identifier: &str,
        deal: &DealContext,
    ) -> std::result::Result<PipelineReport, PipelineFailure> {
        self.run_with_progress(identifier, deal, &SilentProgress).await
    }

    /// Run the full pipeline for one company.
    #[instrument(skip_all, fields(identifier = %identifier.trim(), deal_size = deal.deal_size))]
    pub async fn run_with_progress(
        &self,
        identifier: &str,
        deal: &DealContext,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<PipelineReport, PipelineFailure> {
        let identifier = identifier.trim();
        let mut run = PipelineRun::start(identifier);
        info!(run_id = %run.run_id, "starting buyer-group run");

        // --- CONTEXT ---
        progress.stage(Stage::Context);
        let clock = Instant::now();
        if let Err(e) = self.validate_inputs(identifier, deal) {
            return Err(fail(run, FailureCause::Stage(e), clock, PartialResults::default()));
        }
        let (facts, degraded) = self.resolve_context(&mut run, identifier).await;
        let params = derive_parameters(&facts, deal, self.settings.page_ceiling);
        let keywords = resolve_keywords(deal);
        info!(
            company = %facts.name,
            degraded,
            band = %params.band,
            max_pages = params.max_pages,
            target_size = params.target_size,
            preset = keywords.preset.unwrap_or("none"),
            "context resolved"
        );
        let mut run = run.advance(clock.elapsed());

        // --- DISCOVERY ---
        progress.stage(Stage::Discovery);
        let clock = Instant::now();
        let opts = DiscoveryOptions {
            max_pages: params.max_pages,
            concurrency: self.settings.concurrency,
            page_timeout: self.settings.page_timeout,
            page_cost: self.settings.costs.discovery_page,
        };
        let discovered = discover(
            self.collaborators.directory.clone(),
            &self.capability,
            &facts.company_ref(),
            &deal.filters,
            &opts,
        )
        .await;
        run.absorb(&discovered.costs, discovered.flags);
        let pages = discovered.pages_requested as usize;
        progress.unit(
            Stage::Discovery,
            pages,
            params.max_pages as usize,
            &format!("{} candidates", discovered.candidates.len()),
        );
        let candidates = discovered.candidates;
        let mut run = run.advance(clock.elapsed());

        // --- SCORING ---
        progress.stage(Stage::Scoring);
        let clock = Instant::now();
        let floors = FloorOptions {
            relevance_floor: self.settings.relevance_floor,
            influence_floor: self.settings.influence_floor,
            relaxation_factor: self.settings.floor_relaxation_factor,
            min_survivors: deal.sizing.min,
        };
        let scoring = score_candidates(&candidates, &keywords, deal, &floors);
        run.flags.extend(scoring.flags);
        if scoring.ranked.is_empty() {
            let cause = FailureCause::EmptyGroup {
                discovered: candidates.len(),
                scored: scoring.scored,
            };
            let partial = PartialResults {
                facts: Some(facts),
                candidates,
                scored: scoring.below_floor,
            };
            return Err(fail(run, cause, clock, partial));
        }
        let ranked = scoring.ranked;
        let run = run.advance(clock.elapsed());

        // --- ROLE_ASSIGNMENT ---
        progress.stage(Stage::RoleAssignment);
        let clock = Instant::now();
        let assignments = assign_roles(ranked, &keywords, params.band);
        let mut run = run.advance(clock.elapsed());

        // --- GROUP_SELECTION ---
        progress.stage(Stage::GroupSelection);
        let clock = Instant::now();
        let selection = select_group(
            assignments,
            params.target_size,
            &deal.sizing,
            &deal.role_priorities,
        );
        let under_filled = selection.under_filled;
        run.flags.extend(selection.flags);
        let mut run = run.advance(clock.elapsed());

        // --- COVERAGE_VALIDATION ---
        progress.stage(Stage::CoverageValidation);
        let clock = Instant::now();
        let coverage = ensure_coverage(selection.group, &selection.unselected, deal.sizing.max);
        run.flags.extend(coverage.flags);
        let group = coverage.group.freeze();
        let mut run = run.advance(clock.elapsed());

        // --- PROFILE_COLLECTION ---
        progress.stage(Stage::ProfileCollection);
        let clock = Instant::now();
        let collection_opts = CollectionOptions {
            timeout: self.settings.enrich_timeout,
            cost: self.settings.costs.profile_enrichment,
        };
        let collection = collect_profiles(
            self.collaborators.enricher.clone(),
            &self.capability,
            &group,
            &collection_opts,
            &StageProgress { inner: progress },
        )
        .await;
        run.absorb(&collection.costs, collection.flags);
        let members = collection.members;
        let run = run.advance(clock.elapsed());

        // --- COHESION_VALIDATION ---
        progress.stage(Stage::CohesionValidation);
        let clock = Instant::now();
        let cohesion = cohesion::evaluate(&members, &deal.cohesion_weights);
        let run = run.advance(clock.elapsed());

        // --- REPORT_READY ---
        progress.stage(Stage::ReportReady);
        let clock = Instant::now();
        let mut run = run.advance(clock.elapsed());
        run.status = RunStatus::Completed;

        let report = PipelineReport {
            run_id: run.run_id,
            identifier: run.identifier,
            status: run.status,
            stage: run.stage,
            buyer_group: members,
            cohesion,
            costs: run.ledger,
            intelligence: facts,
            degraded_context: degraded,
            under_filled,
            parameters: params,
            flags: run.flags,
            timings: run.timings,
            started_at: run.started_at,
            finished_at: Utc::now(),
        };

        progress.done(&report);
        info!(
            run_id = %report.run_id,
            members = report.buyer_group.len(),
            cohesion = report.cohesion.score,
            cost = report.costs.total(),
            flags = report.flags.len(),
            "buyer-group run complete"
        );

        Ok(report)
    }

    fn validate_inputs(&self, identifier: &str, deal: &DealContext) -> Result<()> {
        if identifier.is_empty() {
            return Err(BuyerGroupError::validation("company identifier must not be empty"));
        }
        deal.validate()?;
        self.settings.validate()
    }

    /// Resolve company facts. Not-found, errors, and timeouts all degrade to
    /// identifier-only facts; only the flag differs. The lookup is charged
    /// only once it has been dispatched to the resolver.
    async fn resolve_context(&self, run: &mut PipelineRun, identifier: &str) -> (CompanyFacts, bool) {
        let mut ledger = CostLedger::new();
        let result = match self.capability.acquire().await {
            Ok(_permit) => {
                let result = self.resolve_once(identifier).await;
                ledger.record(
                    CallKind::ContextResolution,
                    self.settings.costs.context_resolution,
                    result.is_ok(),
                    identifier,
                );
                result
            }
            Err(e) => Err(e),
        };

        let (facts, flag) = match result {
            Ok(Some(facts)) => (facts, None),
            Ok(None) => {
                warn!(identifier, "company not found, continuing degraded");
                let flag = RunFlag::ContextNotFound {
                    identifier: identifier.to_string(),
                };
                (CompanyFacts::degraded(identifier), Some(flag))
            }
            Err(e) => {
                warn!(identifier, error = %e, "company lookup failed, continuing degraded");
                let flag = RunFlag::ContextUnavailable {
                    identifier: identifier.to_string(),
                    reason: e.to_string(),
                };
                (CompanyFacts::degraded(identifier), Some(flag))
            }
        };
        let degraded = flag.is_some();
        run.absorb(&ledger, flag.into_iter().collect());
        (facts, degraded)
    }

    async fn resolve_once(&self, identifier: &str) -> Result<Option<CompanyFacts>> {
        let timeout = self.settings.resolve_timeout;
        match tokio::time::timeout(
            timeout,
            self.collaborators.resolver.resolve(&self.capability, identifier),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BuyerGroupError::timeout(format!("resolve {identifier}"), timeout)),
        }
    }
}

fn fail(run: PipelineRun, cause: FailureCause, clock: Instant, partial: PartialResults) -> PipelineFailure {
    let elapsed: Duration = clock.elapsed();
    error!(run_id = %run.run_id, stage = %run.stage, cause = %cause, "pipeline failed");
    run.fail(cause, elapsed, partial)
}

// ---------------------------------------------------------------------------
// Collection progress adapter
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the `CollectionProgress` interface.
struct StageProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl CollectionProgress for StageProgress<'_> {
    fn member_collected(&self, current: usize, total: usize, name: &str) {
        self.inner.unit(Stage::ProfileCollection, current, total, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use buyergroup_providers::{Fixture, FixtureProvider};
    use buyergroup_shared::Candidate;

    fn pipeline(fixture: Fixture) -> (Arc<FixtureProvider>, Pipeline) {
        let provider = Arc::new(FixtureProvider::new(fixture));
        let pipeline = Pipeline::new(
            Collaborators::from_provider(provider.clone()),
            Capability::anonymous(4),
            PipelineSettings::default(),
        );
        (provider, pipeline)
    }

    fn small_company() -> Fixture {
        Fixture {
            company: Some(CompanyFacts {
                employee_count: Some(120),
                ..CompanyFacts::degraded("Acme")
            }),
            candidates: vec![
                Candidate::new("Ava", "VP Sales", "Sales"),
                Candidate::new("Bo", "Sales Manager", "Sales"),
                Candidate::new("Cy", "Account Executive", "Sales"),
                Candidate::new("Di", "Procurement Lead", "Finance"),
            ],
            ..Fixture::default()
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Stage>>);

    impl ProgressReporter for Recorder {
        fn stage(&self, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
        fn unit(&self, _stage: Stage, _current: usize, _total: usize, _detail: &str) {}
        fn done(&self, _report: &PipelineReport) {}
    }

    #[tokio::test]
    async fn stages_run_in_order() {
        let (_, pipeline) = pipeline(small_company());
        let recorder = Recorder::default();
        let report = pipeline
            .run_with_progress("acme.io", &DealContext::new(50_000.0, "sales engagement"), &recorder)
            .await
            .unwrap();

        assert_eq!(*recorder.0.lock().unwrap(), Stage::ORDER.to_vec());
        let timed: Vec<_> = report.timings.iter().map(|t| t.stage).collect();
        assert_eq!(timed, Stage::ORDER.to_vec());
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.stage, Stage::ReportReady);
    }

    #[tokio::test]
    async fn empty_identifier_fails_at_context() {
        let (provider, pipeline) = pipeline(small_company());
        let err = pipeline
            .run("   ", &DealContext::new(50_000.0, "sales"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Context);
        assert_eq!(err.last_completed, None);
        assert_eq!(provider.resolve_calls(), 0);
        assert!(err.costs.is_empty());
    }

    #[tokio::test]
    async fn closed_limiter_skips_context_charge() {
        let provider = Arc::new(FixtureProvider::new(small_company()));
        let capability = Capability::anonymous(4);
        capability.close();
        let pipeline = Pipeline::new(
            Collaborators::from_provider(provider.clone()),
            capability,
            PipelineSettings::default(),
        );

        let err = pipeline
            .run("acme.io", &DealContext::new(50_000.0, "sales"))
            .await
            .unwrap_err();
        assert_eq!(provider.resolve_calls(), 0);
        assert_eq!(err.costs.calls(CallKind::ContextResolution), 0);
        assert!(
            err.flags
                .iter()
                .any(|f| matches!(f, RunFlag::ContextUnavailable { .. }))
        );
    }

    #[tokio::test]
    async fn invalid_deal_fails_at_context() {
        let (_, pipeline) = pipeline(small_company());
        let mut deal = DealContext::new(50_000.0, "sales");
        deal.sizing.max = 0;
        let err = pipeline.run("acme.io", &deal).await.unwrap_err();
        assert_eq!(err.stage, Stage::Context);
        assert_eq!(err.cause.kind(), "stage_failure");
    }

    #[tokio::test]
    async fn resolver_failure_degrades() {
        let mut fixture = small_company();
        fixture.failures.resolve = true;
        let (_, pipeline) = pipeline(fixture);
        let report = pipeline
            .run("acme.io", &DealContext::new(50_000.0, "sales"))
            .await
            .unwrap();
        assert!(report.degraded_context);
        assert_eq!(report.intelligence.name, "acme.io");
        assert!(
            report
                .flags
                .iter()
                .any(|f| matches!(f, RunFlag::ContextUnavailable { .. }))
        );
    }

    #[tokio::test]
    async fn slow_resolver_times_out_and_degrades() {
        let provider = Arc::new(FixtureProvider::new(small_company()).with_latency(Duration::from_millis(200)));
        let settings = PipelineSettings {
            resolve_timeout: Duration::from_millis(10),
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(
            Collaborators::from_provider(provider),
            Capability::anonymous(4),
            settings,
        );
        let report = pipeline
            .run("acme.io", &DealContext::new(50_000.0, "sales"))
            .await
            .unwrap();
        assert!(report.degraded_context);
        assert_eq!(report.costs.calls(CallKind::ContextResolution), 1);
    }
}
