//! Pipeline run state: stages, cost ledger, flags, and terminal outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BuyerGroupError;
use crate::types::{
    Candidate, CohesionReport, CompanyFacts, DealBand, EnrichedMember, ScoredCandidate,
};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stages, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Context,
    Discovery,
    Scoring,
    RoleAssignment,
    GroupSelection,
    CoverageValidation,
    ProfileCollection,
    CohesionValidation,
    ReportReady,
}

impl Stage {
    pub const ORDER: [Stage; 9] = [
        Stage::Context,
        Stage::Discovery,
        Stage::Scoring,
        Stage::RoleAssignment,
        Stage::GroupSelection,
        Stage::CoverageValidation,
        Stage::ProfileCollection,
        Stage::CohesionValidation,
        Stage::ReportReady,
    ];

    /// The stage after this one, or `None` after `ReportReady`.
    pub fn next(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }

    /// The stage before this one, or `None` for `Context`.
    pub fn previous(self) -> Option<Stage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        idx.checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "CONTEXT",
            Self::Discovery => "DISCOVERY",
            Self::Scoring => "SCORING",
            Self::RoleAssignment => "ROLE_ASSIGNMENT",
            Self::GroupSelection => "GROUP_SELECTION",
            Self::CoverageValidation => "COVERAGE_VALIDATION",
            Self::ProfileCollection => "PROFILE_COLLECTION",
            Self::CohesionValidation => "COHESION_VALIDATION",
            Self::ReportReady => "REPORT_READY",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall run status. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Cost ledger
// ---------------------------------------------------------------------------

/// Kind of paid external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ContextResolution,
    DiscoveryPage,
    ProfileEnrichment,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextResolution => "context_resolution",
            Self::DiscoveryPage => "discovery_page",
            Self::ProfileEnrichment => "profile_enrichment",
        }
    }
}

/// One external call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// 0-based position in the ledger.
    pub seq: usize,
    pub kind: CallKind,
    /// Cost in provider credits.
    pub units: u64,
    pub succeeded: bool,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Additive record of every external call made during a run.
///
/// Entries can only be appended, so the total never decreases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    entries: Vec<CostEntry>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call record.
    pub fn record(&mut self, kind: CallKind, units: u64, succeeded: bool, detail: impl Into<String>) {
        let seq = self.entries.len();
        self.entries.push(CostEntry {
            seq,
            kind,
            units,
            succeeded,
            detail: detail.into(),
            at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Sum of all units charged.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.units).sum()
    }

    pub fn total_for(&self, kind: CallKind) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.units)
            .sum()
    }

    /// Number of calls of `kind`, including failed ones.
    pub fn calls(&self, kind: CallKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Flags and timings
// ---------------------------------------------------------------------------

/// Non-fatal conditions absorbed by the stage that detected them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum RunFlag {
    /// The resolver found no company; the run continues with the identifier only.
    ContextNotFound { identifier: String },
    /// The resolver failed or timed out; treated like not-found.
    ContextUnavailable { identifier: String, reason: String },
    /// The directory reported no further pages.
    DiscoveryExhausted { pages: u32 },
    /// A single page request failed; other pages were kept.
    DiscoveryPageFailed { page: u32, reason: String },
    /// Fewer than `min` candidates cleared the scoring floor.
    NoCandidatesAboveFloor { survivors: usize, required: usize },
    /// The floor was relaxed for the listed departments.
    FloorRelaxed { departments: Vec<String>, readmitted: usize },
    /// The candidate pool could not fill the minimum group size.
    UnderFilled { selected: usize, min: usize },
    /// Coverage backfill added a department.
    CoverageBackfilled {
        department: String,
        added: String,
        replaced: Option<String>,
    },
    /// Department diversity stayed under the threshold after backfill.
    CoverageShortfall { departments: usize, required: usize },
    /// A member kept preview data only.
    EnrichmentPartialFailure { member: String, reason: String },
}

impl std::fmt::Display for RunFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextNotFound { identifier } => {
                write!(f, "company '{identifier}' not found; continuing with identifier only")
            }
            Self::ContextUnavailable { identifier, reason } => {
                write!(f, "company lookup for '{identifier}' unavailable ({reason})")
            }
            Self::DiscoveryExhausted { pages } => {
                write!(f, "candidate directory exhausted after page {pages}")
            }
            Self::DiscoveryPageFailed { page, reason } => write!(f, "page {page} failed: {reason}"),
            Self::NoCandidatesAboveFloor { survivors, required } => {
                write!(f, "{survivors} candidates above floor, {required} required")
            }
            Self::FloorRelaxed { departments, readmitted } => write!(
                f,
                "floor relaxed for {}; {readmitted} readmitted",
                departments.join(", ")
            ),
            Self::UnderFilled { selected, min } => {
                write!(f, "group under-filled: {selected} selected, minimum {min}")
            }
            Self::CoverageBackfilled {
                department,
                added,
                replaced: Some(replaced),
            } => write!(f, "{added} replaced {replaced} to cover {department}"),
            Self::CoverageBackfilled { department, added, .. } => {
                write!(f, "{added} added to cover {department}")
            }
            Self::CoverageShortfall { departments, required } => {
                write!(f, "{departments} departments represented, {required} wanted")
            }
            Self::EnrichmentPartialFailure { member, reason } => {
                write!(f, "profile for {member} unavailable: {reason}")
            }
        }
    }
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// Search parameters derived from company facts and deal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedParameters {
    pub band: DealBand,
    pub max_pages: u32,
    pub target_size: usize,
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// Orchestration state threaded through the stages.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub identifier: String,
    pub started_at: DateTime<Utc>,
    pub stage: Stage,
    pub last_completed: Option<Stage>,
    pub status: RunStatus,
    pub ledger: CostLedger,
    pub flags: Vec<RunFlag>,
    pub timings: Vec<StageTiming>,
}

impl PipelineRun {
    pub fn start(identifier: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            identifier: identifier.into(),
            started_at: Utc::now(),
            stage: Stage::Context,
            last_completed: None,
            status: RunStatus::Running,
            ledger: CostLedger::new(),
            flags: Vec::new(),
            timings: Vec::new(),
        }
    }

    /// Record the current stage as completed and move to the next one.
    pub fn advance(mut self, elapsed: std::time::Duration) -> Self {
        self.timings.push(StageTiming {
            stage: self.stage,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        self.last_completed = Some(self.stage);
        if let Some(next) = self.stage.next() {
            self.stage = next;
        }
        self
    }

    /// Merge a stage's isolated cost entries and flags into the run.
    pub fn absorb(&mut self, costs: &CostLedger, flags: Vec<RunFlag>) {
        for entry in costs.entries() {
            self.ledger
                .record(entry.kind, entry.units, entry.succeeded, entry.detail.clone());
        }
        self.flags.extend(flags);
    }

    pub fn flag(&mut self, flag: RunFlag) {
        self.flags.push(flag);
    }

    /// Terminate with a fatal failure in the current stage.
    pub fn fail(
        mut self,
        cause: FailureCause,
        elapsed: std::time::Duration,
        partial: PartialResults,
    ) -> PipelineFailure {
        self.status = RunStatus::Failed;
        self.timings.push(StageTiming {
            stage: self.stage,
            elapsed_ms: elapsed.as_millis() as u64,
        });
        PipelineFailure {
            run_id: self.run_id,
            identifier: self.identifier,
            stage: self.stage,
            last_completed: self.last_completed,
            cause,
            elapsed_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
            costs: self.ledger,
            flags: self.flags,
            timings: self.timings,
            partial,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Successful pipeline output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub identifier: String,
    pub status: RunStatus,
    pub stage: Stage,
    pub buyer_group: Vec<EnrichedMember>,
    pub cohesion: CohesionReport,
    pub costs: CostLedger,
    pub intelligence: CompanyFacts,
    /// True when the resolver could not supply company facts.
    pub degraded_context: bool,
    /// True when the pool was smaller than `sizing.min`.
    pub under_filled: bool,
    pub parameters: DerivedParameters,
    pub flags: Vec<RunFlag>,
    pub timings: Vec<StageTiming>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Why a run failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    /// No candidate survived scoring, even after floor relaxation.
    #[error("empty group: {discovered} candidates discovered, none survived scoring")]
    EmptyGroup { discovered: usize, scored: usize },

    /// A stage returned an error.
    #[error(transparent)]
    Stage(#[from] BuyerGroupError),
}

impl FailureCause {
    /// Short machine-readable kind, used by persistence and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyGroup { .. } => "empty_group",
            Self::Stage(_) => "stage_failure",
        }
    }
}

/// Artifacts produced before the failing stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<CompanyFacts>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Scored candidates that never cleared the floor.
    #[serde(default)]
    pub scored: Vec<ScoredCandidate>,
}

/// Fatal pipeline outcome carrying everything accounted so far.
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed at {stage}: {cause}")]
pub struct PipelineFailure {
    pub run_id: RunId,
    pub identifier: String,
    pub stage: Stage,
    pub last_completed: Option<Stage>,
    #[source]
    pub cause: FailureCause,
    pub elapsed_ms: u64,
    pub costs: CostLedger,
    pub flags: Vec<RunFlag>,
    pub timings: Vec<StageTiming>,
    pub partial: PartialResults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(Stage::Context.next(), Some(Stage::Discovery));
        assert_eq!(Stage::CohesionValidation.next(), Some(Stage::ReportReady));
        assert_eq!(Stage::ReportReady.next(), None);
        assert_eq!(Stage::Context.previous(), None);
        assert_eq!(Stage::Scoring.previous(), Some(Stage::Discovery));
        assert_eq!(Stage::RoleAssignment.to_string(), "ROLE_ASSIGNMENT");
    }

    #[test]
    fn ledger_is_additive() {
        let mut ledger = CostLedger::new();
        ledger.record(CallKind::DiscoveryPage, 1, true, "page 1");
        ledger.record(CallKind::DiscoveryPage, 1, false, "page 2");
        ledger.record(CallKind::ProfileEnrichment, 10, true, "jane");
        assert_eq!(ledger.total(), 12);
        assert_eq!(ledger.total_for(CallKind::DiscoveryPage), 2);
        assert_eq!(ledger.calls(CallKind::ProfileEnrichment), 1);
        assert_eq!(ledger.entries()[2].seq, 2);
    }

    #[test]
    fn run_advances_and_absorbs() {
        let run = PipelineRun::start("acme.io");
        assert_eq!(run.stage, Stage::Context);
        let mut run = run.advance(std::time::Duration::from_millis(5));
        assert_eq!(run.stage, Stage::Discovery);
        assert_eq!(run.last_completed, Some(Stage::Context));

        let mut stage_costs = CostLedger::new();
        stage_costs.record(CallKind::DiscoveryPage, 1, true, "page 1");
        run.absorb(&stage_costs, vec![RunFlag::DiscoveryExhausted { pages: 1 }]);
        assert_eq!(run.ledger.total(), 1);
        assert_eq!(run.flags.len(), 1);
    }

    #[test]
    fn failure_carries_costs_and_stage() {
        let mut run = PipelineRun::start("acme.io").advance(std::time::Duration::ZERO);
        run.ledger.record(CallKind::DiscoveryPage, 1, true, "page 1");
        let failure = run.fail(
            FailureCause::EmptyGroup {
                discovered: 0,
                scored: 0,
            },
            std::time::Duration::ZERO,
            PartialResults::default(),
        );
        assert_eq!(failure.stage, Stage::Discovery);
        assert_eq!(failure.last_completed, Some(Stage::Context));
        assert_eq!(failure.costs.total(), 1);
        assert_eq!(failure.cause.kind(), "empty_group");
        assert!(failure.to_string().contains("DISCOVERY"));
    }

    #[test]
    fn run_flag_serializes_tagged() {
        let flag = RunFlag::DiscoveryExhausted { pages: 3 };
        let json = serde_json::to_string(&flag).expect("serialize");
        assert_eq!(json, r#"{"flag":"discovery_exhausted","pages":3}"#);
    }
}
