//! Shared types, error model, and configuration for buyergroup.
//!
//! This crate is the foundation depended on by all other buyergroup crates.
//! It provides:
//! - [`BuyerGroupError`], the unified error type
//! - Domain types ([`DealContext`], [`Candidate`], [`BuyerGroup`], [`CohesionReport`])
//! - Run state ([`Stage`], [`CostLedger`], [`RunFlag`], [`PipelineReport`], [`PipelineFailure`])
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)
//! - Text normalization used for keyword matching and dedup keys

pub mod config;
pub mod error;
pub mod run;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CostsConfig, DefaultsConfig, HARD_PAGE_CEILING, PipelineConfig, PipelineSettings,
    ProviderConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{BuyerGroupError, Result};
pub use run::{
    CallKind, CostEntry, CostLedger, DerivedParameters, FailureCause, PartialResults,
    PipelineFailure, PipelineReport, PipelineRun, RunFlag, RunId, RunStatus, Stage, StageTiming,
};
pub use types::{
    BuyerGroup, Candidate, CandidateFilters, CandidateKey, CandidatePage, CohesionLevel,
    CohesionReport, CohesionWeights, CompanyFacts, CompanyRef, DealBand, DealContext,
    EngagementStrategy, EnrichedMember, EnrichmentStatus, FrozenGroup, FullProfile, GroupPriority,
    GroupSizing, Position, Role, RoleAssignment, RolePriorities, ScoredCandidate, Seniority,
};
