//! Core pipeline orchestration and domain logic for buyergroup.
//!
//! This crate ties together context resolution, discovery, scoring, role
//! classification, group selection, coverage, profile collection and
//! cohesion into one run (see [`Pipeline`]), and writes the result bundle.

pub mod assembler;
pub mod cohesion;
pub mod coverage;
pub mod enrichment;
pub mod narrator;
pub mod params;
pub mod pipeline;
pub mod presets;
pub mod roles;
pub mod scoring;
pub mod selection;

pub use assembler::{BundleManifest, BundleResult, verify_bundle, write_bundle};
pub use narrator::{Narrator, TemplateNarrator};
pub use params::derive_parameters;
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use presets::{ResolvedKeywords, resolve_keywords};
