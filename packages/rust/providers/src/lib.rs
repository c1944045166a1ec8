//! Data-provider adapters for buyer-group discovery.
//!
//! - [`contracts`]: the collaborator traits and the injected [`Capability`]
//! - [`http`]: a reqwest-based REST provider
//! - [`fixture`]: an in-process provider backed by a JSON fixture file

pub mod contracts;
pub mod fixture;
pub mod http;

pub use contracts::{Capability, CandidateDirectory, Collaborators, CompanyResolver, ProfileEnricher};
pub use fixture::{Fixture, FixtureFailures, FixtureProvider, profile_key};
pub use http::HttpProvider;
