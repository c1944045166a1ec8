//! Collaborator contracts consumed by the pipeline.
//!
//! Every call receives a [`Capability`] carrying credentials and the shared
//! rate limiter, so adapters hold no ambient global state and can be swapped
//! for fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use buyergroup_shared::{
    BuyerGroupError, Candidate, CandidatePage, CompanyFacts, CompanyRef, FullProfile, Result,
};

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Credentials and rate limits shared by all collaborator calls of a run.
#[derive(Debug, Clone)]
pub struct Capability {
    /// Bearer token for the provider, if it needs one.
    pub credentials: Option<String>,
    pub user_agent: String,
    limiter: Arc<Semaphore>,
}

impl Capability {
    /// Create a capability allowing at most `concurrency` in-flight calls.
    pub fn new(credentials: Option<String>, user_agent: impl Into<String>, concurrency: usize) -> Self {
        Self {
            credentials,
            user_agent: user_agent.into(),
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Anonymous capability for in-process providers.
    pub fn anonymous(concurrency: usize) -> Self {
        Self::new(None, concat!("buyergroup/", env!("CARGO_PKG_VERSION")), concurrency)
    }

    /// Wait for a call slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BuyerGroupError::Provider(format!("rate limiter closed: {e}")))
    }

    /// Call slots currently free.
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Stop handing out call slots. Pending and later acquires fail.
    pub fn close(&self) {
        self.limiter.close();
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Resolves a company identifier (name, domain, or social-profile URL).
#[async_trait]
pub trait CompanyResolver: Send + Sync {
    /// Returns `Ok(None)` when the company is unknown to the provider.
    async fn resolve(&self, cap: &Capability, identifier: &str) -> Result<Option<CompanyFacts>>;
}

/// Paged bulk search for preview candidate records.
#[async_trait]
pub trait CandidateDirectory: Send + Sync {
    /// Fetch one page (1-based) of candidates for `company`.
    async fn list_candidates(
        &self,
        cap: &Capability,
        company: &CompanyRef,
        page: u32,
    ) -> Result<CandidatePage>;
}

/// Fetches full profile detail for a single person.
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    async fn enrich(&self, cap: &Capability, candidate: &Candidate) -> Result<FullProfile>;
}

/// Bundle of the three collaborators a run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn CompanyResolver>,
    pub directory: Arc<dyn CandidateDirectory>,
    pub enricher: Arc<dyn ProfileEnricher>,
}

impl Collaborators {
    /// Use one provider for all three collaborator roles.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: CompanyResolver + CandidateDirectory + ProfileEnricher + 'static,
    {
        Self {
            resolver: provider.clone(),
            directory: provider.clone(),
            enricher: provider,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
