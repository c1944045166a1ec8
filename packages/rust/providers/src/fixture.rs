//! In-process provider backed by a JSON fixture file.
//!
//! Used for offline runs (`buyergroup run --fixture`) and as the fake behind
//! the end-to-end pipeline tests. Counts calls per operation and can inject
//! failures and latency.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use buyergroup_shared::{
    BuyerGroupError, Candidate, CandidatePage, CompanyFacts, CompanyRef, FullProfile, Result,
};

use crate::contracts::{Capability, CandidateDirectory, CompanyResolver, ProfileEnricher};

fn default_page_size() -> usize {
    25
}

// ---------------------------------------------------------------------------
// Fixture file schema
// ---------------------------------------------------------------------------

/// Contents of a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    /// `None` makes the resolver report "not found".
    #[serde(default)]
    pub company: Option<CompanyFacts>,
    /// Every candidate the directory knows, in discovery order.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Full profiles keyed by profile URL, else by name.
    #[serde(default)]
    pub profiles: HashMap<String, FullProfile>,
    #[serde(default)]
    pub failures: FixtureFailures,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            company: None,
            candidates: Vec::new(),
            page_size: default_page_size(),
            profiles: HashMap::new(),
            failures: FixtureFailures::default(),
        }
    }
}

/// Failures injected into fixture calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureFailures {
    #[serde(default)]
    pub resolve: bool,
    /// 1-based page numbers that fail.
    #[serde(default)]
    pub pages: Vec<u32>,
    /// Profile keys (URL or name) whose enrichment fails.
    #[serde(default)]
    pub profiles: Vec<String>,
}

// ---------------------------------------------------------------------------
// FixtureProvider
// ---------------------------------------------------------------------------

/// Call counters, readable after a run.
#[derive(Debug, Default)]
struct Counters {
    resolve: AtomicUsize,
    pages: AtomicUsize,
    enrich: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Provider serving a [`Fixture`] from memory.
#[derive(Debug)]
pub struct FixtureProvider {
    fixture: Fixture,
    failing_pages: HashSet<u32>,
    failing_profiles: HashSet<String>,
    latency: Option<Duration>,
    counters: Counters,
}

impl FixtureProvider {
    pub fn new(fixture: Fixture) -> Self {
        let failing_pages = fixture.failures.pages.iter().copied().collect();
        let failing_profiles = fixture.failures.profiles.iter().cloned().collect();
        Self {
            fixture,
            failing_pages,
            failing_profiles,
            latency: None,
            counters: Counters::default(),
        }
    }

    /// Load a fixture from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BuyerGroupError::io(path, e))?;
        let fixture: Fixture = serde_json::from_str(&content).map_err(|e| {
            BuyerGroupError::parse(format!("invalid fixture {}: {e}", path.display()))
        })?;
        Ok(Self::new(fixture))
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn fail_profile(mut self, key: impl Into<String>) -> Self {
        self.failing_profiles.insert(key.into());
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.counters.resolve.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.counters.pages.load(Ordering::SeqCst)
    }

    pub fn enrich_calls(&self) -> usize {
        self.counters.enrich.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Track one in-flight call and apply the configured latency.
    async fn enter(&self) -> InFlight<'_> {
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.counters);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }
}

struct InFlight<'a>(&'a Counters);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Key used to look up a candidate's profile: URL when known, else name.
pub fn profile_key(candidate: &Candidate) -> String {
    candidate
        .profile_url
        .clone()
        .unwrap_or_else(|| candidate.name.clone())
}

#[async_trait]
impl CompanyResolver for FixtureProvider {
    async fn resolve(&self, _cap: &Capability, identifier: &str) -> Result<Option<CompanyFacts>> {
        self.counters.resolve.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        if self.fixture.failures.resolve {
            return Err(BuyerGroupError::Provider(format!(
                "injected resolve failure for {identifier}"
            )));
        }
        Ok(self.fixture.company.clone())
    }
}

#[async_trait]
impl CandidateDirectory for FixtureProvider {
    async fn list_candidates(
        &self,
        _cap: &Capability,
        _company: &CompanyRef,
        page: u32,
    ) -> Result<CandidatePage> {
        self.counters.pages.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        if self.failing_pages.contains(&page) {
            return Err(BuyerGroupError::Provider(format!("injected failure on page {page}")));
        }

        let size = self.fixture.page_size.max(1);
        let start = (page.saturating_sub(1) as usize).saturating_mul(size);
        let all = &self.fixture.candidates;
        let end = start.saturating_add(size).min(all.len());
        let candidates = all.get(start..end).map(<[Candidate]>::to_vec).unwrap_or_default();
        debug!(page, returned = candidates.len(), "fixture page served");

        Ok(CandidatePage {
            candidates,
            has_more: end < all.len(),
        })
    }
}

#[async_trait]
impl ProfileEnricher for FixtureProvider {
    async fn enrich(&self, _cap: &Capability, candidate: &Candidate) -> Result<FullProfile> {
        self.counters.enrich.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await;
        let key = profile_key(candidate);
        if self.failing_profiles.contains(&key) {
            return Err(BuyerGroupError::Provider(format!("injected enrichment failure for {key}")));
        }
        Ok(self.fixture.profiles.get(&key).cloned().unwrap_or_else(|| FullProfile {
            headline: Some(candidate.title.clone()),
            profile_url: candidate.profile_url.clone(),
            ..FullProfile::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(n: usize, page_size: usize) -> Fixture {
        Fixture {
            company: Some(CompanyFacts::degraded("Acme")),
            candidates: (0..n)
                .map(|i| Candidate::new(format!("Person {i}"), "Analyst", "Sales"))
                .collect(),
            page_size,
            ..Fixture::default()
        }
    }

    fn company() -> CompanyRef {
        CompanyFacts::degraded("Acme").company_ref()
    }

    #[test]
    fn default_fixture_uses_standard_page_size() {
        let f = Fixture::default();
        assert_eq!(f.page_size, 25);

        let parsed: Fixture = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.page_size, f.page_size);
    }

    #[tokio::test]
    async fn pages_are_one_based_and_signal_exhaustion() {
        let provider = FixtureProvider::new(fixture(5, 2));
        let cap = Capability::anonymous(1);

        let first = provider.list_candidates(&cap, &company(), 1).await.unwrap();
        assert_eq!(first.candidates[0].name, "Person 0");
        assert!(first.has_more);

        let last = provider.list_candidates(&cap, &company(), 3).await.unwrap();
        assert_eq!(last.candidates.len(), 1);
        assert!(!last.has_more);

        let beyond = provider.list_candidates(&cap, &company(), 9).await.unwrap();
        assert!(beyond.candidates.is_empty());
        assert_eq!(provider.page_calls(), 3);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let provider = FixtureProvider::new(fixture(3, 2))
            .fail_page(2)
            .fail_profile("Person 1");
        let cap = Capability::anonymous(1);

        assert!(provider.list_candidates(&cap, &company(), 2).await.is_err());
        let person = Candidate::new("Person 1", "Analyst", "Sales");
        assert!(provider.enrich(&cap, &person).await.is_err());
        assert_eq!(provider.enrich_calls(), 1);
    }

    #[tokio::test]
    async fn enrich_falls_back_to_preview_headline() {
        let provider = FixtureProvider::new(fixture(1, 1));
        let cap = Capability::anonymous(1);
        let person = Candidate::new("Person 0", "Analyst", "Sales");
        let profile = provider.enrich(&cap, &person).await.unwrap();
        assert_eq!(profile.headline.as_deref(), Some("Analyst"));
    }

    #[tokio::test]
    async fn missing_company_resolves_to_none() {
        let provider = FixtureProvider::new(Fixture::default());
        let cap = Capability::anonymous(1);
        assert!(provider.resolve(&cap, "ghost").await.unwrap().is_none());
        assert_eq!(provider.resolve_calls(), 1);
    }

    #[test]
    fn fixture_json_defaults() {
        let fixture: Fixture = serde_json::from_str(
            r#"{"candidates": [{"name": "Jane", "title": "CTO"}], "failures": {"pages": [2]}}"#,
        )
        .expect("parse fixture");
        assert_eq!(fixture.page_size, 25);
        assert_eq!(fixture.candidates[0].department, "");
        assert_eq!(fixture.failures.pages, vec![2]);
        assert!(fixture.company.is_none());
    }
}
