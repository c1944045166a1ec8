//! JSON-over-HTTP provider for a generic people-data REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use buyergroup_shared::{
    BuyerGroupError, Candidate, CandidatePage, CompanyFacts, CompanyRef, FullProfile, Result,
};

use crate::contracts::{Capability, CandidateDirectory, CompanyResolver, ProfileEnricher};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// HttpProvider
// ---------------------------------------------------------------------------

/// REST provider implementing all three collaborator contracts.
///
/// Endpoints, relative to `base_url`:
/// - `GET  v1/companies/resolve?identifier=..`
/// - `GET  v1/companies/{key}/people?page=N`
/// - `POST v1/people/enrich`
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: Url,
}

impl HttpProvider {
    /// Build a provider with a transport-level timeout. Per-call deadlines are
    /// applied by the pipeline on top of this.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BuyerGroupError::config(format!("invalid provider base_url {base_url}: {e}")))?;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| BuyerGroupError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BuyerGroupError::config(format!("base_url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder, cap: &Capability) -> RequestBuilder {
        let request = request.header(reqwest::header::USER_AGENT, &cap.user_agent);
        match &cap.credentials {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            BuyerGroupError::Provider(format!("{what}: request timed out"))
        } else {
            BuyerGroupError::Provider(format!("{what}: {e}"))
        }
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(BuyerGroupError::Provider(format!("{what}: HTTP {status}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| BuyerGroupError::parse(format!("{what}: invalid response body: {e}")))
}

#[async_trait]
impl CompanyResolver for HttpProvider {
    #[instrument(skip_all, fields(identifier = %identifier))]
    async fn resolve(&self, cap: &Capability, identifier: &str) -> Result<Option<CompanyFacts>> {
        let mut url = self.endpoint(&["v1", "companies", "resolve"])?;
        url.query_pairs_mut().append_pair("identifier", identifier);

        let response = send(self.authorize(self.client.get(url), cap), "resolve").await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("company not found");
            return Ok(None);
        }
        read_json(response, "resolve").await.map(Some)
    }
}

#[async_trait]
impl CandidateDirectory for HttpProvider {
    #[instrument(skip_all, fields(company = %company.name, page = page))]
    async fn list_candidates(
        &self,
        cap: &Capability,
        company: &CompanyRef,
        page: u32,
    ) -> Result<CandidatePage> {
        let key = company.key();
        let mut url = self.endpoint(&["v1", "companies", &key, "people"])?;
        url.query_pairs_mut().append_pair("page", &page.to_string());

        let what = format!("people page {page}");
        let response = send(self.authorize(self.client.get(url), cap), &what).await?;
        let page: CandidatePage = read_json(response, &what).await?;
        debug!(candidates = page.candidates.len(), has_more = page.has_more, "page received");
        Ok(page)
    }
}

#[async_trait]
impl ProfileEnricher for HttpProvider {
    #[instrument(skip_all, fields(name = %candidate.name))]
    async fn enrich(&self, cap: &Capability, candidate: &Candidate) -> Result<FullProfile> {
        let url = self.endpoint(&["v1", "people", "enrich"])?;
        let request = self.authorize(self.client.post(url), cap).json(candidate);
        let response = send(request, "enrich").await?;
        read_json(response, "enrich").await
    }
}
