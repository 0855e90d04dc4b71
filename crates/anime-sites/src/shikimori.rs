//! Shikimori catalog requests.

use crate::envelope::Envelope;
use crate::https_base;
use anime_fetch::{
    CancellationToken, FetchEngine, FetchProfiles, FetchRequest, ReqwestTransport, Result,
    Transport,
};
use shared::SitesConfig;
use tracing::{debug, info};

const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// Shikimori client: autocomplete search plus the anime and resources pages.
pub struct ShikimoriClient<T: Transport = ReqwestTransport> {
    interactive: FetchEngine<T>,
    background: FetchEngine<T>,
    base_url: String,
    user_agent: String,
}

impl<T: Transport> ShikimoriClient<T> {
    pub fn new(engine: &FetchEngine<T>, profiles: &FetchProfiles, sites: &SitesConfig) -> Self {
        Self {
            interactive: engine
                .profile(profiles.interactive.clone())
                .with_policy(profiles.policy.clone()),
            background: engine
                .profile(profiles.background.clone())
                .with_policy(profiles.policy.clone()),
            base_url: https_base(&sites.shikimori_domain),
            user_agent: sites.user_agent.clone(),
        }
    }

    /// Point the client at another origin, e.g. `http://127.0.0.1:8080`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn search_request(&self, title: &str) -> FetchRequest {
        FetchRequest::get(format!("{}/animes/autocomplete/v2", self.base_url))
            .param("search", title)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", ACCEPT_JSON)
            .header("X-Requested-With", "XMLHttpRequest")
            .json()
    }

    /// Autocomplete search; returns the result list HTML fragment.
    pub async fn search(&self, title: &str, cancel: &CancellationToken) -> Result<String> {
        info!(title, "Searching Shikimori");
        let envelope: Envelope = self
            .interactive
            .fetch_json(self.search_request(title), cancel)
            .await?;
        let content = envelope.into_content()?;
        debug!(title, bytes = content.len(), "Shikimori search returned");
        Ok(content)
    }

    fn page_request(&self, link: &str) -> FetchRequest {
        FetchRequest::get(link).header("User-Agent", self.user_agent.as_str())
    }

    /// HTML of an anime page.
    pub async fn anime_page(&self, link: &str, cancel: &CancellationToken) -> Result<String> {
        debug!(link, "Fetching Shikimori anime page");
        self.background
            .fetch_text(self.page_request(link), cancel)
            .await
    }

    /// HTML of the anime's `/resources` page (related, staff, videos...).
    pub async fn resources_page(&self, link: &str, cancel: &CancellationToken) -> Result<String> {
        let link = resources_link(link);
        debug!(link = %link, "Fetching Shikimori resources page");
        self.background
            .fetch_text(self.page_request(&link), cancel)
            .await
    }
}

pub fn resources_link(link: &str) -> String {
    if link.ends_with('/') {
        format!("{}resources", link)
    } else {
        format!("{}/resources", link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anime_fetch::Expectation;
    use shared::config::DEFAULT_USER_AGENT;

    fn client() -> ShikimoriClient {
        let engine = FetchEngine::new(Default::default()).unwrap();
        ShikimoriClient::new(&engine, &FetchProfiles::default(), &SitesConfig::default())
    }

    #[test]
    fn test_default_domain() {
        assert_eq!(client().base_url(), "https://shikimori.one");
        assert_eq!(
            client().with_base_url("http://127.0.0.1:9000/").base_url(),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn test_search_request_shape() {
        let prepared = client().search_request("Frieren").prepare().unwrap();
        assert_eq!(
            prepared.url.as_str(),
            "https://shikimori.one/animes/autocomplete/v2?search=Frieren"
        );
        assert_eq!(prepared.headers["user-agent"], DEFAULT_USER_AGENT);
        assert_eq!(prepared.headers["accept"], ACCEPT_JSON);
        assert_eq!(prepared.headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(client().search_request("x").expectation, Expectation::Json);
    }

    #[test]
    fn test_resources_link() {
        assert_eq!(
            resources_link("https://shikimori.one/animes/z52991"),
            "https://shikimori.one/animes/z52991/resources"
        );
        assert_eq!(
            resources_link("https://shikimori.one/animes/z52991/"),
            "https://shikimori.one/animes/z52991/resources"
        );
    }
}
