//! AnimeGo catalog and Aniboom player requests.
//!
//! AnimeGo serves search results, episode schedules and the player block as
//! JSON envelopes around HTML. The Aniboom embed and its stream manifest are
//! fetched directly with the player's origin.

use crate::envelope::Envelope;
use crate::https_base;
use crate::manifest::{rewrite_manifest, save_manifest};
use anime_fetch::{
    CancellationToken, FetchEngine, FetchProfiles, FetchRequest, ReqwestTransport, Result,
    Transport,
};
use shared::SitesConfig;
use std::path::Path;
use tracing::{debug, info};

/// Origin the Aniboom player runs under.
pub const PLAYER_ORIGIN: &str = "https://aniboom.one";

const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";

pub struct AniboomClient<T: Transport = ReqwestTransport> {
    interactive: FetchEngine<T>,
    background: FetchEngine<T>,
    base_url: String,
    user_agent: String,
}

impl<T: Transport> AniboomClient<T> {
    pub fn new(engine: &FetchEngine<T>, profiles: &FetchProfiles, sites: &SitesConfig) -> Self {
        Self {
            interactive: engine
                .profile(profiles.interactive.clone())
                .with_policy(profiles.policy.clone()),
            background: engine
                .profile(profiles.background.clone())
                .with_policy(profiles.policy.clone()),
            base_url: https_base(&sites.animego_domain),
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

    fn home_referer(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn search_referer(&self) -> String {
        format!("{}/search/all?q=anime", self.base_url)
    }

    fn get(&self, url: impl Into<String>) -> FetchRequest {
        FetchRequest::get(url).header("User-Agent", self.user_agent.as_str())
    }

    /// Same request shape the site's own XHR calls use.
    fn xhr(&self, url: impl Into<String>, referer: String) -> FetchRequest {
        self.get(url)
            .header("Accept", ACCEPT_JSON)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", referer)
            .json()
    }

    pub fn fast_search_request(&self, title: &str) -> FetchRequest {
        self.xhr(format!("{}/search/all", self.base_url), self.home_referer())
            .param("type", "small")
            .param("q", title)
    }

    /// Quick search; returns the small result list HTML.
    pub async fn fast_search(&self, title: &str, cancel: &CancellationToken) -> Result<String> {
        info!(title, "AnimeGo fast search");
        let envelope: Envelope = self
            .interactive
            .fetch_json(self.fast_search_request(title), cancel)
            .await?;
        envelope.into_checked_content()
    }

    pub fn search_request(&self, title: &str) -> FetchRequest {
        self.get(format!("{}/search/all", self.base_url))
            .param("q", title)
            .header("Referer", self.home_referer())
    }

    /// Full search results page.
    pub async fn search(&self, title: &str, cancel: &CancellationToken) -> Result<String> {
        info!(title, "AnimeGo search");
        self.interactive
            .fetch_text(self.search_request(title), cancel)
            .await
    }

    pub fn episodes_request(&self, link: &str) -> FetchRequest {
        self.xhr(link, self.search_referer())
            .param("type", "episodeSchedule")
            .param("episodeNumber", "99999")
    }

    /// Episode schedule fragment of an anime page.
    pub async fn episodes_fragment(&self, link: &str, cancel: &CancellationToken) -> Result<String> {
        debug!(link, "Fetching AnimeGo episode schedule");
        let envelope: Envelope = self
            .background
            .fetch_json(self.episodes_request(link), cancel)
            .await?;
        envelope.into_checked_content()
    }

    /// HTML of an anime page.
    pub async fn anime_page(&self, link: &str, cancel: &CancellationToken) -> Result<String> {
        debug!(link, "Fetching AnimeGo anime page");
        let request = self.get(link).header("Referer", self.search_referer());
        self.background.fetch_text(request, cancel).await
    }

    pub fn player_request(&self, animego_id: &str) -> FetchRequest {
        self.xhr(
            format!("{}/anime/{}/player", self.base_url, animego_id),
            self.search_referer(),
        )
        .param("_allow", "true")
    }

    /// Player block for an anime; holds the translation list and embed links.
    pub async fn player_fragment(
        &self,
        animego_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!(animego_id, "Fetching AnimeGo player");
        let envelope: Envelope = self
            .interactive
            .fetch_json(self.player_request(animego_id), cancel)
            .await?;
        envelope.into_checked_content()
    }

    /// `episode` 0 means a film and is left out of the query.
    pub fn embed_request(&self, embed_link: &str, translation: &str, episode: u32) -> FetchRequest {
        let request = self
            .get(embed_link)
            .param("translation", translation)
            .header("Referer", self.home_referer());
        if episode > 0 {
            request.param("episode", episode.to_string())
        } else {
            request
        }
    }

    /// HTML of the Aniboom embed for one translation and episode.
    pub async fn embed_page(
        &self,
        embed_link: &str,
        translation: &str,
        episode: u32,
        cancel: &CancellationToken,
    ) -> Result<String> {
        debug!(embed_link, translation, episode, "Fetching Aniboom embed");
        self.interactive
            .fetch_text(self.embed_request(embed_link, translation, episode), cancel)
            .await
    }

    pub fn playlist_request(&self, media_src: &str) -> FetchRequest {
        self.get(media_src)
            .header("Origin", PLAYER_ORIGIN)
            .header("Referer", format!("{}/", PLAYER_ORIGIN))
    }

    /// Stream manifest at `media_src` with segment references made absolute.
    pub async fn playlist(&self, media_src: &str, cancel: &CancellationToken) -> Result<String> {
        let manifest = self
            .interactive
            .fetch_text(self.playlist_request(media_src), cancel)
            .await?;
        let rewritten = rewrite_manifest(media_src, &manifest)?;
        info!(media_src, bytes = rewritten.len(), "Playlist ready");
        Ok(rewritten)
    }

    /// Fetch the playlist and write it to `path`.
    pub async fn save_playlist(
        &self,
        media_src: &str,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let playlist = self.playlist(media_src, cancel).await?;
        save_manifest(path, &playlist).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn client() -> AniboomClient {
        let engine = FetchEngine::new(Default::default()).unwrap();
        AniboomClient::new(&engine, &FetchProfiles::default(), &SitesConfig::default())
    }

    fn query(request: &FetchRequest) -> BTreeMap<String, String> {
        request
            .prepare()
            .unwrap()
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_fast_search_request_shape() {
        let request = client().fast_search_request("Spice and Wolf");
        let prepared = request.prepare().unwrap();
        assert_eq!(prepared.url.path(), "/search/all");
        assert_eq!(prepared.url.host_str(), Some("animego.me"));
        assert_eq!(query(&request)["type"], "small");
        assert_eq!(query(&request)["q"], "Spice and Wolf");
        assert_eq!(prepared.headers["accept"], ACCEPT_JSON);
        assert_eq!(prepared.headers["x-requested-with"], "XMLHttpRequest");
        assert_eq!(prepared.headers["referer"], "https://animego.me/");
    }

    #[test]
    fn test_episodes_request_shape() {
        let request = client().episodes_request(
            "https://animego.me/anime/volchica-i-pryanosti-torgovec-vstrechaet-mudruyu-volchicu-2546",
        );
        let params = query(&request);
        assert_eq!(params["type"], "episodeSchedule");
        assert_eq!(params["episodeNumber"], "99999");
        assert_eq!(
            request.prepare().unwrap().headers["referer"],
            "https://animego.me/search/all?q=anime"
        );
    }

    #[test]
    fn test_player_request_shape() {
        let prepared = client().player_request("2546").prepare().unwrap();
        assert_eq!(
            prepared.url.as_str(),
            "https://animego.me/anime/2546/player?_allow=true"
        );
        assert_eq!(
            prepared.headers["referer"],
            "https://animego.me/search/all?q=anime"
        );
        assert_eq!(prepared.headers["x-requested-with"], "XMLHttpRequest");
    }

    #[test]
    fn test_embed_request_skips_episode_for_films() {
        let client = client();
        let film = client.embed_request("https://aniboom.one/embed/yxVdenrqNar", "2", 0);
        assert_eq!(query(&film).get("episode"), None);
        assert_eq!(query(&film)["translation"], "2");

        let episode = client.embed_request("https://aniboom.one/embed/yxVdenrqNar", "2", 7);
        assert_eq!(query(&episode)["episode"], "7");
    }

    #[test]
    fn test_playlist_request_uses_player_origin() {
        let prepared = client()
            .playlist_request("https://host/a/master_device.m3u8")
            .prepare()
            .unwrap();
        assert_eq!(prepared.headers["origin"], "https://aniboom.one");
        assert_eq!(prepared.headers["referer"], "https://aniboom.one/");
    }

    #[test]
    fn test_mirror_domain() {
        let engine = FetchEngine::new(Default::default()).unwrap();
        let sites = SitesConfig {
            animego_domain: "animego.club/".to_string(),
            ..SitesConfig::default()
        };
        let client = AniboomClient::new(&engine, &FetchProfiles::default(), &sites);
        assert_eq!(client.base_url(), "https://animego.club");
    }
}
