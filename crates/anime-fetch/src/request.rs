//! Logical fetch requests.

use crate::error::{FetchError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::collections::BTreeMap;

/// How the winning response body should be handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    /// Decode the body as JSON into the caller's type.
    Json,
    /// Hand the body back untouched.
    #[default]
    Bytes,
}

/// One logical request, raced by every worker of a fetch call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    /// Query parameters appended to `url` once, when the request is prepared.
    pub params: BTreeMap<String, String>,
    /// Header pairs in insertion order; names are case-insensitive and a
    /// later pair replaces an earlier one with the same name.
    pub headers: Vec<(String, String)>,
    pub expectation: Expectation,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            headers: Vec::new(),
            expectation: Expectation::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }

    pub fn json(self) -> Self {
        self.expect(Expectation::Json)
    }

    pub fn bytes(self) -> Self {
        self.expect(Expectation::Bytes)
    }

    /// Resolve URL, query and headers into the form every worker sends.
    ///
    /// Fails with `ServiceError` before any attempt is made if the URL or a
    /// header cannot be represented.
    pub fn prepare(&self) -> Result<PreparedRequest> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| FetchError::service(format!("invalid url {:?}: {}", self.url, e)))?;

        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::service(format!("invalid header name {:?}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                FetchError::service(format!("invalid value for header {:?}: {}", name, e))
            })?;
            headers.insert(header_name, header_value);
        }

        Ok(PreparedRequest {
            method: self.method.clone(),
            url,
            headers,
        })
    }
}

/// A request ready to go on the wire. Shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_appended_once() {
        let request = FetchRequest::get("https://shikimori.one/animes/autocomplete/v2")
            .param("search", "Solo Leveling");
        let prepared = request.prepare().unwrap();
        assert_eq!(
            prepared.url.as_str(),
            "https://shikimori.one/animes/autocomplete/v2?search=Solo+Leveling"
        );

        // Preparing again starts from the original URL.
        let again = request.prepare().unwrap();
        assert_eq!(again.url, prepared.url);
    }

    #[test]
    fn test_existing_query_is_kept() {
        let prepared = FetchRequest::get("https://animego.me/anime/2546/player?_allow=true")
            .param("episode", "3")
            .prepare()
            .unwrap();
        let pairs: Vec<(String, String)> = prepared
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("_allow".to_string(), "true".to_string()),
                ("episode".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn test_no_params_leaves_url_alone() {
        let prepared = FetchRequest::get("https://animego.me/").prepare().unwrap();
        assert_eq!(prepared.url.as_str(), "https://animego.me/");
        assert!(prepared.url.query().is_none());
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let prepared = FetchRequest::get("https://animego.me/")
            .header("x-requested-with", "fetch")
            .header("X-Requested-With", "XMLHttpRequest")
            .prepare()
            .unwrap();
        assert_eq!(prepared.headers.len(), 1);
        assert_eq!(prepared.headers["x-requested-with"], "XMLHttpRequest");
    }

    #[test]
    fn test_invalid_url_is_service_error() {
        let err = FetchRequest::get("not a url").prepare().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ServiceError);
    }

    #[test]
    fn test_invalid_header_is_service_error() {
        let err = FetchRequest::get("https://animego.me/")
            .header("bad header", "x")
            .prepare()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ServiceError);

        let err = FetchRequest::get("https://animego.me/")
            .header("Referer", "line\nbreak")
            .prepare()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ServiceError);
    }

    #[test]
    fn test_builder_defaults() {
        let request = FetchRequest::post("https://animego.me/").json();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.expectation, Expectation::Json);
        assert_eq!(FetchRequest::get("https://a.b/").expectation, Expectation::Bytes);
    }
}
