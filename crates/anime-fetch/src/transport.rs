//! The wire seam between the engine and an HTTP client.

use crate::error::{FetchError, Result, TransportError};
use crate::request::PreparedRequest;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// A response whose body has not been read yet.
///
/// Dropping it releases the body without reading it.
#[derive(Debug)]
pub struct Exchange<B> {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: B,
}

/// A response body that can be read exactly once.
#[async_trait]
pub trait ResponseBody: Send + Sized + 'static {
    async fn read_all(self) -> std::result::Result<Vec<u8>, TransportError>;
}

/// Sends one attempt of a prepared request.
///
/// Implementations are shared by every worker of every fetch call.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Body: ResponseBody;

    async fn send(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> std::result::Result<Exchange<Self::Body>, TransportError>;
}

#[async_trait]
impl ResponseBody for reqwest::Response {
    async fn read_all(self) -> std::result::Result<Vec<u8>, TransportError> {
        Ok(self.bytes().await?.to_vec())
    }
}

/// Production transport over one pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| FetchError::service(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Body = reqwest::Response;

    async fn send(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> std::result::Result<Exchange<Self::Body>, TransportError> {
        // The per-request timeout also bounds reading the body.
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout)
            .send()
            .await?;

        Ok(Exchange {
            status: response.status(),
            headers: response.headers().clone(),
            body: response,
        })
    }
}
