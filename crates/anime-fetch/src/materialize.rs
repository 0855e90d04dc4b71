//! Turning the winning response into what the caller asked for.

use crate::error::{FetchError, Result};
use crate::request::Expectation;
use crate::transport::ResponseBody;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Body of a successful fetch, shaped by the request's [`Expectation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<D> {
    Decoded(D),
    Raw(Vec<u8>),
}

impl<D> Payload<D> {
    pub fn decoded(&self) -> Option<&D> {
        match self {
            Payload::Decoded(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_decoded(self) -> Option<D> {
        match self {
            Payload::Decoded(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Decoded(_) => None,
        }
    }

    pub fn into_raw(self) -> Option<Vec<u8>> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Decoded(_) => None,
        }
    }
}

/// Result of a successful fetch call.
#[derive(Debug, Clone)]
pub struct FetchOutcome<D = serde_json::Value> {
    /// Status of the response that won.
    pub status: StatusCode,
    pub payload: Payload<D>,
    /// Worker that delivered the response (1-based).
    pub worker: usize,
    /// Attempt on which that worker succeeded (1-based).
    pub attempt: u32,
}

impl<D> FetchOutcome<D> {
    /// Failed attempts the winning worker made before succeeding.
    pub fn retries(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }
}

/// Read `body` once and shape it per `expectation`.
///
/// The body is consumed whatever the outcome, so it is released exactly once.
pub async fn materialize<B, D>(body: B, expectation: Expectation) -> Result<Payload<D>>
where
    B: ResponseBody,
    D: DeserializeOwned,
{
    let bytes = body
        .read_all()
        .await
        .map_err(|e| FetchError::service(format!("failed to read response body: {}", e)))?;

    match expectation {
        Expectation::Bytes => Ok(Payload::Raw(bytes)),
        Expectation::Json => serde_json::from_slice(&bytes)
            .map(Payload::Decoded)
            .map_err(|e| FetchError::json_decode(format!("failed to decode JSON response: {}", e))),
    }
}
