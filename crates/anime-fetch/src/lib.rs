//! Concurrent fetch engine for the anime catalog scrapers.
//!
//! Every request is raced by several identical workers; the first `200`
//! wins and the rest are stopped. Rate limiting (`429`) and upstream
//! overload (`520`) end a worker at once instead of being retried.

pub mod config;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod policy;
pub mod request;
pub mod transport;

pub use config::{ConfigError, FetchConfig, FetchProfiles};
pub use engine::FetchEngine;
pub use error::{ErrorKind, FetchError, Result, TransportError};
pub use materialize::{FetchOutcome, Payload};
pub use policy::{StatusPolicy, Verdict};
pub use request::{Expectation, FetchRequest, PreparedRequest};
pub use transport::{Exchange, ReqwestTransport, ResponseBody, Transport};

pub use tokio_util::sync::CancellationToken;
