//! Status classification table.
//!
//! One table decides, for every HTTP status a worker sees, whether the
//! attempt succeeded, should be retried, or ended the worker. Both the
//! racing and the sequential fetch paths consult the same table.

use crate::error::ErrorKind;
use reqwest::StatusCode;
use std::collections::BTreeMap;

/// What a worker does with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver the response.
    Success,
    /// Release the response and try again.
    Retry,
    /// Release the response and stop this worker.
    Terminal(ErrorKind),
}

/// Terminal status lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    terminal: BTreeMap<u16, ErrorKind>,
}

/// Cloudflare's "web server returned an unknown error".
pub const STATUS_UPSTREAM_OVERLOADED: u16 = 520;

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::empty()
            .with_terminal(StatusCode::TOO_MANY_REQUESTS, ErrorKind::TooManyRequests)
            .with_terminal_code(STATUS_UPSTREAM_OVERLOADED, ErrorKind::ServiceOverloaded)
    }
}

impl StatusPolicy {
    /// Policy with no terminal statuses: every non-200 is retried.
    pub fn empty() -> Self {
        Self {
            terminal: BTreeMap::new(),
        }
    }

    /// Mark `status` as terminal with the given kind.
    ///
    /// Registering 200 has no effect; a 200 is always a success.
    pub fn with_terminal(self, status: StatusCode, kind: ErrorKind) -> Self {
        self.with_terminal_code(status.as_u16(), kind)
    }

    fn with_terminal_code(mut self, code: u16, kind: ErrorKind) -> Self {
        if code != StatusCode::OK.as_u16() {
            self.terminal.insert(code, kind);
        }
        self
    }

    pub fn classify(&self, status: StatusCode) -> Verdict {
        if status == StatusCode::OK {
            return Verdict::Success;
        }
        match self.terminal.get(&status.as_u16()) {
            Some(kind) => Verdict::Terminal(*kind),
            None => Verdict::Retry,
        }
    }

    pub fn terminal_kind(&self, status: StatusCode) -> Option<ErrorKind> {
        self.terminal.get(&status.as_u16()).copied()
    }

    /// Terminal entries in ascending status order.
    pub fn terminal_statuses(&self) -> impl Iterator<Item = (u16, ErrorKind)> + '_ {
        self.terminal.iter().map(|(code, kind)| (*code, *kind))
    }
}
