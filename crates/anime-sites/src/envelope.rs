//! The `{status, content, message}` JSON wrapper both sites put around
//! HTML fragments.

use anime_fetch::{FetchError, Result};
use serde::Deserialize;

const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    /// Absent on Shikimori responses.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    /// The HTML fragment, requiring `status == "success"`.
    pub fn into_checked_content(self) -> Result<String> {
        match self.status.as_deref() {
            Some(STATUS_SUCCESS) => self.into_content(),
            other => Err(FetchError::service(format!(
                "upstream returned status {:?}: {}",
                other.unwrap_or_default(),
                self.message.as_deref().unwrap_or("no message")
            ))),
        }
    }

    /// The HTML fragment; empty content means nothing matched.
    pub fn into_content(self) -> Result<String> {
        if self.content.trim().is_empty() {
            return Err(FetchError::no_results("upstream returned empty content"));
        }
        Ok(self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anime_fetch::ErrorKind;

    fn parse(raw: &str) -> Envelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_success_envelope() {
        let envelope = parse(r#"{"status":"success","content":"<div>...</div>"}"#);
        assert_eq!(envelope.into_checked_content().unwrap(), "<div>...</div>");
    }

    #[test]
    fn test_failed_status_carries_message() {
        let err = parse(r#"{"status":"error","content":"","message":"Anime not found"}"#)
            .into_checked_content()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceError);
        assert!(err.message().contains("Anime not found"));
        assert!(err.message().contains("error"));
    }

    #[test]
    fn test_missing_status_fails_checked() {
        let err = parse(r#"{"content":"<div/>"}"#)
            .into_checked_content()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceError);
    }

    #[test]
    fn test_empty_content_is_no_results() {
        let err = parse(r#"{"status":"success","content":"  "}"#)
            .into_checked_content()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResults);

        let err = parse(r#"{"content":""}"#).into_content().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResults);
    }

    #[test]
    fn test_content_only_envelope() {
        let envelope = parse(r#"{"content":"<div class=\"b-db_entry-variant-list_item\"></div>"}"#);
        assert!(envelope.status.is_none());
        assert!(envelope.into_content().unwrap().contains("variant-list_item"));
    }
}
