//! Stream manifest helpers for the Aniboom player.
//!
//! The player hands out DASH (`.mpd`) or HLS (`master_device.m3u8`)
//! manifests whose segment references are relative to the media server.
//! Rewriting them to absolute URLs lets the file be played from anywhere.

use anime_fetch::{ErrorKind, FetchError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

const DASH_MARKER: &str = "<MPD";
const HLS_MASTER: &str = "master_device.m3u8";
const HLS_SEGMENT_PREFIX: &str = "media_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Dash,
    Hls,
}

impl ManifestFormat {
    pub fn detect(manifest: &str) -> Self {
        if manifest.contains(DASH_MARKER) {
            ManifestFormat::Dash
        } else {
            ManifestFormat::Hls
        }
    }

    /// File extension a saved manifest should carry.
    pub fn extension(&self) -> &'static str {
        match self {
            ManifestFormat::Dash => "mpd",
            ManifestFormat::Hls => "m3u8",
        }
    }
}

fn unexpected(message: String) -> FetchError {
    FetchError::new(ErrorKind::UnexpectedBehavior, message)
}

/// Make every segment reference in `manifest` absolute against `media_src`.
pub fn rewrite_manifest(media_src: &str, manifest: &str) -> Result<String> {
    match ManifestFormat::detect(manifest) {
        ManifestFormat::Dash => {
            let (slash, dot) = match (media_src.rfind('/'), media_src.rfind('.')) {
                (Some(slash), Some(dot)) if slash + 1 < dot => (slash, dot),
                _ => {
                    return Err(unexpected(format!(
                        "media src {:?} has no file name to rewrite",
                        media_src
                    )))
                }
            };
            let stem = &media_src[slash + 1..dot];
            let server_path = &media_src[..dot];
            debug!(stem, server_path, "Rewriting DASH manifest");
            Ok(manifest.replace(stem, server_path))
        }
        ManifestFormat::Hls => {
            let master = media_src.rfind(HLS_MASTER).ok_or_else(|| {
                unexpected(format!("media src {:?} is not an HLS master playlist", media_src))
            })?;
            let server_dir = &media_src[..master];
            debug!(server_dir, "Rewriting HLS manifest");
            Ok(manifest.replace(
                HLS_SEGMENT_PREFIX,
                &format!("{}{}", server_dir, HLS_SEGMENT_PREFIX),
            ))
        }
    }
}

/// Write a rewritten manifest to `path`.
pub async fn save_manifest(path: impl AsRef<Path>, manifest: &str) -> Result<()> {
    let path = path.as_ref();
    tokio::fs::write(path, manifest).await.map_err(|e| {
        FetchError::service(format!("failed to write manifest {}: {}", path.display(), e))
    })?;
    info!(path = %path.display(), bytes = manifest.len(), "Manifest saved");
    Ok(())
}

/// Pull the manifest URL out of the player's `data-parameters` attribute.
///
/// The attribute is JSON whose `dash` field is itself a JSON document
/// (normally a string) holding `src`.
pub fn media_src_from_parameters(data_parameters: &str) -> Result<String> {
    let parameters: Value = serde_json::from_str(data_parameters)
        .map_err(|e| unexpected(format!("player parameters are not JSON: {}", e)))?;

    let dash = match parameters.get("dash") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| unexpected(format!("dash parameters are not JSON: {}", e)))?,
        Some(object @ Value::Object(_)) => object.clone(),
        _ => return Err(unexpected("player parameters have no dash entry".to_string())),
    };

    match dash.get("src") {
        Some(Value::String(src)) if !src.is_empty() => Ok(src.clone()),
        other => Err(unexpected(format!("dash src is not a string: {:?}", other))),
    }
}

/// Directory part of `media_src`, trailing slash kept.
pub fn media_server(media_src: &str) -> Result<String> {
    match media_src.rfind('/') {
        Some(slash) if slash + 1 < media_src.len() => Ok(media_src[..=slash].to_string()),
        _ => Err(unexpected(format!(
            "media src {:?} has no server directory",
            media_src
        ))),
    }
}

/// `//aniboom.one/embed/ID?params` -> `https://aniboom.one/embed/ID`.
pub fn normalize_embed_link(player_link: &str) -> Result<String> {
    let query = match player_link.rfind('?') {
        Some(query) if query + 1 < player_link.len() => query,
        _ => {
            return Err(unexpected(format!(
                "player link {:?} has no query to strip",
                player_link
            )))
        }
    };
    let link = &player_link[..query];
    if link.starts_with("https:") || link.starts_with("http:") {
        Ok(link.to_string())
    } else {
        Ok(format!("https:{}", link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DASH_SRC: &str = "https://sophia.yagami-light.com/7p/7P9qkv26dQ8/v26utto64xx66.mpd";

    #[test]
    fn test_rewrite_dash() {
        let manifest = r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011">
  <SegmentTemplate media="v26utto64xx66_$RepresentationID$_$Number$.m4s" initialization="v26utto64xx66_$RepresentationID$_init.m4s"/>
</MPD>"#;
        let rewritten = rewrite_manifest(DASH_SRC, manifest).unwrap();
        assert!(rewritten.contains(
            r#"media="https://sophia.yagami-light.com/7p/7P9qkv26dQ8/v26utto64xx66_$RepresentationID$_$Number$.m4s""#
        ));
        assert!(rewritten.contains(
            r#"initialization="https://sophia.yagami-light.com/7p/7P9qkv26dQ8/v26utto64xx66_$RepresentationID$_init.m4s""#
        ));
    }

    #[test]
    fn test_rewrite_dash_rejects_malformed_src() {
        let manifest = "<MPD></MPD>";
        for src in ["no-slash.mpd", "https://host/dir.v2/file", "https://host/.mpd"] {
            let err = rewrite_manifest(src, manifest).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnexpectedBehavior, "{}", src);
        }
    }

    #[test]
    fn test_rewrite_hls() {
        let src = "https://calista.yagami-light.com/a1/abc/master_device.m3u8";
        let manifest = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nmedia_0.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=1400000\nmedia_1.m3u8\n";
        let rewritten = rewrite_manifest(src, manifest).unwrap();
        assert!(rewritten.contains("\nhttps://calista.yagami-light.com/a1/abc/media_0.m3u8\n"));
        assert!(rewritten.contains("\nhttps://calista.yagami-light.com/a1/abc/media_1.m3u8\n"));
        assert!(rewritten.starts_with("#EXTM3U"));
    }

    #[test]
    fn test_rewrite_hls_requires_master() {
        let err = rewrite_manifest("https://host/a/playlist.m3u8", "#EXTM3U\nmedia_0.m3u8")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedBehavior);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ManifestFormat::detect("<MPD>"), ManifestFormat::Dash);
        assert_eq!(ManifestFormat::detect("#EXTM3U"), ManifestFormat::Hls);
        assert_eq!(ManifestFormat::Dash.extension(), "mpd");
    }

    #[test]
    fn test_media_src_from_parameters() {
        let parameters = r#"{"id":"yxVdenrqNar","dash":"{\"src\":\"https://sophia.yagami-light.com/7p/7P9qkv26dQ8/v26utto64xx66.mpd\"}"}"#;
        assert_eq!(media_src_from_parameters(parameters).unwrap(), DASH_SRC);

        let nested = r#"{"dash":{"src":"https://host/a/master_device.m3u8"}}"#;
        assert_eq!(
            media_src_from_parameters(nested).unwrap(),
            "https://host/a/master_device.m3u8"
        );
    }

    #[test]
    fn test_media_src_from_bad_parameters() {
        for parameters in [
            "not json",
            r#"{"hls":"{}"}"#,
            r#"{"dash":"not json"}"#,
            r#"{"dash":"{\"src\":42}"}"#,
        ] {
            let err = media_src_from_parameters(parameters).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnexpectedBehavior, "{}", parameters);
        }
    }

    #[test]
    fn test_media_server() {
        assert_eq!(
            media_server(DASH_SRC).unwrap(),
            "https://sophia.yagami-light.com/7p/7P9qkv26dQ8/"
        );
        assert!(media_server("no-slash").is_err());
        assert!(media_server("https://host/dir/").is_err());
    }

    #[test]
    fn test_normalize_embed_link() {
        assert_eq!(
            normalize_embed_link("//aniboom.one/embed/yxVdenrqNar?episode=&translation=").unwrap(),
            "https://aniboom.one/embed/yxVdenrqNar"
        );
        assert_eq!(
            normalize_embed_link("https://aniboom.one/embed/abc?x=1").unwrap(),
            "https://aniboom.one/embed/abc"
        );
        let err = normalize_embed_link("//aniboom.one/embed/abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedBehavior);
        assert!(normalize_embed_link("//aniboom.one/embed/abc?").is_err());
    }

    #[tokio::test]
    async fn test_save_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("episode.mpd");

        save_manifest(&path, "<MPD></MPD>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<MPD></MPD>");

        let missing = temp_dir.path().join("missing").join("episode.mpd");
        let err = save_manifest(&missing, "<MPD/>").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceError);
    }
}
