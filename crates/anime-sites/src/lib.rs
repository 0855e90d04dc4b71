//! Request catalogs for the upstream anime catalog sites.
//!
//! Each client knows which URL, query, headers and body shape a logical page
//! needs and runs it through the shared fetch engine. Pages come back as raw
//! HTML for the scraping layer; DOM extraction does not happen here.

pub mod aniboom;
pub mod envelope;
pub mod manifest;
pub mod shikimori;

pub use aniboom::AniboomClient;
pub use envelope::Envelope;
pub use manifest::{
    media_server, media_src_from_parameters, normalize_embed_link, rewrite_manifest,
    save_manifest, ManifestFormat,
};
pub use shikimori::ShikimoriClient;

/// Base URL for a mirror domain, without a trailing slash.
pub(crate) fn https_base(domain: &str) -> String {
    format!("https://{}", domain.trim().trim_end_matches('/'))
}
