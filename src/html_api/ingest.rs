// Cache refresh — the markup-ingestion path.
//
// Fetches the spec page over plain HTTP from our own server (no headless
// browser involved) and runs it through the shared segmenter before storing.
// Same loopback caveat as the live extractor: the runtime keeps serving the
// fetch while the outer request awaits.

use anyhow::{Context as _, Result};
use tracing::info;

use crate::html_api::store::HtmlStore;
use crate::sections::{self, SpecSections};
use crate::tree::SpecInfo;

/// Re-extract one spec and overwrite its cache entry.
pub async fn refresh(
    http: &reqwest::Client,
    store: &HtmlStore,
    base_url: &str,
    spec: &SpecInfo,
) -> Result<SpecSections> {
    let url = format!("{base_url}{}?internal=true", spec.url);
    let html = http
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("failed fetching spec page {url}"))?
        .text()
        .await
        .context("spec page body was not readable text")?;

    let parsed = sections::parse_spec(&spec.spec_id, &html);
    store.put(&parsed).await?;
    info!(spec_id = %spec.spec_id, sections = parsed.contents.len(), "section cache refreshed");
    Ok(parsed)
}

/// Refresh a batch of specs, continuing past individual failures.
/// Returns the number of specs refreshed.
pub async fn refresh_all(
    http: &reqwest::Client,
    store: &HtmlStore,
    base_url: &str,
    specs: &[SpecInfo],
) -> usize {
    let mut refreshed = 0;
    for spec in specs {
        match refresh(http, store, base_url, spec).await {
            Ok(_) => refreshed += 1,
            Err(e) => tracing::warn!(spec_id = %spec.spec_id, err = %e, "cache refresh failed"),
        }
    }
    refreshed
}
