// Live section extraction — renders a spec page in a headless browser and
// segments the resulting DOM.
//
// Strategy:
//   1. detect_browser() probes PATH for a supported browser binary.
//   2. extract() spawns it with --headless --dump-dom against the local
//      server (`?internal=true` marks the load as machine-driven so the page
//      can adjust its own behavior).
//   3. The serialized DOM from stdout goes through the shared segmenter.
//
// This is the slow, resource-heavy path; the cached section API exists so
// most clarify requests never reach it. The request back into our own
// server is a deliberate same-process loopback — the multi-threaded runtime
// keeps serving it while the outer clarify request awaits here.

use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::sections::{self, SpecSections};
use crate::tree::SpecInfo;

/// Query marker appended to the page URL so a spec can tell it is being
/// loaded by the extractor rather than a person.
const INTERNAL_MARKER: &str = "internal=true";

/// Extraction result. `all_contents` is always the complete tree regardless
/// of any requested subset — downstream client metadata needs the full
/// index.
#[derive(Debug, Clone)]
pub struct ExtractedSpec {
    /// The requested subset, or the full tree when no subset was given.
    pub output: SpecSections,
    /// The complete tree.
    pub all_contents: SpecSections,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(
        "no headless browser found on PATH; install Chromium or Chrome, or set \
         [extractor] browsers in specd.toml"
    )]
    NoBrowser,

    #[error("failed to start headless browser: {0}")]
    Spawn(String),

    #[error("headless render did not finish within {0}s")]
    Timeout(u64),

    #[error("headless render produced no DOM output")]
    NoOutput,

    /// The page rendered but none of the requested section ids exist in it.
    #[error("requested sections HTML not found")]
    SectionsNotFound,
}

/// Detect the first headless-capable browser binary on PATH.
pub fn detect_browser(candidates: &[String]) -> Option<String> {
    for candidate in candidates {
        if on_path(candidate) {
            debug!(browser = %candidate, "headless browser detected on PATH");
            return Some(candidate.clone());
        }
    }
    None
}

/// The URL the browser is pointed at, with the internal marker appended.
pub fn page_url(base_url: &str, spec_url: &str) -> String {
    format!("{base_url}{spec_url}?{INTERNAL_MARKER}")
}

/// Render `spec`'s page headlessly and segment it.
///
/// When `sections` is given, `output` carries only the matching subtrees;
/// an empty match is `ExtractError::SectionsNotFound`, never an empty
/// success.
pub async fn extract(
    cfg: &ExtractorConfig,
    base_url: &str,
    spec: &SpecInfo,
    sections: Option<&[String]>,
) -> Result<ExtractedSpec, ExtractError> {
    let browser = detect_browser(&cfg.browsers).ok_or(ExtractError::NoBrowser)?;
    let url = page_url(base_url, &spec.url);

    let html = dump_dom(&browser, &url, cfg.timeout_secs).await?;
    let all_contents = sections::parse_spec(&spec.spec_id, &html);

    let output = match sections {
        Some(ids) if !ids.is_empty() => {
            let wanted: HashSet<String> = ids.iter().cloned().collect();
            let filtered = sections::filter(&all_contents.contents, &wanted);
            if filtered.is_empty() {
                return Err(ExtractError::SectionsNotFound);
            }
            SpecSections {
                contents: filtered,
                ..all_contents.clone()
            }
        }
        _ => all_contents.clone(),
    };

    Ok(ExtractedSpec { output, all_contents })
}

/// Spawn the browser with `--dump-dom` and capture the serialized DOM from
/// stdout. The child runs in a scratch directory and is killed on timeout.
async fn dump_dom(browser: &str, url: &str, timeout_secs: u64) -> Result<String, ExtractError> {
    let scratch = TempDir::new().map_err(|e| ExtractError::Spawn(e.to_string()))?;

    let mut cmd = Command::new(browser);
    cmd.arg("--headless")
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--dump-dom")
        .arg(url)
        .current_dir(scratch.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    debug!(browser = %browser, url = %url, "spawning headless browser");

    let wait = timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
    let output = match wait {
        // Timeout — kill_on_drop reaps the child when the future is dropped.
        Err(_elapsed) => {
            warn!(url = %url, secs = timeout_secs, "headless render timed out");
            return Err(ExtractError::Timeout(timeout_secs));
        }
        Ok(Err(e)) => return Err(ExtractError::Spawn(e.to_string())),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() && output.stdout.is_empty() {
        warn!(url = %url, status = ?output.status, "headless browser exited with non-zero status");
        return Err(ExtractError::NoOutput);
    }

    let html = String::from_utf8_lossy(&output.stdout).into_owned();
    if html.trim().is_empty() {
        return Err(ExtractError::NoOutput);
    }
    Ok(html)
}

fn on_path(binary: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            if Path::new(dir).join(binary).is_file() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_carries_the_internal_marker() {
        assert_eq!(
            page_url("http://127.0.0.1:8080", "/components/button/"),
            "http://127.0.0.1:8080/components/button/?internal=true"
        );
    }

    #[test]
    fn detect_browser_respects_preference_order() {
        // Binaries that cannot exist — detection must come back empty
        // rather than guessing.
        let candidates = vec![
            "specd-test-no-such-browser-1".to_string(),
            "specd-test-no-such-browser-2".to_string(),
        ];
        assert!(detect_browser(&candidates).is_none());
    }

    #[tokio::test]
    async fn extract_without_any_browser_fails_fast() {
        let cfg = ExtractorConfig {
            browsers: vec!["specd-test-no-such-browser".to_string()],
            timeout_secs: 1,
        };
        let spec = SpecInfo {
            spec_id: "components/button".into(),
            url: "/components/button/".into(),
            title: "Button".into(),
            directory: std::env::temp_dir(),
            template_hint: None,
        };
        let err = extract(&cfg, "http://127.0.0.1:1", &spec, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoBrowser));
    }
}
