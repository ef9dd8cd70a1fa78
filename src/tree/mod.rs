// File tree — the scanned index of all specs under the content root.
//
// A directory is a spec when it contains an `index.html`. Optional metadata
// comes from an `info.json` beside it. The clarify pipeline only ever reads
// this index; scans happen on startup, on `/api/updateFileTree`, and from
// the debounced watcher.

pub mod watcher;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

const SPEC_PAGE: &str = "index.html";
const SPEC_META: &str = "info.json";

/// Location and declared metadata of one spec.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecInfo {
    /// Stable identifier derived from the path relative to the content root
    /// (`components/button`). The live extractor and the cached API key by
    /// this, so derivation must stay deterministic.
    pub spec_id: String,
    /// Canonical URL of the rendered page (`/components/button/`).
    pub url: String,
    pub title: String,
    /// Absolute path of the spec directory.
    pub directory: PathBuf,
    /// Template name declared in `info.json`; enables spec-co-located
    /// template lookup in the resolver.
    pub template_hint: Option<String>,
}

/// `info.json` shape. Every field is optional; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct SpecMeta {
    title: Option<String>,
    template: Option<String>,
}

/// Scanned spec index. Rebuilt wholesale by `scan()` and swapped atomically,
/// so lookups between rescans are deterministic and never observe a
/// half-built tree.
pub struct FileTree {
    root: PathBuf,
    specs: RwLock<HashMap<String, SpecInfo>>,
}

impl FileTree {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            specs: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the content root and replace the index. Returns the number of
    /// specs found.
    pub async fn scan(&self) -> Result<usize> {
        let root = self.root.clone();
        let found = tokio::task::spawn_blocking(move || scan_dir(&root))
            .await
            .context("file-tree scan task failed")??;

        let count = found.len();
        *self.specs.write().await = found;
        info!(specs = count, root = %self.root.display(), "file tree scanned");
        Ok(count)
    }

    /// Resolve a request path to a spec. `/components/button`,
    /// `/components/button/` and `/components/button/index.html` all map to
    /// the same spec.
    pub async fn lookup(&self, request_path: &str) -> Option<SpecInfo> {
        let spec_id = normalize_path(request_path);
        self.specs.read().await.get(&spec_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.specs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.specs.read().await.is_empty()
    }

    /// All known spec ids, unordered. Used by bulk cache refreshes.
    pub async fn spec_ids(&self) -> Vec<String> {
        self.specs.read().await.keys().cloned().collect()
    }
}

/// Derive the spec id a request path refers to. Shared by every lookup so
/// cache keys and live extraction agree.
pub fn normalize_path(request_path: &str) -> String {
    let path = request_path.split(['?', '#']).next().unwrap_or("");
    path.trim_matches('/')
        .trim_end_matches("index.html")
        .trim_matches('/')
        .to_string()
}

fn scan_dir(root: &Path) -> Result<HashMap<String, SpecInfo>> {
    let mut specs = HashMap::new();
    walk(root, root, &mut specs)?;
    Ok(specs)
}

fn walk(dir: &Path, root: &Path, specs: &mut HashMap<String, SpecInfo>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read content directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }

        if path.join(SPEC_PAGE).is_file() {
            if let Some(spec) = read_spec(&path, root) {
                debug!(spec_id = %spec.spec_id, "spec discovered");
                specs.insert(spec.spec_id.clone(), spec);
            }
        }
        walk(&path, root, specs)?;
    }
    Ok(())
}

fn read_spec(dir: &Path, root: &Path) -> Option<SpecInfo> {
    let rel = dir.strip_prefix(root).ok()?;
    let spec_id = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    // The content root itself is never a spec.
    if spec_id.is_empty() {
        return None;
    }

    let meta: SpecMeta = std::fs::read_to_string(dir.join(SPEC_META))
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let title = meta.title.unwrap_or_else(|| {
        spec_id
            .rsplit('/')
            .next()
            .unwrap_or(&spec_id)
            .to_string()
    });

    Some(SpecInfo {
        url: format!("/{spec_id}/"),
        title,
        directory: dir.to_path_buf(),
        template_hint: meta.template,
        spec_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_spec(root: &Path, rel: &str, info: Option<&str>) {
        let dir = root.join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<body><h1>X</h1></body>").unwrap();
        if let Some(json) = info {
            std::fs::write(dir.join("info.json"), json).unwrap();
        }
    }

    #[tokio::test]
    async fn scan_finds_nested_specs_and_derives_ids() {
        let root = TempDir::new().unwrap();
        make_spec(root.path(), "components/button", None);
        make_spec(root.path(), "patterns/forms/login", None);

        let tree = FileTree::new(root.path().to_path_buf());
        assert_eq!(tree.scan().await.unwrap(), 2);

        let spec = tree.lookup("/components/button/").await.unwrap();
        assert_eq!(spec.spec_id, "components/button");
        assert_eq!(spec.url, "/components/button/");
        assert_eq!(spec.title, "button");
        assert!(tree.lookup("/patterns/forms/login").await.is_some());
    }

    #[tokio::test]
    async fn lookup_normalizes_trailing_slash_and_index_html() {
        let root = TempDir::new().unwrap();
        make_spec(root.path(), "components/button", None);
        let tree = FileTree::new(root.path().to_path_buf());
        tree.scan().await.unwrap();

        for path in [
            "/components/button",
            "/components/button/",
            "/components/button/index.html",
        ] {
            let spec = tree.lookup(path).await.expect(path);
            assert_eq!(spec.spec_id, "components/button");
        }
    }

    #[tokio::test]
    async fn info_json_supplies_title_and_template_hint() {
        let root = TempDir::new().unwrap();
        make_spec(
            root.path(),
            "components/button",
            Some(r#"{"title": "Button", "template": "embedded"}"#),
        );
        let tree = FileTree::new(root.path().to_path_buf());
        tree.scan().await.unwrap();

        let spec = tree.lookup("/components/button").await.unwrap();
        assert_eq!(spec.title, "Button");
        assert_eq!(spec.template_hint.as_deref(), Some("embedded"));
    }

    #[tokio::test]
    async fn unknown_paths_resolve_to_none() {
        let root = TempDir::new().unwrap();
        make_spec(root.path(), "components/button", None);
        let tree = FileTree::new(root.path().to_path_buf());
        tree.scan().await.unwrap();

        assert!(tree.lookup("/unknown/spec").await.is_none());
        assert!(tree.lookup("/").await.is_none());
    }

    #[tokio::test]
    async fn repeated_lookups_are_deterministic_between_scans() {
        let root = TempDir::new().unwrap();
        make_spec(root.path(), "components/button", None);
        let tree = FileTree::new(root.path().to_path_buf());
        tree.scan().await.unwrap();

        let a = tree.lookup("/components/button").await.unwrap();
        let b = tree.lookup("/components/button").await.unwrap();
        assert_eq!(a, b);

        make_spec(root.path(), "components/input", None);
        // Not visible until a rescan.
        assert!(tree.lookup("/components/input").await.is_none());
        tree.scan().await.unwrap();
        assert!(tree.lookup("/components/input").await.is_some());
    }
}
