// Clarify template resolution and rendering.
//
// Resolution precedence: (1) a template co-located with the spec, when the
// spec's info.json declares one; (2) each `rendering.views` directory in
// merged (leaf-first) order; (3) the core-bundled views. A name that
// resolves nowhere falls back to "default" before failing, so a typoed
// ?tpl= never 500s unless the default itself is missing.
//
// Rendering is plain `{{name}}` placeholder substitution — section bodies
// are already HTML fragments, so values are inserted raw. No engine crate;
// templates are ordinary files.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::RenderingConfig;
use crate::tree::SpecInfo;

const DEFAULT_TEMPLATE: &str = "default";
const TEMPLATE_EXT: &str = "html";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// A resolved template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDescriptor {
    pub name: String,
    pub path: PathBuf,
}

/// A resolved template together with its source text, ready to render.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub descriptor: TemplateDescriptor,
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("could not find requested or default clarify template '{name}'")]
    NotFound {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template references unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
}

/// Directories searched for a template, in precedence order.
fn search_dirs(rendering: &RenderingConfig, core_views: &Path, spec: &SpecInfo) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(rendering.views.len() + 2);
    // An embedded template declared in info.json makes the spec's own
    // directory the first search location.
    if spec.template_hint.is_some() {
        dirs.push(spec.directory.clone());
    }
    dirs.extend(rendering.views.iter().cloned());
    dirs.push(core_views.to_path_buf());
    dirs
}

/// Resolve `name` against the precedence chain. `None` means no directory
/// holds `{name}.html`.
pub fn resolve(
    name: &str,
    rendering: &RenderingConfig,
    core_views: &Path,
    spec: &SpecInfo,
) -> Option<TemplateDescriptor> {
    for dir in search_dirs(rendering, core_views, spec) {
        let path = dir.join(format!("{name}.{TEMPLATE_EXT}"));
        if path.is_file() {
            return Some(TemplateDescriptor {
                name: name.to_string(),
                path,
            });
        }
    }
    None
}

/// Resolve and read the template for a request. An unresolvable requested
/// name falls back to "default"; when that is missing too, the raw name is
/// opened directly so the failure is a natural file-not-found.
pub async fn load(
    requested: Option<&str>,
    rendering: &RenderingConfig,
    core_views: &Path,
    spec: &SpecInfo,
) -> Result<LoadedTemplate, TemplateError> {
    let name = requested.unwrap_or(DEFAULT_TEMPLATE);

    let descriptor = resolve(name, rendering, core_views, spec)
        .or_else(|| {
            if name == DEFAULT_TEMPLATE {
                None
            } else {
                resolve(DEFAULT_TEMPLATE, rendering, core_views, spec)
            }
        })
        .unwrap_or_else(|| TemplateDescriptor {
            name: name.to_string(),
            path: PathBuf::from(name),
        });

    let source = tokio::fs::read_to_string(&descriptor.path)
        .await
        .map_err(|source| TemplateError::NotFound {
            name: name.to_string(),
            source,
        })?;

    Ok(LoadedTemplate { descriptor, source })
}

/// All distinct template names visible across the core and user view
/// directories, core first. A missing user directory is an empty addition,
/// not an error; a missing core directory is.
pub async fn list(core_views: &Path, user_views: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    collect_names(core_views, &mut names)
        .await
        .map_err(|e| anyhow::anyhow!("could not read directory with clarify templates: {e}"))?;

    match collect_names(user_views, &mut names).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(anyhow::anyhow!(
                "could not read user directory with clarify templates: {e}"
            ))
        }
    }

    Ok(names)
}

async fn collect_names(dir: &Path, names: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXT) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                found.push(stem.to_string());
            }
        }
    }
    // Directory iteration order is platform-defined; keep listings stable.
    found.sort();
    for name in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(())
}

/// Substitute `{{name}}` placeholders. Values are inserted raw; an unknown
/// placeholder is a render failure, not silent emptiness.
pub fn render(source: &str, vars: &HashMap<&str, String>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        let key = caps.get(1).unwrap().as_str();
        let value = vars
            .get(key)
            .ok_or_else(|| RenderError::UnknownPlaceholder(key.to_string()))?;
        out.push_str(&source[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&source[last..]);
    Ok(out)
}
