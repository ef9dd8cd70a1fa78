use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOSTNAME: &str = "127.0.0.1";
const DEFAULT_LOG: &str = "info";
const CONFIG_FILE: &str = "specd.toml";
const DIR_OPTIONS_FILE: &str = "options.toml";

// ─── Server mode ─────────────────────────────────────────────────────────────

/// `development` logs full error detail for render failures; `production`
/// suppresses it from logs and response bodies alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn is_development(self) -> bool {
        matches!(self, Mode::Development)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            other => Err(format!("unknown mode '{other}' (expected development|production)")),
        }
    }
}

// ─── ExtractorConfig ─────────────────────────────────────────────────────────

/// Headless renderer configuration (`[extractor]` in specd.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Browser binaries to probe on PATH, in preference order.
    pub browsers: Vec<String>,
    /// Render timeout in seconds. The browser is killed on expiry; there is
    /// no retry.
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            browsers: vec![
                "chromium".to_string(),
                "chrome".to_string(),
                "google-chrome".to_string(),
                "chromium-browser".to_string(),
            ],
            timeout_secs: 15,
        }
    }
}

// ─── TOML config file ────────────────────────────────────────────────────────

/// `{content_dir}/specd.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlConfig {
    port: Option<u16>,
    hostname: Option<String>,
    /// Log level filter string, e.g. "debug", "info,specd=trace".
    log: Option<String>,
    mode: Option<Mode>,
    /// Directory with user-supplied clarify templates, relative to the
    /// content root unless absolute.
    user_views: Option<PathBuf>,
    /// Disable the content-tree watcher.
    watch: Option<bool>,
    extractor: Option<ExtractorConfig>,
}

// ─── ServerConfig ────────────────────────────────────────────────────────────

/// Resolved server configuration. Constructed once at startup and handed by
/// `Arc` into every component — nothing reads ambient globals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    /// Root of the managed spec tree; also the static-content root.
    pub content_dir: PathBuf,
    /// Where the SQLite section cache lives.
    pub data_dir: PathBuf,
    pub log: String,
    pub mode: Mode,
    /// Bundled clarify templates shipped with specd.
    pub core_views: PathBuf,
    /// User clarify templates; a missing directory is fine.
    pub user_views: PathBuf,
    pub watch: bool,
    pub extractor: ExtractorConfig,
}

impl ServerConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port: Option<u16>,
        hostname: Option<String>,
        content_dir: PathBuf,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        mode: Option<Mode>,
        core_views: Option<PathBuf>,
        no_watch: bool,
    ) -> Self {
        let file = load_toml(&content_dir.join(CONFIG_FILE));

        let user_views = match file.user_views {
            Some(p) if p.is_absolute() => p,
            Some(p) => content_dir.join(p),
            None => content_dir.join("views/clarify"),
        };

        Self {
            port: port.or(file.port).unwrap_or(DEFAULT_PORT),
            hostname: hostname
                .or(file.hostname)
                .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            data_dir: data_dir.unwrap_or_else(|| content_dir.join(".specd")),
            log: log.or(file.log).unwrap_or_else(|| DEFAULT_LOG.to_string()),
            mode: mode.or(file.mode).unwrap_or(Mode::Development),
            core_views: core_views.unwrap_or_else(|| PathBuf::from("core/views/clarify")),
            user_views,
            watch: if no_watch { false } else { file.watch.unwrap_or(true) },
            extractor: file.extractor.unwrap_or_default(),
            content_dir,
        }
    }

    /// Loopback base URL the extractor and the ingestion fetch dial back into.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

fn load_toml(path: &Path) -> TomlConfig {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return TomlConfig::default();
    };
    match toml::from_str(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "invalid specd.toml, using defaults");
            TomlConfig::default()
        }
    }
}

// ─── Per-directory rendering options ─────────────────────────────────────────

/// `options.toml` found in any directory between the content root and a spec.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DirOptions {
    rendering: RenderingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RenderingSection {
    /// Template search directories, relative to the directory declaring them
    /// unless absolute.
    views: Vec<PathBuf>,
}

/// Effective per-spec rendering configuration, computed fresh per request.
#[derive(Debug, Clone, Default)]
pub struct RenderingConfig {
    /// Template search order, leaf first: the spec directory's own
    /// `options.toml` entries come before every ancestor's, so a leaf can
    /// both add locations and shadow inherited template names. The
    /// core-bundled views are appended last by the template resolver, not
    /// recorded here.
    pub views: Vec<PathBuf>,
}

/// Merge `options.toml` layers from `spec_dir` up to (and including)
/// `content_root`. `rendering.views` concatenates leaf-first; it never
/// plainly overrides, so inherited search locations survive.
pub fn resolve_rendering(content_root: &Path, spec_dir: &Path) -> RenderingConfig {
    let mut views = Vec::new();
    let mut dir = spec_dir;

    loop {
        let options_path = dir.join(DIR_OPTIONS_FILE);
        if let Ok(raw) = std::fs::read_to_string(&options_path) {
            match toml::from_str::<DirOptions>(&raw) {
                Ok(opts) => {
                    for v in opts.rendering.views {
                        views.push(if v.is_absolute() { v } else { dir.join(v) });
                    }
                }
                Err(e) => {
                    warn!(path = %options_path.display(), err = %e, "invalid options.toml, skipping layer");
                }
            }
        }

        if dir == content_root {
            break;
        }
        match dir.parent() {
            // Spec dir escaped the content root — stop rather than walk to /.
            Some(parent) if dir.starts_with(content_root) => dir = parent,
            _ => break,
        }
    }

    RenderingConfig { views }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn views_concatenate_leaf_first() {
        let root = TempDir::new().unwrap();
        let spec_dir = root.path().join("components/button");
        std::fs::create_dir_all(&spec_dir).unwrap();

        std::fs::write(
            root.path().join("options.toml"),
            "[rendering]\nviews = [\"shared-views\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.path().join("components/options.toml"),
            "[rendering]\nviews = [\"mid-views\"]\n",
        )
        .unwrap();
        std::fs::write(
            spec_dir.join("options.toml"),
            "[rendering]\nviews = [\"local-views\"]\n",
        )
        .unwrap();

        let rendering = resolve_rendering(root.path(), &spec_dir);
        assert_eq!(
            rendering.views,
            vec![
                spec_dir.join("local-views"),
                root.path().join("components/mid-views"),
                root.path().join("shared-views"),
            ]
        );
    }

    #[test]
    fn missing_options_files_yield_empty_config() {
        let root = TempDir::new().unwrap();
        let spec_dir = root.path().join("a/b");
        std::fs::create_dir_all(&spec_dir).unwrap();
        assert!(resolve_rendering(root.path(), &spec_dir).views.is_empty());
    }

    #[test]
    fn cli_overrides_beat_toml_file() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("specd.toml"), "port = 9000\nlog = \"debug\"\n").unwrap();

        let cfg = ServerConfig::new(
            Some(4400),
            None,
            root.path().to_path_buf(),
            None,
            None,
            None,
            None,
            false,
        );
        assert_eq!(cfg.port, 4400);
        assert_eq!(cfg.log, "debug");
        assert!(cfg.mode.is_development());
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let root = TempDir::new().unwrap();
        let cfg = ServerConfig::new(
            None,
            None,
            root.path().to_path_buf(),
            None,
            None,
            None,
            None,
            false,
        );
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.hostname, "127.0.0.1");
        assert!(cfg.watch);
        assert_eq!(cfg.extractor.timeout_secs, 15);
    }
}
