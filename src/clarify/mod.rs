// Clarify — extracts named sections of a spec's rendered page and re-wraps
// them in a chosen template for isolated inspection or embedding.
//
// Runs as a middleware layer: any request whose query carries `clarify` is
// handled here end to end; everything else passes through untouched.
//
// Stages: ParseRequest → {LiveExtract | CacheLookup(+Refresh)} ∥
// TemplateListing → Render → Respond. Every stage has its own failure
// message; no internal error reaches the client raw.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use crate::extractor::{self, ExtractError, ExtractedSpec};
use crate::html_api::ingest;
use crate::sections::{self, Section, SpecSections};
use crate::templates::{self, RenderError, TemplateError};
use crate::AppContext;

// ─── Query flags ─────────────────────────────────────────────────────────────

/// Parsed clarify query flags. `clarify` gates activation; the rest shape
/// the one request.
#[derive(Debug, Default, PartialEq)]
pub struct ClarifyFlags {
    pub active: bool,
    pub tpl: Option<String>,
    pub from_api: bool,
    pub api_update: bool,
    pub nojs: bool,
    pub sections: Option<Vec<String>>,
}

pub fn parse_query(query: &str) -> ClarifyFlags {
    let mut flags = ClarifyFlags::default();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        match key {
            "clarify" => flags.active = boolish(value),
            "tpl" if !value.is_empty() => flags.tpl = Some(value.to_string()),
            "fromApi" => flags.from_api = boolish(value),
            "apiUpdate" => flags.api_update = boolish(value),
            "nojs" => flags.nojs = boolish(value),
            "sections" if !value.is_empty() => {
                flags.sections = Some(
                    value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            _ => {}
        }
    }
    flags
}

/// Presence counts as true; only explicit `0`/`false` negate.
fn boolish(value: &str) -> bool {
    !matches!(value, "0" | "false")
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// One variant per pipeline stage; the Display string is the user-facing
/// message. Everything maps to a 500 — failures are never dressed up as
/// success, and no variant carries internal detail outward.
#[derive(Debug, thiserror::Error)]
pub enum ClarifyError {
    #[error(
        "Clarify did not find any information about requested spec, please check \
         the URL or update the file tree via /api/updateFileTree."
    )]
    SpecNotFound,

    #[error("Clarify did not find any of requested sections.")]
    SectionsNotFound,

    #[error("Clarify headless renderer error.")]
    Extraction(#[source] ExtractError),

    #[error("Could not find requested or default template for Clarify.")]
    Template(#[from] TemplateError),

    #[error("Clarify template rendering failed.")]
    Render(#[source] RenderError),

    #[error("Failed updating HTML Spec API.")]
    ApiUpdate(#[source] anyhow::Error),

    #[error("Clarify: error in data preparation.")]
    Internal(#[from] anyhow::Error),
}

impl From<ExtractError> for ClarifyError {
    fn from(e: ExtractError) -> Self {
        match e {
            // Zero matching sections is its own user-facing condition, not a
            // renderer fault.
            ExtractError::SectionsNotFound => ClarifyError::SectionsNotFound,
            other => ClarifyError::Extraction(other),
        }
    }
}

// ─── Middleware ──────────────────────────────────────────────────────────────

/// Intercept requests carrying the `clarify` flag; pass everything else to
/// the next handler untouched.
pub async fn intercept(State(ctx): State<Arc<AppContext>>, req: Request, next: Next) -> Response {
    let flags = parse_query(req.uri().query().unwrap_or(""));
    if !flags.active {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    match handle(&ctx, &path, flags).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path, err = %e, "clarify request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

async fn handle(ctx: &AppContext, path: &str, flags: ClarifyFlags) -> Result<String, ClarifyError> {
    // ParseRequest: resolve the spec.
    let spec = ctx.tree.lookup(path).await.ok_or(ClarifyError::SpecNotFound)?;

    // A cache miss forces an implicit refresh regardless of the request flag.
    let has_api_data = ctx.store.has(&spec.spec_id).await?;
    let api_update = flags.api_update || !has_api_data;

    let rendering = crate::config::resolve_rendering(&ctx.config.content_dir, &spec.directory);
    let base_url = ctx.config.base_url();
    let wanted = flags.sections;

    // Extraction and template listing are independent; await both jointly
    // and short-circuit on whichever fails first.
    let spec_fut = async {
        if flags.from_api {
            cached_lookup(ctx, &spec, wanted.as_deref(), api_update, &base_url).await
        } else {
            extractor::extract(&ctx.config.extractor, &base_url, &spec, wanted.as_deref())
                .await
                .map_err(ClarifyError::from)
        }
    };
    let tpl_fut = async {
        templates::list(&ctx.config.core_views, &ctx.config.user_views)
            .await
            .map_err(ClarifyError::Internal)
    };
    let (data, tpl_list) = tokio::try_join!(spec_fut, tpl_fut)?;

    if data.output.contents.is_empty() {
        return Err(ClarifyError::SectionsNotFound);
    }

    // Client metadata indexes the FULL tree even when a subset was requested.
    let sections_id_list = sections::flatten(&data.all_contents.contents);
    let clarify_data = format!(
        "<script>var sourceClarifyData = {}</script>",
        serde_json::to_string(&json!({
            // The cached section API is always available here, so the client
            // can always offer the API target.
            "showApiTargetOption": true,
            "specUrl": spec.url,
            "sectionsIDList": sections_id_list,
            "tplList": tpl_list,
        }))
        .map_err(anyhow::Error::from)?
    );

    let vars = template_vars(&spec.title, &data.output, flags.nojs, clarify_data);

    let loaded = templates::load(
        flags.tpl.as_deref(),
        &rendering,
        &ctx.config.core_views,
        &spec,
    )
    .await?;

    templates::render(&loaded.source, &vars).map_err(|e| {
        // Full detail is development-only; production logs and responses get
        // the generic message alike.
        if ctx.config.mode.is_development() {
            error!(
                template = %loaded.descriptor.path.display(),
                err = %e,
                "clarify template rendering failed"
            );
        }
        ClarifyError::Render(e)
    })
}

/// The cached branch: optional refresh, then lookup. Output shape matches
/// the live extractor exactly.
async fn cached_lookup(
    ctx: &AppContext,
    spec: &crate::tree::SpecInfo,
    wanted: Option<&[String]>,
    api_update: bool,
    base_url: &str,
) -> Result<ExtractedSpec, ClarifyError> {
    if api_update {
        ingest::refresh(&ctx.http, &ctx.store, base_url, spec)
            .await
            .map_err(ClarifyError::ApiUpdate)?;
    }

    let all_contents = ctx
        .store
        .get_by_id(&spec.spec_id)
        .await?
        .ok_or(ClarifyError::SpecNotFound)?;

    let output = match wanted {
        Some(ids) if !ids.is_empty() => ctx
            .store
            .get_by_section(&spec.spec_id, ids)
            .await?
            .ok_or(ClarifyError::SectionsNotFound)?,
        _ => all_contents.clone(),
    };

    Ok(ExtractedSpec { output, all_contents })
}

/// Build the placeholder map for the wrapper template. Resource categories
/// are joined into one block each, order preserved, empty string when the
/// category is absent. `nojs` blanks every script injection.
fn template_vars(
    title: &str,
    output: &SpecSections,
    nojs: bool,
    clarify_data: String,
) -> HashMap<&'static str, String> {
    let join = |items: &[String]| items.join("\n");

    let mut vars = HashMap::from([
        ("title", title.to_string()),
        ("sections", sections_html(&output.contents)),
        ("nojs", if nojs { "true".to_string() } else { String::new() }),
        ("head_css_links", join(&output.head_resources.css_links)),
        ("head_css_styles", join(&output.head_resources.css_styles)),
        ("head_scripts", join(&output.head_resources.scripts)),
        ("body_css_links", join(&output.body_resources.css_links)),
        ("body_css_styles", join(&output.body_resources.css_styles)),
        ("body_scripts", join(&output.body_resources.scripts)),
        ("clarify_data", clarify_data),
    ]);

    if nojs {
        vars.insert("head_scripts", String::new());
        vars.insert("body_scripts", String::new());
        vars.insert("clarify_data", String::new());
    }
    vars
}

/// Re-assemble extracted sections into one HTML block, children inside their
/// parent's wrapper.
fn sections_html(contents: &[Section]) -> String {
    let mut out = String::new();
    for section in contents {
        out.push_str("<div class=\"clarify-section\">\n");
        out.push_str(&section.raw_content);
        out.push('\n');
        out.push_str(&sections_html(&section.nested));
        out.push_str("</div>\n");
    }
    out
}
