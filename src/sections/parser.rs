// HTML segmentation — the native counterpart of the in-page section parser.
//
// Both extraction paths end here: the live extractor feeds it the DOM dumped
// by a headless browser, the cache-refresh path feeds it the page fetched
// over plain HTTP. Keeping one segmenter is what guarantees the cache/live
// shape contract.
//
// Headings h1..h4 delimit sections; nesting follows heading level. A
// section's raw content runs from its heading tag to the next heading of any
// level, so nested markup always lives on the child that owns it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::sections::model::{Resources, Section, SpecSections};

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-4])\b([^>]*)>(.*?)</h[1-4]\s*>").unwrap());
static ID_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bid\s*=\s*["']([^"']+)["']"#).unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>(.*?)</head\s*>").unwrap());
static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)</body\s*>").unwrap());
static CSS_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link\b[^>]*rel\s*=\s*["']?stylesheet["']?[^>]*>"#).unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());

/// Segment one rendered spec page into its section tree plus head/body
/// resource lists.
pub fn parse_spec(spec_id: &str, html: &str) -> SpecSections {
    let head = HEAD_RE
        .captures(html)
        .map(|c| c.get(1).unwrap().as_str())
        .unwrap_or("");
    // Pages without an explicit <body> are treated as all body.
    let body = BODY_RE
        .captures(html)
        .map(|c| c.get(1).unwrap().as_str())
        .unwrap_or(html);

    let mut contents = build_tree(body);
    assign_ids(&mut contents, &mut HashSet::new());
    assign_visual_ids(&mut contents, "");

    SpecSections {
        spec_id: spec_id.to_string(),
        contents,
        head_resources: collect_resources(head),
        body_resources: collect_resources(body),
    }
}

struct RawHeading {
    level: u8,
    anchor: Option<String>,
    header: String,
    start: usize,
}

fn build_tree(body: &str) -> Vec<Section> {
    let headings: Vec<RawHeading> = HEADING_RE
        .captures_iter(body)
        .map(|c| {
            let whole = c.get(0).unwrap();
            let attrs = c.get(2).unwrap().as_str();
            RawHeading {
                level: c.get(1).unwrap().as_str().parse().unwrap_or(1),
                anchor: ID_ATTR_RE
                    .captures(attrs)
                    .map(|m| m.get(1).unwrap().as_str().to_string()),
                header: strip_tags(c.get(3).unwrap().as_str()),
                start: whole.start(),
            }
        })
        .collect();

    let mut roots: Vec<Section> = Vec::new();
    let mut stack: Vec<(u8, Section)> = Vec::new();

    for (i, h) in headings.iter().enumerate() {
        let own_end = headings.get(i + 1).map(|n| n.start).unwrap_or(body.len());
        let section = Section {
            header: h.header.clone(),
            // Placeholder — anchors win over slugs once the whole tree exists
            // and collisions can be detected (assign_ids).
            id: h.anchor.clone().unwrap_or_default(),
            visual_id: String::new(),
            nested: Vec::new(),
            raw_content: strip_resources(&body[h.start..own_end]),
        };

        while let Some((level, _)) = stack.last() {
            if *level >= h.level {
                let (_, done) = stack.pop().unwrap();
                attach(done, &mut stack, &mut roots);
            } else {
                break;
            }
        }
        stack.push((h.level, section));
    }
    while let Some((_, done)) = stack.pop() {
        attach(done, &mut stack, &mut roots);
    }

    roots
}

fn attach(done: Section, stack: &mut Vec<(u8, Section)>, roots: &mut Vec<Section>) {
    match stack.last_mut() {
        Some((_, parent)) => parent.nested.push(done),
        None => roots.push(done),
    }
}

/// Pre-order pass making every id unique within the tree. Declared anchors
/// are preferred; missing or colliding ids fall back to a suffixed slug.
fn assign_ids(sections: &mut [Section], used: &mut HashSet<String>) {
    for section in sections {
        let base = if section.id.is_empty() {
            slugify(&section.header)
        } else {
            section.id.clone()
        };
        let mut id = base.clone();
        let mut n = 2;
        while !used.insert(id.clone()) {
            id = format!("{base}-{n}");
            n += 1;
        }
        section.id = id;
        assign_ids(&mut section.nested, used);
    }
}

fn assign_visual_ids(sections: &mut [Section], prefix: &str) {
    for (i, section) in sections.iter_mut().enumerate() {
        let label = if prefix.is_empty() {
            format!("{}", i + 1)
        } else {
            format!("{prefix}.{}", i + 1)
        };
        assign_visual_ids(&mut section.nested, &label);
        section.visual_id = label;
    }
}

fn collect_resources(region: &str) -> Resources {
    Resources {
        css_links: find_all(&CSS_LINK_RE, region),
        scripts: find_all(&SCRIPT_RE, region),
        css_styles: find_all(&STYLE_RE, region),
    }
}

fn find_all(re: &Regex, region: &str) -> Vec<String> {
    re.find_iter(region).map(|m| m.as_str().to_string()).collect()
}

/// Resource tags are carried by head/body resources and re-injected by the
/// template; left inline they would load twice.
fn strip_resources(html: &str) -> String {
    let out = SCRIPT_RE.replace_all(html, "");
    let out = STYLE_RE.replace_all(&out, "");
    let out = CSS_LINK_RE.replace_all(&out, "");
    out.trim().to_string()
}

fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}
