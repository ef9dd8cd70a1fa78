// Section tree data model — shared by the live extractor and the cached API.
//
// The two sources must produce structurally identical values so the clarify
// orchestrator never has to know where a tree came from. The whole model is
// serde-round-trippable because the cache stores entries as JSON.

use serde::{Deserialize, Serialize};

/// One named, identified fragment of a spec's rendered markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Plain-text heading of the section.
    pub header: String,

    /// Unique within one spec tree. Taken from the heading's `id` anchor when
    /// present, otherwise slugified from the header text; collisions get a
    /// `-2`, `-3`… suffix.
    pub id: String,

    /// Hierarchical display label (`1`, `1.2`, `1.2.1`). May repeat across
    /// specs; never used as a lookup key.
    #[serde(rename = "visualID")]
    pub visual_id: String,

    /// Child sections in document order. Forms a tree — no cycles, no shared
    /// children.
    pub nested: Vec<Section>,

    /// The section's own HTML, from its heading tag up to the next heading
    /// of any level. Nested sections' markup lives on the children.
    #[serde(rename = "rawContent")]
    pub raw_content: String,
}

/// Resource tags collected from one region (`<head>` or `<body>`) of a spec
/// page. Order is author-declared and must be preserved — it affects how the
/// re-rendered page resolves styles and scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Full `<link rel="stylesheet" …>` tags.
    #[serde(rename = "cssLinks")]
    pub css_links: Vec<String>,

    /// Full `<script …>…</script>` tags, inline and external alike.
    pub scripts: Vec<String>,

    /// Full inline `<style>…</style>` blocks.
    #[serde(rename = "cssStyles")]
    pub css_styles: Vec<String>,
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.css_links.is_empty() && self.scripts.is_empty() && self.css_styles.is_empty()
    }
}

/// The full decomposition of one spec page.
///
/// Either fully present or absent — partially built values are never handed
/// to the orchestrator, and the cache overwrites entries wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecSections {
    #[serde(rename = "specID")]
    pub spec_id: String,

    /// Top-level sections in document order.
    pub contents: Vec<Section>,

    #[serde(rename = "headResources")]
    pub head_resources: Resources,

    #[serde(rename = "bodyResources")]
    pub body_resources: Resources,
}

/// Flattened index entry for the client-side metadata blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRef {
    pub header: String,
    pub id: String,
    #[serde(rename = "visualID")]
    pub visual_id: String,
}
