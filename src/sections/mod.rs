pub mod model;
pub mod parser;

pub use model::{Resources, Section, SectionRef, SpecSections};
pub use parser::parse_spec;

use std::collections::HashSet;

/// Flatten a section tree into a pre-order (id, header, visualID) index.
///
/// The clarify client metadata always indexes the FULL tree, even when the
/// response body carries only a requested subset, so callers must pass
/// `allContents` here — never the filtered tree.
pub fn flatten(contents: &[Section]) -> Vec<SectionRef> {
    let mut out = Vec::new();
    for section in contents {
        out.push(SectionRef {
            header: section.header.clone(),
            id: section.id.clone(),
            visual_id: section.visual_id.clone(),
        });
        out.extend(flatten(&section.nested));
    }
    out
}

/// Select the sections whose id is in `wanted`, keeping each match's whole
/// subtree. Non-matching nodes are descended into, so a nested match
/// surfaces at the top level of the result.
///
/// Both the cached API and the live extractor filter through this function,
/// which is what makes `get_by_section(id, s) == filter(get_by_id(id), s)`
/// hold.
pub fn filter(contents: &[Section], wanted: &HashSet<String>) -> Vec<Section> {
    let mut out = Vec::new();
    for section in contents {
        if wanted.contains(&section.id) {
            out.push(section.clone());
        } else {
            out.extend(filter(&section.nested, wanted));
        }
    }
    out
}
