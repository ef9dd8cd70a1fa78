// html_api — the cached section API.
//
// Mirrors the live extractor's output shape exactly so the clarify
// orchestrator can treat both sources uniformly. Refreshes are atomic per
// spec (single-statement overwrite); refreshes of different specs are
// independent and take no cross-spec lock.

pub mod ingest;
pub mod store;

pub use store::HtmlStore;
