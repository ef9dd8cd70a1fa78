// Debounced watcher on the content root, driving tree rescans.
//
// The section cache lives inside the content root by default
// (`{content_dir}/.specd`), so raw events must be filtered: every cache
// write would otherwise bounce straight back into a full rescan. Events are
// dropped unless at least one path could affect the spec index, mirroring
// the scan's own skip rules (hidden directories, node_modules).

use anyhow::Result;
use notify_debouncer_full::{
    new_debouncer,
    notify::{RecursiveMode, Watcher},
    DebounceEventResult, DebouncedEvent,
};
use std::{path::Path, time::Duration};
use tracing::{debug, warn};

pub type ContentWatcher = notify_debouncer_full::Debouncer<
    notify_debouncer_full::notify::RecommendedWatcher,
    notify_debouncer_full::FileIdMap,
>;

/// Watch the content root and invoke `on_change` (debounced) whenever spec
/// markup may have changed. Events wholly inside `data_dir` or hidden /
/// ignored directories never fire.
pub fn start_watcher<F>(content_root: &Path, data_dir: &Path, on_change: F) -> Result<ContentWatcher>
where
    F: Fn() + Send + 'static,
{
    let data_dir = data_dir.to_path_buf();
    let mut debouncer = new_debouncer(
        Duration::from_millis(300),
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                if events.iter().any(|e| event_affects_tree(e, &data_dir)) {
                    on_change();
                } else {
                    debug!(events = events.len(), "ignored content events");
                }
            }
            Err(errors) => {
                for e in errors {
                    warn!(err = %e, "content watcher error");
                }
            }
        },
    )?;

    debouncer
        .watcher()
        .watch(content_root, RecursiveMode::Recursive)?;

    Ok(debouncer)
}

fn event_affects_tree(event: &DebouncedEvent, data_dir: &Path) -> bool {
    event.paths.iter().any(|p| affects_tree(p, data_dir))
}

/// True when a change at `path` can alter the spec index. The skip set must
/// stay in sync with the scan's walk rules.
fn affects_tree(path: &Path, data_dir: &Path) -> bool {
    if path.starts_with(data_dir) {
        return false;
    }
    !path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('.') || name == "node_modules"
    })
}
