//! crates/cli/src/output.rs
//!
//! Status line rendering: a four-column change summary, the size, and
//! the path.

use base::status::{EntryFlags, StatusBits};
use tree::{EntryId, EntryStore};

/// Renders one entry's status line, or `None` when there is nothing
/// worth showing at this verbosity.
#[must_use]
pub fn status_line(store: &EntryStore, id: EntryId, verbosity: u8) -> Option<String> {
    let entry = store.get(id);
    let status = entry.entry_status;

    let worth_showing = status.intersects(StatusBits::CHANGE_MASK | StatusBits::LIKELY)
        || entry.flags.contains(EntryFlags::PRINT)
        || verbosity >= 2;
    if !worth_showing {
        return None;
    }

    let first = if status.is_replaced() {
        'R'
    } else if status.contains(StatusBits::NEW) {
        'N'
    } else if status.contains(StatusBits::REMOVED) {
        'D'
    } else if status.contains(StatusBits::CHANGED) {
        'C'
    } else {
        '.'
    };
    let meta = if status.intersects(StatusBits::META_CHANGED) {
        'm'
    } else {
        '.'
    };
    let props = if status.contains(StatusBits::PROPERTIES) {
        'P'
    } else {
        '.'
    };
    let likely = if status.contains(StatusBits::LIKELY) {
        '?'
    } else {
        '.'
    };

    let size = entry
        .local_meta
        .as_ref()
        .unwrap_or(&entry.meta);
    let size_column = if size.is_dir() {
        "dir".to_owned()
    } else {
        size.size_or_rdev.to_string()
    };

    let rel = store.rel_str(id);
    let shown = if rel.is_empty() {
        ".".to_owned()
    } else {
        format!("./{rel}")
    };

    Some(format!("{first}{meta}{props}{likely} {size_column:>10}  {shown}"))
}
