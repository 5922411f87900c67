//! crates/walk/src/detect.rs
//!
//! Per-entry change detection: recorded stat tuple vs the filesystem.

use checksums::{Md5, sidecar};
use base::Result;
use base::status::{ChangeFlag, StatusBits};
use metadata::{FileKind, StatInfo};
use tree::{Entry, EntryId, EntryStore, Payload};
use waa::{Waa, ext};
use tracing::debug;

/// Compares the recorded entry against a fresh `lstat` result and returns
/// its local status. `current` is `None` when the path is gone.
///
/// Regular files whose size matches but whose mtime moved get the soft
/// [`StatusBits::LIKELY`] bit; [`resolve_likely`] settles it by content.
/// Symlink content is settled immediately (hashing the target is cheap).
#[must_use]
pub fn detect_entry(entry: &Entry, current: Option<&StatInfo>, link_target: Option<&str>) -> StatusBits {
    let Some(cur) = current else {
        return StatusBits::REMOVED;
    };

    let recorded = &entry.meta;
    let mut status = StatusBits::empty();

    if recorded.kind() != cur.kind() {
        return StatusBits::REPLACED;
    }

    if recorded.mtime_differs(cur) {
        status |= StatusBits::META_MTIME;
    }
    if recorded.uid != cur.uid {
        status |= StatusBits::META_OWNER;
    }
    if recorded.gid != cur.gid {
        status |= StatusBits::META_GROUP;
    }
    if recorded.perm_bits() != cur.perm_bits() {
        status |= StatusBits::META_UMODE;
    }

    match cur.kind() {
        FileKind::File => {
            if recorded.size_or_rdev != cur.size_or_rdev {
                status |= StatusBits::CHANGED;
            } else if recorded.mtime_differs(cur) {
                status |= StatusBits::LIKELY;
            }
        }
        FileKind::Symlink => {
            if let Some(target) = link_target {
                let current_md5 = Md5::digest(target.as_bytes());
                let recorded_md5 = entry.file().map(|f| f.md5).unwrap_or_default();
                if current_md5 != recorded_md5 {
                    status |= StatusBits::CHANGED;
                }
            }
        }
        FileKind::BlockDev | FileKind::CharDev => {
            if recorded.size_or_rdev != cur.size_or_rdev {
                status |= StatusBits::CHANGED;
            }
        }
        FileKind::Directory | FileKind::Garbage => {}
    }

    status
}

/// Settles a `LIKELY` entry by comparing content through the stored
/// block hashes. The change flag is sticky: a second call within the run
/// reuses the first verdict without re-reading the file.
pub fn resolve_likely(
    store: &mut EntryStore,
    id: EntryId,
    waa: &Waa,
    abs_path: &std::path::Path,
) -> Result<()> {
    let entry = store.get(id);
    if !matches!(entry.payload, Payload::File(_)) || entry.meta.kind() != FileKind::File {
        return Ok(());
    }
    let recorded_md5 = entry.file().expect("file payload").md5;

    let flag = match entry.file().expect("file payload").change_flag {
        ChangeFlag::Unknown => {
            let stored = match waa.read(abs_path, ext::MD5S) {
                Ok(bytes) => Some(sidecar::parse(&bytes)?),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            let outcome = checksums::compare_file(abs_path, recorded_md5, stored.as_ref())?;
            debug!(path = %abs_path.display(), ?outcome.flag, "content check");
            let file = store.get_mut(id).file_mut().expect("file payload");
            file.change_flag = outcome.flag;
            file.md5 = outcome.md5;
            outcome.flag
        }
        known => known,
    };

    let entry = store.get_mut(id);
    entry.entry_status -= StatusBits::LIKELY;
    match flag {
        ChangeFlag::Changed => entry.entry_status |= StatusBits::CHANGED,
        ChangeFlag::NotChanged => entry.entry_status -= StatusBits::CHANGED,
        ChangeFlag::Unknown => {}
    }
    Ok(())
}
