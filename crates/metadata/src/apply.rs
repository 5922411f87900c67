//! crates/metadata/src/apply.rs
//!
//! Writing recorded meta-data back to the filesystem.

use crate::{FileKind, StatInfo, lchown};
use base::Result;
use base::error::ResultExt;
use base::status::StatusBits;
use filetime::FileTime;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Applies the meta-data parts named by `which` to `path`.
///
/// `which` uses the `META_*` status bits; [`StatusBits::META_CHANGED`]
/// applies everything. Owner and group go first (a chown may clear set-id
/// bits that the following chmod restores), the modification time last so
/// the other calls cannot disturb it. Symlinks get owner and mtime only.
pub fn apply(path: &Path, st: &StatInfo, which: StatusBits) -> Result<()> {
    let is_symlink = st.kind() == FileKind::Symlink;
    debug!(path = %path.display(), ?which, "applying meta-data");

    if which.intersects(StatusBits::META_OWNER | StatusBits::META_GROUP) {
        lchown(path, st.uid, st.gid)?;
    }

    if which.contains(StatusBits::META_UMODE) && !is_symlink {
        fs::set_permissions(path, fs::Permissions::from_mode(st.perm_bits()))
            .with_context(|| format!("chmod(\"{}\")", path.display()))?;
    }

    if which.contains(StatusBits::META_MTIME) {
        let mtime = FileTime::from_unix_time(st.mtime_sec, st.mtime_nsec);
        filetime::set_symlink_file_times(path, mtime, mtime)
            .with_context(|| format!("setting mtime of \"{}\"", path.display()))?;
    }

    Ok(())
}

/// Applies every recorded meta-data part.
pub fn apply_all(path: &Path, st: &StatInfo) -> Result<()> {
    apply(path, st, StatusBits::META_CHANGED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lstat;

    #[test]
    fn mode_and_mtime_are_restored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a");
        fs::write(&file, b"x").expect("write");

        let mut wanted = lstat(&file).expect("lstat");
        wanted.mode = (wanted.mode & !0o7777) | 0o640;
        wanted.mtime_sec = 1_000_000;
        wanted.mtime_nsec = 0;

        apply(
            &file,
            &wanted,
            StatusBits::META_UMODE | StatusBits::META_MTIME,
        )
        .expect("apply");

        let got = lstat(&file).expect("lstat");
        assert_eq!(got.perm_bits(), 0o640);
        assert_eq!(got.mtime_sec, 1_000_000);
    }

    #[test]
    fn mtime_only_leaves_mode_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("b");
        fs::write(&file, b"x").expect("write");
        fs::set_permissions(&file, fs::Permissions::from_mode(0o751)).expect("chmod");

        let mut wanted = lstat(&file).expect("lstat");
        wanted.mode = (wanted.mode & !0o7777) | 0o600;
        wanted.mtime_sec = 2_000_000;

        apply(&file, &wanted, StatusBits::META_MTIME).expect("apply");

        let got = lstat(&file).expect("lstat");
        assert_eq!(got.perm_bits(), 0o751);
        assert_eq!(got.mtime_sec, 2_000_000);
    }
}
