#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Compact stat tuples for the entry tree, plus the meta-data application
//! used when reverting or installing entries.
//!
//! [`StatInfo`] keeps only the fields the engine compares: timestamps with
//! nanosecond parts, size or device number, host device and inode, mode,
//! owner and group. That is considerably smaller than a full `stat` result
//! and the whole tree holds one per entry.

use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

pub mod apply;
pub mod special;

/// File type derived from the mode word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    BlockDev,
    /// Character device.
    CharDev,
    /// Anything else (socket, fifo); not versionable.
    Garbage,
}

impl FileKind {
    /// Derives the kind from a raw mode word.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Self::File,
            libc::S_IFDIR => Self::Directory,
            libc::S_IFLNK => Self::Symlink,
            libc::S_IFBLK => Self::BlockDev,
            libc::S_IFCHR => Self::CharDev,
            _ => Self::Garbage,
        }
    }

    /// True for block and character devices.
    #[must_use]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::BlockDev | Self::CharDev)
    }
}

/// Compact stat tuple.
///
/// `size_or_rdev` holds the byte size for files, symlinks and directories,
/// and the device number for device nodes, mirroring the kernel's own
/// overlay of those fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatInfo {
    /// Modification time, seconds part.
    pub mtime_sec: i64,
    /// Modification time, nanoseconds part.
    pub mtime_nsec: u32,
    /// Change time, seconds part.
    pub ctime_sec: i64,
    /// Change time, nanoseconds part.
    pub ctime_nsec: u32,
    /// Byte size, or `rdev` for device nodes.
    pub size_or_rdev: u64,
    /// Device of the host filesystem.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Access mode including the file-type bits.
    pub mode: u32,
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl StatInfo {
    /// Builds the tuple from a `std` metadata result.
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let kind = FileKind::from_mode(meta.mode());
        Self {
            mtime_sec: meta.mtime(),
            mtime_nsec: meta.mtime_nsec() as u32,
            ctime_sec: meta.ctime(),
            ctime_nsec: meta.ctime_nsec() as u32,
            size_or_rdev: if kind.is_device() {
                meta.rdev()
            } else {
                meta.size()
            },
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }

    /// The file type.
    #[must_use]
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Is this a directory?
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// The permission bits without the file type.
    #[must_use]
    pub const fn perm_bits(&self) -> u32 {
        self.mode & 0o7777
    }

    /// True when the modification timestamps differ.
    #[must_use]
    pub const fn mtime_differs(&self, other: &Self) -> bool {
        self.mtime_sec != other.mtime_sec || self.mtime_nsec != other.mtime_nsec
    }

    /// Device major/minor for device nodes.
    #[must_use]
    pub fn rdev_split(&self) -> (u32, u32) {
        (
            libc::major(self.size_or_rdev),
            libc::minor(self.size_or_rdev),
        )
    }
}

/// `lstat` wrapper producing the compact tuple.
///
/// `NotFound` and `Permission` come back as their dedicated kinds so the
/// change detector can treat them as "removed" and "status unknown".
pub fn lstat(path: &Path) -> Result<StatInfo> {
    std::fs::symlink_metadata(path)
        .map(|m| StatInfo::from_metadata(&m))
        .with_context(|| format!("lstat(\"{}\")", path.display()))
}

/// Like [`lstat`], but `NotFound` becomes `None`.
pub fn lstat_if_exists(path: &Path) -> Result<Option<StatInfo>> {
    match lstat(path) {
        Ok(st) => Ok(Some(st)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Changes the owner and group of `path` without following symlinks.
pub fn lchown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::new(ErrorKind::Io, "path contains a NUL byte"))?;
    // SAFETY: cpath is a valid NUL-terminated C string for the call.
    let rc = unsafe { libc::lchown(cpath.as_ptr(), uid, gid) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::io(
            std::io::Error::last_os_error(),
            format!("lchown(\"{}\", {uid}, {gid})", path.display()),
        ))
    }
}
