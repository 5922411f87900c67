//! crates/metadata/src/special.rs
//!
//! Symlinks and device nodes: their textual form in repository data and in
//! the entry list, and their re-creation on disk.

use crate::{FileKind, StatInfo};
use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Prefix of symlink content as stored in the repository.
pub const LINK_SPEC: &str = "link ";
/// Device-string prefix for character devices.
pub const CDEV_SPEC: &str = "cdev";
/// Device-string prefix for block devices.
pub const BDEV_SPEC: &str = "bdev";

/// Reads a symlink target as a UTF-8 string.
pub fn read_link(path: &Path) -> Result<String> {
    let target = std::fs::read_link(path)
        .with_context(|| format!("readlink(\"{}\")", path.display()))?;
    String::from_utf8(target.into_os_string().into_encoded_bytes())
        .map_err(|_| Error::new(ErrorKind::Io, "symlink target is not valid UTF-8"))
}

/// The textual form of a device entry: `cdev:MAJOR:MINOR` or
/// `bdev:MAJOR:MINOR`.
#[must_use]
pub fn dev_to_string(st: &StatInfo) -> String {
    let (major, minor) = st.rdev_split();
    let spec = if st.kind() == FileKind::BlockDev {
        BDEV_SPEC
    } else {
        CDEV_SPEC
    };
    format!("{spec}:{major}:{minor}")
}

/// Parses a device string back into `(kind, rdev)`.
pub fn parse_dev_string(data: &str) -> Result<(FileKind, u64)> {
    let mut parts = data.split(':');
    let spec = parts.next().unwrap_or("");
    let kind = match spec {
        CDEV_SPEC => FileKind::CharDev,
        BDEV_SPEC => FileKind::BlockDev,
        _ => {
            return Err(Error::new(
                ErrorKind::TreeDamaged,
                format!("unknown device specification \"{data}\""),
            ));
        }
    };
    let major: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::new(ErrorKind::TreeDamaged, "bad device major number"))?;
    let minor: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::new(ErrorKind::TreeDamaged, "bad device minor number"))?;
    Ok((kind, libc::makedev(major, minor)))
}

/// Creates a device node.
pub fn make_device(path: &Path, kind: FileKind, rdev: u64, mode_bits: u32) -> Result<()> {
    let type_bits = match kind {
        FileKind::BlockDev => libc::S_IFBLK,
        FileKind::CharDev => libc::S_IFCHR,
        _ => return Err(Error::internal("make_device called for a non-device")),
    };
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::new(ErrorKind::Io, "path contains a NUL byte"))?;
    // SAFETY: cpath is a valid NUL-terminated C string for the call.
    let rc = unsafe { libc::mknod(cpath.as_ptr(), type_bits | mode_bits, rdev) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::io(
            std::io::Error::last_os_error(),
            format!("mknod(\"{}\")", path.display()),
        ))
    }
}

/// Re-creates a special entry from its repository content: `link TARGET`
/// or a device string.
pub fn install_special(path: &Path, data: &str, st: &StatInfo) -> Result<()> {
    if let Some(target) = data.strip_prefix(LINK_SPEC) {
        std::os::unix::fs::symlink(target, path)
            .with_context(|| format!("symlink(\"{}\")", path.display()))?;
        Ok(())
    } else {
        let (kind, rdev) = parse_dev_string(data)?;
        make_device(path, kind, rdev, st.perm_bits())
    }
}
