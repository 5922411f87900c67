//! crates/checksums/src/compare.rs
//!
//! Whole-file hashing and the compare-file fast path.

use crate::manber::Manber;
use crate::sidecar::{self, BlockHashes};
use base::status::ChangeFlag;
use base::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

const READ_CHUNK: usize = 256 * 1024;

/// Outcome of a content comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompareResult {
    /// Changed / not changed, or unknown when the file was unreadable.
    pub flag: ChangeFlag,
    /// The digest to store back into the entry. On an early block
    /// mismatch this is the recorded digest with one bit flipped, a cheap
    /// marker that is guaranteed to differ from the old value.
    pub md5: [u8; 16],
}

/// Streams a file through the splitter. Block records go to `sidecar_out`
/// if given; returns the full-file MD5 and length.
pub fn hash_file(path: &Path, mut sidecar_out: Option<&mut dyn Write>) -> Result<([u8; 16], u64)> {
    let mut file =
        File::open(path).map_err(|e| Error::io(e, format!("opening \"{}\"", path.display())))?;
    let mut manber = Manber::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let got = file
            .read(&mut buf)
            .map_err(|e| Error::io(e, format!("reading \"{}\"", path.display())))?;
        if got == 0 {
            break;
        }
        manber.update(&buf[..got], |block| {
            if let Some(out) = sidecar_out.as_deref_mut() {
                sidecar::write_block(out, block)?;
            }
            Ok(())
        })?;
    }
    Ok(manber.finish())
}

/// Re-chunks a local regular file and decides whether its content changed
/// against the recorded digest.
///
/// With a stored sidecar the scan stops at the first block whose
/// `(state, end, md5)` triple no longer matches; without one the whole
/// file is read and the full digests compared. A file that cannot be
/// opened for permission reasons (mode 000) yields `Unknown` rather than
/// an error.
pub fn compare_file(
    path: &Path,
    recorded_md5: [u8; 16],
    sidecar: Option<&BlockHashes>,
) -> Result<CompareResult> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            debug!(path = %path.display(), "unreadable, change status unknown");
            return Ok(CompareResult {
                flag: ChangeFlag::Unknown,
                md5: recorded_md5,
            });
        }
        Err(e) => return Err(Error::io(e, format!("opening \"{}\"", path.display()))),
    };

    let mut manber = Manber::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut block_index = 0usize;
    let mut mismatch = false;

    loop {
        let got = file
            .read(&mut buf)
            .map_err(|e| Error::io(e, format!("reading \"{}\"", path.display())))?;
        if got == 0 {
            break;
        }
        manber.update(&buf[..got], |block| {
            if let Some(stored) = sidecar {
                if !stored.matches(block_index, block) {
                    mismatch = true;
                }
                block_index += 1;
            }
            Ok(())
        })?;
        if mismatch {
            debug!(path = %path.display(), block = block_index, "block mismatch, stopping scan");
            let mut marker = recorded_md5;
            marker[0] ^= 0x1;
            return Ok(CompareResult {
                flag: ChangeFlag::Changed,
                md5: marker,
            });
        }
    }

    let (md5, _len) = manber.finish();
    let flag = if md5 == recorded_md5 {
        ChangeFlag::NotChanged
    } else {
        ChangeFlag::Changed
    };
    Ok(CompareResult { flag, md5 })
}
