#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The Working-copy Administrative Area (WAA) keeps every piece of
//! bookkeeping outside the tracked tree. Each tracked path maps, via the
//! MD5 of its normalized absolute form, to a directory
//! `<root>/<wcHash>/aa/bb/cccccccccccccccccccccccccccc/` holding that
//! entry's administrative files; the 32-hex working-copy prefix keeps
//! multiple working copies on one machine from colliding.
//!
//! Two roots exist: the WAA proper for volatile per-run state, and the
//! configuration area for files worth backing up. The extension's first
//! letter decides which root a file lives under - upper-case extensions
//! (`Urls`, `Ign`, `Copy`, `README.txt`) are configuration, lower-case
//! ones (`dir`, `revs`, `md5s`, `prop`, `cflct`) are volatile.
//!
//! All writes go through [`writer::AtomicWriter`]: data lands in a
//! uniquely-named `.tmp` sibling and only a successful commit renames it
//! into place, so a reader of the final name sees either the previous
//! version or the new one, never a torn write.

use base::error::ResultExt;
use base::{Error, Result};
use md5::{Digest, Md5};
use metadata::StatInfo;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod ext;
pub mod writer;

pub use writer::AtomicWriter;

/// Which root a file lives under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Volatile per-WC state under the WAA root.
    Waa,
    /// Backup-worthy configuration under the configuration root.
    Conf,
}

/// Handle to the administrative area of one working copy.
#[derive(Debug)]
pub struct Waa {
    waa_base: PathBuf,
    conf_base: PathBuf,
    wc_path: PathBuf,
    softroot: Option<PathBuf>,
    ident: Option<(u64, u64)>,
}

impl Waa {
    /// Opens (creating if needed) the administrative area for the working
    /// copy rooted at `wc_path`.
    ///
    /// The WAA base directory is remembered by `(dev, ino)` so enumeration
    /// can skip it if it happens to live inside the tracked tree.
    pub fn open(
        waa_root: &Path,
        conf_root: &Path,
        softroot: Option<&Path>,
        wc_path: &Path,
    ) -> Result<Self> {
        let wc_path = absolute(wc_path)?;
        let wc_hex = hex_digest(&path_hash_input(&wc_path, softroot));

        // Only the volatile area gets the per-WC prefix; configuration
        // paths already hash the WC root into their flat fan-out.
        let waa_base = waa_root.join(&wc_hex);
        let conf_base = conf_root.to_path_buf();
        fs::create_dir_all(&waa_base)
            .with_context(|| format!("creating \"{}\"", waa_base.display()))?;
        fs::create_dir_all(&conf_base)
            .with_context(|| format!("creating \"{}\"", conf_base.display()))?;

        let ident = metadata::lstat_if_exists(waa_root)?.map(|st| (st.dev, st.ino));
        debug!(wc = %wc_path.display(), waa = %waa_base.display(), "opened administrative area");

        Ok(Self {
            waa_base,
            conf_base,
            wc_path,
            softroot: softroot.map(Path::to_path_buf),
            ident,
        })
    }

    /// The working-copy root this area belongs to.
    #[must_use]
    pub fn wc_path(&self) -> &Path {
        &self.wc_path
    }

    /// The per-WC base directory inside the WAA root.
    #[must_use]
    pub fn waa_base(&self) -> &Path {
        &self.waa_base
    }

    /// The configuration area base.
    #[must_use]
    pub fn conf_base(&self) -> &Path {
        &self.conf_base
    }

    /// True when `st` identifies the WAA base device/inode; used to keep
    /// the tool from versioning its own state.
    #[must_use]
    pub fn is_own_state(&self, st: &StatInfo) -> bool {
        self.ident == Some((st.dev, st.ino))
    }

    /// The hashed directory for `path` under the given scope, without any
    /// extension and without creating anything.
    #[must_use]
    pub fn hash_dir(&self, path: &Path, scope: Scope) -> PathBuf {
        let hex = hex_digest(&path_hash_input(path, self.softroot.as_deref()));
        match scope {
            Scope::Waa => self
                .waa_base
                .join(&hex[0..2])
                .join(&hex[2..4])
                .join(&hex[4..]),
            Scope::Conf => self.conf_base.join(&hex),
        }
    }

    /// The full administrative path for `path` + `ext`. The scope follows
    /// from the extension's case.
    #[must_use]
    pub fn file_path(&self, path: &Path, ext: &str) -> PathBuf {
        self.hash_dir(path, ext::scope_for(ext)).join(ext)
    }

    /// Opens an administrative file for reading. A missing file reports
    /// `NotFound` without further ceremony; callers silence it where the
    /// contract says so.
    pub fn open_read(&self, path: &Path, ext: &str) -> Result<fs::File> {
        let target = self.file_path(path, ext);
        fs::File::open(&target).with_context(|| format!("opening \"{}\"", target.display()))
    }

    /// Reads an administrative file fully.
    pub fn read(&self, path: &Path, ext: &str) -> Result<Vec<u8>> {
        let target = self.file_path(path, ext);
        fs::read(&target).with_context(|| format!("reading \"{}\"", target.display()))
    }

    /// Starts an atomic write of an administrative file.
    pub fn start_write(&self, path: &Path, ext: &str) -> Result<AtomicWriter> {
        let scope = ext::scope_for(ext);
        let base = match scope {
            Scope::Waa => &self.waa_base,
            Scope::Conf => &self.conf_base,
        };
        AtomicWriter::below(base, &self.file_path(path, ext))
    }

    /// Opens an administrative file for appending, creating it if absent.
    ///
    /// Appends bypass the temp-file indirection; concurrent appends are not
    /// atomic and callers accept that.
    pub fn open_append(&self, path: &Path, ext: &str) -> Result<fs::File> {
        let target = self.file_path(path, ext);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating \"{}\"", parent.display()))?;
        }
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&target)
            .with_context(|| format!("appending to \"{}\"", target.display()))
    }

    /// Deletes an administrative file. With `missing_ok`, an absent file is
    /// no error. An emptied hash directory is pruned opportunistically.
    pub fn delete(&self, path: &Path, ext: &str, missing_ok: bool) -> Result<()> {
        let target = self.file_path(path, ext);
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && missing_ok => return Ok(()),
            Err(e) => {
                return Err(Error::io(e, format!("removing \"{}\"", target.display())));
            }
        }
        if let Some(parent) = target.parent() {
            let _ = fs::remove_dir(parent);
        }
        Ok(())
    }

    /// Does any administrative file with `ext` exist for `path`?
    #[must_use]
    pub fn exists(&self, path: &Path, ext: &str) -> bool {
        self.file_path(path, ext).exists()
    }

    /// Writes the human-readable backpointer from the configuration area
    /// to the working copy.
    pub fn write_readme(&self) -> Result<()> {
        use std::io::Write;
        let mut w = self.start_write(&self.wc_path, ext::README)?;
        writeln!(
            w,
            "This directory is the administrative area of the trackfs working copy at\n\n    {}\n\nRemove it only if that working copy is gone.",
            self.wc_path.display()
        )
        .context("writing README.txt")?;
        w.commit()
    }
}

/// Anchors a relative path at the current working directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("getting current directory")?;
        Ok(cwd.join(path))
    }
}

/// The normalized byte string that gets hashed for `path`: softroot
/// stripped, trailing separators collapsed, the bare root spelled `/`.
fn path_hash_input(path: &Path, softroot: Option<&Path>) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;

    let mut bytes = path.as_os_str().as_bytes().to_vec();
    while bytes.len() > 1 && bytes.last() == Some(&b'/') {
        bytes.pop();
    }

    if let Some(root) = softroot {
        let root = root.as_os_str().as_bytes();
        if bytes.starts_with(root) {
            bytes.drain(..root.len());
            if bytes.is_empty() {
                bytes.push(b'/');
            }
        }
    }
    bytes
}

/// Hex MD5 of the normalized path bytes.
fn hex_digest(input: &[u8]) -> String {
    use std::fmt::Write as _;

    let digest = Md5::digest(input);
    let mut hex = String::with_capacity(32);
    for byte in digest {
        write!(&mut hex, "{byte:02x}").expect("write! to String cannot fail");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, Waa) {
        let dir = tempfile::tempdir().expect("tempdir");
        let wc = dir.path().join("wc");
        fs::create_dir_all(&wc).expect("mkdir wc");
        let waa = Waa::open(
            &dir.path().join("waa"),
            &dir.path().join("conf"),
            None,
            &wc,
        )
        .expect("open waa");
        (dir, waa)
    }

    #[test]
    fn layout_is_two_two_twentyeight() {
        let (_dir, waa) = scratch();
        let p = waa.hash_dir(Path::new("/etc/hosts"), Scope::Waa);
        let rel: Vec<_> = p
            .strip_prefix(waa.waa_base())
            .expect("below base")
            .components()
            .map(|c| c.as_os_str().len())
            .collect();
        assert_eq!(rel, vec![2, 2, 28]);
    }

    #[test]
    fn conf_scope_uses_flat_hash() {
        let (_dir, waa) = scratch();
        let p = waa.hash_dir(Path::new("/etc/hosts"), Scope::Conf);
        let name = p.file_name().expect("name").len();
        assert_eq!(name, 32);
    }

    #[test]
    fn trailing_separators_collapse() {
        assert_eq!(
            path_hash_input(Path::new("/etc/"), None),
            path_hash_input(Path::new("/etc"), None)
        );
        assert_eq!(path_hash_input(Path::new("/"), None), b"/");
    }

    #[test]
    fn softroot_is_stripped() {
        let with = path_hash_input(Path::new("/mnt/image/etc"), Some(Path::new("/mnt/image")));
        let without = path_hash_input(Path::new("/etc"), None);
        assert_eq!(with, without);
        assert_eq!(
            path_hash_input(Path::new("/mnt/image"), Some(Path::new("/mnt/image"))),
            b"/"
        );
    }

    #[test]
    fn distinct_working_copies_get_distinct_bases() {
        let dir = tempfile::tempdir().expect("tempdir");
        for sub in ["a/wc", "b/wc"] {
            fs::create_dir_all(dir.path().join(sub)).expect("mkdir");
        }
        let open = |sub: &str| {
            Waa::open(
                &dir.path().join("waa"),
                &dir.path().join("conf"),
                None,
                &dir.path().join(sub),
            )
            .expect("open")
        };
        let one = open("a/wc");
        let two = open("b/wc");
        assert_ne!(one.waa_base(), two.waa_base());

        // Same entry path, disjoint storage.
        let etc = Path::new("/a/wc/etc/hosts");
        assert_ne!(one.file_path(etc, ext::MD5S), two.file_path(etc, ext::MD5S));
    }

    #[test]
    fn read_write_round_trip() {
        use std::io::Write;
        let (_dir, waa) = scratch();
        let entry = Path::new("/wc/etc/hosts");

        let mut w = waa.start_write(entry, ext::MD5S).expect("start");
        w.write_all(b"payload").expect("write");
        w.commit().expect("commit");

        assert_eq!(waa.read(entry, ext::MD5S).expect("read"), b"payload");
        waa.delete(entry, ext::MD5S, false).expect("delete");
        assert!(waa.read(entry, ext::MD5S).unwrap_err().is_not_found());
        waa.delete(entry, ext::MD5S, true).expect("tolerated");
    }

    #[test]
    fn own_state_is_recognized() {
        let (dir, waa) = scratch();
        let st = metadata::lstat(&dir.path().join("waa")).expect("lstat");
        assert!(waa.is_own_state(&st));
        let other = metadata::lstat(dir.path()).expect("lstat");
        assert!(!waa.is_own_state(&other));
    }
}
