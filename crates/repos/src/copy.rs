//! crates/repos/src/copy.rs
//!
//! Copy-from relations: destination path -> source path, stored in the
//! `Copy` file with both paths `\0`-terminated.

use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use waa::{Waa, ext};

/// The copy relations of one working copy.
#[derive(Clone, Debug, Default)]
pub struct CopyRelations {
    map: FxHashMap<PathBuf, PathBuf>,
}

impl CopyRelations {
    /// No relations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Any relations at all?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Records that `dest` was copied from `src` (both WC-relative).
    pub fn record(&mut self, dest: impl Into<PathBuf>, src: impl Into<PathBuf>) {
        self.map.insert(dest.into(), src.into());
    }

    /// The copy source of `dest`, if one is recorded.
    #[must_use]
    pub fn source_of(&self, dest: &Path) -> Option<&Path> {
        self.map.get(dest).map(PathBuf::as_path)
    }

    /// Forgets the relation for `dest`.
    pub fn forget(&mut self, dest: &Path) {
        self.map.remove(dest);
    }

    /// Loads the `Copy` file; absent means no relations.
    pub fn load(waa: &Waa) -> Result<Self> {
        let bytes = match waa.read(waa.wc_path(), ext::COPY) {
            Ok(b) => b,
            Err(e) if e.is_not_found() => return Ok(Self::new()),
            Err(e) => return Err(e),
        };
        let mut relations = Self::new();
        let mut fields = bytes.split(|&b| b == 0);
        loop {
            let Some(dest) = fields.next() else { break };
            let dest = dest.strip_prefix(b"\n").unwrap_or(dest);
            if dest.is_empty() {
                break;
            }
            let src = fields
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::new(ErrorKind::Io, "odd copy-relation record"))?;
            let as_path = |raw: &[u8]| -> Result<PathBuf> {
                Ok(PathBuf::from(
                    std::str::from_utf8(raw)
                        .map_err(|_| Error::new(ErrorKind::Io, "copy record is not text"))?,
                ))
            };
            relations.map.insert(as_path(dest)?, as_path(src)?);
        }
        Ok(relations)
    }

    /// Writes the `Copy` file (or removes it when empty).
    pub fn save(&self, waa: &Waa) -> Result<()> {
        if self.map.is_empty() {
            return waa.delete(waa.wc_path(), ext::COPY, true);
        }
        let mut writer = waa.start_write(waa.wc_path(), ext::COPY)?;
        let mut pairs: Vec<(&PathBuf, &PathBuf)> = self.map.iter().collect();
        pairs.sort();
        for (dest, src) in pairs {
            write!(writer, "{}\0{}\0\n", dest.display(), src.display())
                .context("writing copy relation")?;
        }
        writer.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, Waa) {
        let dir = tempfile::tempdir().expect("tempdir");
        let wc = dir.path().join("wc");
        std::fs::create_dir_all(&wc).expect("mkdir");
        let waa = Waa::open(
            &dir.path().join("waa"),
            &dir.path().join("conf"),
            None,
            &wc,
        )
        .expect("waa");
        (dir, waa)
    }

    #[test]
    fn relations_round_trip() {
        let (_dir, waa) = scratch();
        let mut relations = CopyRelations::new();
        relations.record("etc/hosts.new", "etc/hosts");
        relations.record("var/b", "var/a");
        relations.save(&waa).expect("save");

        let loaded = CopyRelations::load(&waa).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.source_of(Path::new("etc/hosts.new")),
            Some(Path::new("etc/hosts"))
        );
    }

    #[test]
    fn empty_relations_remove_the_file() {
        let (_dir, waa) = scratch();
        let mut relations = CopyRelations::new();
        relations.record("a", "b");
        relations.save(&waa).expect("save");
        assert!(waa.exists(waa.wc_path(), ext::COPY));

        relations.forget(Path::new("a"));
        relations.save(&waa).expect("save empty");
        assert!(!waa.exists(waa.wc_path(), ext::COPY));

        assert!(CopyRelations::load(&waa).expect("load").is_empty());
    }
}
