//! crates/waa/src/writer.rs
//!
//! Atomic temp-file-then-rename writes.
//!
//! The temp file sits directly below the area base with the target's
//! relative path flattened (`/` becomes `_`), so no intermediate hash
//! directories are created for data that might be thrown away again. A
//! process-wide counter keeps concurrent temp names distinct, and a
//! per-target generation check makes an interleaved second commit fail
//! instead of silently clobbering what the first one renamed into place.

use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Commit generation per target path. A writer remembers the generation it
/// saw on open; a commit only goes through if nobody else committed the
/// same target in between.
fn generations() -> &'static Mutex<HashMap<PathBuf, u64>> {
    static GEN: OnceLock<Mutex<HashMap<PathBuf, u64>>> = OnceLock::new();
    GEN.get_or_init(|| Mutex::new(HashMap::new()))
}

fn generation_of(target: &Path) -> u64 {
    generations()
        .lock()
        .map(|map| map.get(target).copied().unwrap_or(0))
        .unwrap_or(0)
}

/// Bumps the generation if it is still `seen`; returns whether it was.
fn advance_generation(target: &Path, seen: u64) -> bool {
    let Ok(mut map) = generations().lock() else {
        return false;
    };
    let slot = map.entry(target.to_path_buf()).or_insert(0);
    if *slot == seen {
        *slot += 1;
        true
    } else {
        false
    }
}

/// Writer for one administrative file.
///
/// Data goes to a uniquely-named `.tmp` sibling; [`commit`](Self::commit)
/// renames it to the final name, [`abort`](Self::abort) (or drop) unlinks
/// it. Readers of the final name therefore always see a complete file.
#[derive(Debug)]
pub struct AtomicWriter {
    out: Option<BufWriter<File>>,
    temp: PathBuf,
    target: PathBuf,
    opened_generation: u64,
    done: bool,
}

impl AtomicWriter {
    /// Starts a write of `target`, placing the temp file below `base`.
    pub fn below(base: &Path, target: &Path) -> Result<Self> {
        let rel = target.strip_prefix(base).unwrap_or(target);
        let mut flat = rel
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "_");
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        flat.push_str(&format!(".tmp.{seq}"));
        let temp = base.join(flat);

        fs::create_dir_all(base).with_context(|| format!("creating \"{}\"", base.display()))?;
        let file = File::create(&temp)
            .with_context(|| format!("creating temp file \"{}\"", temp.display()))?;
        debug!(target = %target.display(), temp = %temp.display(), "atomic write started");

        Ok(Self {
            out: Some(BufWriter::new(file)),
            temp,
            target: target.to_path_buf(),
            opened_generation: generation_of(target),
            done: false,
        })
    }

    /// The final name this writer will produce.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes and renames the temp file into place. The destination's
    /// directories are created only now that the data is known good. If
    /// another writer committed the same target while this one was open,
    /// the commit is refused with `Busy` and the temp file is dropped.
    pub fn commit(mut self) -> Result<()> {
        let flushed = self
            .out
            .take()
            .expect("writer still open")
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
            .and_then(|f| f.sync_data());
        if let Err(e) = flushed {
            self.unlink_temp();
            self.done = true;
            return Err(Error::io(
                e,
                format!("flushing \"{}\"", self.temp.display()),
            ));
        }

        if !advance_generation(&self.target, self.opened_generation) {
            self.unlink_temp();
            self.done = true;
            return Err(Error::new(
                ErrorKind::Busy,
                format!(
                    "\"{}\" was rewritten while this writer was open",
                    self.target.display()
                ),
            ));
        }

        if let Some(parent) = self.target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                self.unlink_temp();
                self.done = true;
                return Err(Error::io(e, format!("creating \"{}\"", parent.display())));
            }
        }

        let renamed = fs::rename(&self.temp, &self.target);
        self.done = true;
        match renamed {
            Ok(()) => Ok(()),
            Err(e) => {
                self.unlink_temp();
                Err(Error::io(
                    e,
                    format!(
                        "renaming \"{}\" to \"{}\"",
                        self.temp.display(),
                        self.target.display()
                    ),
                ))
            }
        }
    }

    /// Drops the written data; the final name is untouched.
    pub fn abort(mut self) -> Result<()> {
        self.out.take();
        self.unlink_temp();
        self.done = true;
        Ok(())
    }

    fn unlink_temp(&self) {
        let _ = fs::remove_file(&self.temp);
    }
}

impl Write for AtomicWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.as_mut().expect("writer still open").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.as_mut().expect("writer still open").flush()
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.done {
            self.out.take();
            self.unlink_temp();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_makes_content_visible_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("aa").join("bb").join("dir");

        let mut w = AtomicWriter::below(dir.path(), &target).expect("start");
        w.write_all(b"one").expect("write");
        assert!(!target.exists(), "target must not appear before commit");
        w.commit().expect("commit");
        assert_eq!(fs::read(&target).expect("read"), b"one");

        // No temp leftovers below the base.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn abort_leaves_previous_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");
        fs::write(&target, b"old").expect("seed");

        let mut w = AtomicWriter::below(dir.path(), &target).expect("start");
        w.write_all(b"new").expect("write");
        w.abort().expect("abort");

        assert_eq!(fs::read(&target).expect("read"), b"old");
    }

    #[test]
    fn drop_without_commit_unlinks_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");
        {
            let mut w = AtomicWriter::below(dir.path(), &target).expect("start");
            w.write_all(b"data").expect("write");
        }
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[test]
    fn concurrent_writers_use_distinct_temp_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");

        let a = AtomicWriter::below(dir.path(), &target).expect("start a");
        let b = AtomicWriter::below(dir.path(), &target).expect("start b");
        assert_ne!(a.temp, b.temp);
        a.abort().expect("abort a");
        b.abort().expect("abort b");
    }

    #[test]
    fn sequential_rewrites_are_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");

        for content in [b"one".as_slice(), b"two".as_slice()] {
            let mut w = AtomicWriter::below(dir.path(), &target).expect("start");
            w.write_all(content).expect("write");
            w.commit().expect("commit");
        }
        assert_eq!(fs::read(&target).expect("read"), b"two");
    }

    #[test]
    fn interleaved_second_commit_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");

        let mut a = AtomicWriter::below(dir.path(), &target).expect("start a");
        a.write_all(b"first").expect("write");
        let mut b = AtomicWriter::below(dir.path(), &target).expect("start b");
        b.write_all(b"second").expect("write");

        a.commit().expect("first commit");
        let err = b.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(fs::read(&target).expect("read"), b"first");
    }
}
