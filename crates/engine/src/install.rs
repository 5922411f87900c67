//! crates/engine/src/install.rs
//!
//! Re-creating an entry from repository content: fetch, decode through
//! the update-pipe, re-chunk into a fresh sidecar, write a temp file, and
//! atomically rename it into place with its meta-data restored.

use crate::Engine;
use crate::pipe::filter_bytes;
use base::error::ResultExt;
use base::status::ChangeFlag;
use base::{Error, ErrorKind, Result, RevNum};
use checksums::{Manber, Md5, sidecar};
use metadata::{FileKind, StatInfo, special};
use repos::propname;
use repos::session::{PropList, Session};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use tree::{EntryId, EntryStore, Payload};
use waa::ext;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A unique scratch name next to `path`, so the final rename stays on one
/// filesystem.
pub(crate) fn scratch_name(path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tfs{seq}"))
}

/// Renames `path` to `path``suffix`, appending a counter when that name
/// is taken. Returns the name actually used.
pub(crate) fn rename_to_unique(path: &Path, suffix: &str) -> Result<PathBuf> {
    let base_name = format!("{}{}", path.display(), suffix);
    let mut candidate = PathBuf::from(&base_name);
    let mut counter = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base_name}.{counter}"));
        counter += 1;
    }
    std::fs::rename(path, &candidate).with_context(|| {
        format!(
            "renaming \"{}\" to \"{}\"",
            path.display(),
            candidate.display()
        )
    })?;
    Ok(candidate)
}

fn prop<'p>(props: &'p PropList, name: &str) -> Option<&'p str> {
    props
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Overrides the recorded meta-data with what the delivered properties
/// say. Returns the meta parts the properties actually provided, so the
/// caller only writes those back (an ownerless delivery must not chown).
pub(crate) fn apply_props_to_meta(
    meta: &mut StatInfo,
    props: &PropList,
) -> base::status::StatusBits {
    use base::status::StatusBits;

    let mut provided = StatusBits::empty();
    if let Some(mode) = prop(props, propname::UNIX_MODE)
        .and_then(|v| u32::from_str_radix(v.trim_start_matches("0o"), 8).ok())
    {
        meta.mode = (meta.mode & !0o7777) | (mode & 0o7777);
        provided |= StatusBits::META_UMODE;
    }
    if let Some(uid) = prop(props, propname::OWNER)
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
    {
        meta.uid = uid;
        provided |= StatusBits::META_OWNER;
    }
    if let Some(gid) = prop(props, propname::GROUP)
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
    {
        meta.gid = gid;
        provided |= StatusBits::META_GROUP;
    }
    if let Some(time) = prop(props, propname::TEXT_TIME) {
        let (sec, nsec) = time.split_once('.').unwrap_or((time, "0"));
        if let (Ok(sec), Ok(nsec)) = (sec.parse(), nsec.parse()) {
            meta.mtime_sec = sec;
            meta.mtime_nsec = nsec;
            provided |= StatusBits::META_MTIME;
        }
    }
    provided
}

impl Engine<'_> {
    /// Fetches `id` at `rev` from the repository and installs it at its
    /// working-copy path. Any existing local file is replaced atomically;
    /// the block-hash sidecar is regenerated on the way.
    pub fn install_file(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        rev: Option<RevNum>,
        session: &mut dyn Session,
    ) -> Result<()> {
        let rel = store.rel_str(id);
        self.install_from(store, id, rev, session, &rel)
    }

    /// Like [`Engine::install_file`], but fetches the repository path
    /// `fetch_rel` instead of the entry's own - copy-derived entries get
    /// their base text from their copy source.
    pub(crate) fn install_from(
        &self,
        store: &mut EntryStore,
        id: EntryId,
        rev: Option<RevNum>,
        session: &mut dyn Session,
        fetch_rel: &str,
    ) -> Result<()> {
        let rel = fetch_rel.to_owned();
        let abs = self.waa.wc_path().join(store.rel_path(id));
        debug!(path = %abs.display(), ?rev, "installing from repository");

        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating \"{}\"", parent.display()))?;
        }

        // Whatever sidecar existed describes the old content.
        self.waa.delete(&abs, ext::MD5S, true)?;

        let mut raw = Vec::new();
        let (props, _got_rev) = session
            .get_file(&rel, rev, &mut raw)
            .with_context(|| format!("fetching \"{rel}\""))?;

        let decoder = prop(&props, propname::UPDATE_PIPE)
            .map(str::to_owned)
            .or_else(|| {
                store
                    .get(id)
                    .file()
                    .and_then(|f| f.decoder.clone())
            });
        let data = match &decoder {
            Some(command) => {
                let env = self.child_env(&abs, rev);
                filter_bytes(command, &raw, &env)?
            }
            None => raw,
        };

        let special = prop(&props, propname::SPECIAL).is_some();
        let scratch = scratch_name(&abs);
        let mut meta = store.get(id).meta;
        let provided = apply_props_to_meta(&mut meta, &props);

        let md5 = if special {
            let text = std::str::from_utf8(&data).map_err(|_| {
                Error::new(
                    ErrorKind::Protocol,
                    format!("special entry \"{rel}\" is not text"),
                )
            })?;
            special::install_special(&scratch, text, &meta)?;
            if let Some(target) = text.strip_prefix(special::LINK_SPEC) {
                meta.mode = (meta.mode & 0o7777) | 0o120_000;
                Md5::digest(target.as_bytes())
            } else {
                let (kind, rdev) = special::parse_dev_string(text)?;
                meta.mode = (meta.mode & 0o7777)
                    | if kind == FileKind::BlockDev {
                        0o060_000
                    } else {
                        0o020_000
                    };
                meta.size_or_rdev = rdev;
                [0u8; 16]
            }
        } else {
            meta.mode = (meta.mode & 0o7777) | 0o100_000;
            let mut file = std::fs::File::create(&scratch)
                .with_context(|| format!("creating \"{}\"", scratch.display()))?;
            let mut lines = Vec::new();
            let mut manber = Manber::new();
            let write_failed = manber
                .update(&data, |block| sidecar::write_block(&mut lines, block))
                .and_then(|()| {
                    file.write_all(&data)
                        .with_context(|| format!("writing \"{}\"", scratch.display()))
                });
            if let Err(e) = write_failed {
                let _ = std::fs::remove_file(&scratch);
                return Err(e);
            }
            let (md5, len) = manber.finish();
            drop(file);

            if len >= checksums::manber::MIN_SIDECAR_SIZE && !lines.is_empty() {
                let mut writer = self.waa.start_write(&abs, ext::MD5S)?;
                writer
                    .write_all(&lines)
                    .context("writing the block-hash sidecar")?;
                writer.commit()?;
            }
            md5
        };

        let apply_result = metadata::apply::apply(&scratch, &meta, provided).and_then(|()| {
            std::fs::rename(&scratch, &abs).with_context(|| {
                format!(
                    "renaming \"{}\" to \"{}\"",
                    scratch.display(),
                    abs.display()
                )
            })
        });
        if let Err(e) = apply_result {
            let _ = std::fs::remove_file(&scratch);
            return Err(e);
        }

        let fresh = metadata::lstat(&abs)?;
        let parent = store.get(id).parent;
        let entry = store.get_mut(id);
        entry.meta = fresh;
        entry.local_meta = Some(fresh);
        if !fresh.is_dir() && !entry.is_dir() {
            let file = entry.file_mut().expect("non-directory payload");
            file.md5 = md5;
            file.decoder = decoder;
            file.change_flag = ChangeFlag::Unknown;
        } else if matches!(entry.payload, Payload::Dir(_)) && !fresh.is_dir() {
            entry.payload = Payload::File(tree::FilePayload {
                md5,
                decoder,
                change_flag: ChangeFlag::Unknown,
            });
        }

        // The rename changed the directory's contents and possibly the
        // inode order.
        if let Some(p) = parent {
            if let Some(d) = store.get_mut(p).dir_mut() {
                d.to_be_sorted = true;
            }
        }
        Ok(())
    }
}
