//! crates/tree/src/dir_file.rs
//!
//! Serialization of the entry tree.
//!
//! The writer emits entries in disk order: it keeps one iterator per open
//! directory, sorted by the inode of the iterator's current child, and
//! always writes the smallest. File positions assigned while writing are
//! reused as the parent references of later records, so the reader can
//! rebuild the tree in a single forward pass.

use crate::entry::{Entry, EntryId, Payload};
use crate::store::EntryStore;
use checksums::{md5_to_hex, parse_md5_hex};
use base::error::ResultExt;
use base::status::EntryFlags;
use base::{Error, ErrorKind, Result};
use metadata::{FileKind, StatInfo, special};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::str::FromStr;
use tracing::debug;

/// Entry-list format version.
pub const VERSION: u32 = 1;
/// Fixed header length in bytes, `$\n`-terminated.
pub const HEADER_LEN: usize = 64;

/// Marker for "no URL" in the URL-id field.
const NO_URL: &str = "-";
/// Digest-field marker for directories.
const DIR_MARK: &str = "-";
/// Digest-field prefix for symlinks.
const LINK_MARK: &str = "link:";

fn damaged(what: impl Into<String>) -> Error {
    Error::new(ErrorKind::TreeDamaged, what)
}

/// Serializes the tree in disk order.
///
/// Dirty child lists are re-sorted on the way; entries excluded by
/// `to_be_ignored`/`DONT_WRITE` are skipped together with their subtrees.
pub fn write(store: &mut EntryStore, out: &mut dyn Write) -> Result<()> {
    struct DirIter {
        ids: Vec<EntryId>,
        pos: usize,
    }

    let mut body: Vec<u8> = Vec::with_capacity(store.len() * 96);
    let mut path_lens: FxHashMap<EntryId, u32> = FxHashMap::default();

    let mut entry_count: u32 = 0;
    let mut dir_count: u32 = 0;
    let mut name_bytes: u64 = 0;
    let mut max_path: u32 = 0;

    // The root is visible above all URLs and always first.
    store.get_mut(EntryId::ROOT).url_id = None;
    store.sort_children_if_needed(EntryId::ROOT);

    entry_count += 1;
    dir_count += 1;
    store.get_mut(EntryId::ROOT).file_index = 1;
    let root_len = store.root().name.len() as u32;
    path_lens.insert(EntryId::ROOT, root_len);
    name_bytes += u64::from(root_len) + 1;
    max_path = root_len;
    write_record(store, EntryId::ROOT, 0, &mut body)?;

    let mut iters: Vec<DirIter> = Vec::new();
    if !store.children(EntryId::ROOT).is_empty() {
        iters.push(DirIter {
            ids: store.children(EntryId::ROOT).to_vec(),
            pos: 0,
        });
    }

    let head_key = |store: &EntryStore, it: &DirIter| {
        let e = store.get(it.ids[it.pos]);
        (e.meta.dev, e.meta.ino, e.name.clone())
    };

    while !iters.is_empty() {
        let (id, exhausted) = {
            let front = &mut iters[0];
            let id = front.ids[front.pos];
            front.pos += 1;
            (id, front.pos >= front.ids.len())
        };

        if exhausted {
            iters.remove(0);
        } else if iters.len() > 1 {
            // The front iterator's head moved on; put it back where the
            // ordering wants it.
            let it = iters.remove(0);
            let key = head_key(store, &it);
            let pos = iters.partition_point(|probe| head_key(store, probe) < key);
            iters.insert(pos, it);
        }

        if !store.get(id).should_be_written() {
            continue;
        }

        entry_count += 1;
        store.get_mut(id).file_index = entry_count;
        let parent = store.get(id).parent.expect("non-root entries have parents");
        let parent_pos = store.get(parent).file_index;

        let name_len = store.get(id).name.len() as u32;
        let path_len = path_lens.get(&parent).copied().unwrap_or(0) + 1 + name_len;
        path_lens.insert(id, path_len);
        name_bytes += u64::from(name_len) + 1;
        max_path = max_path.max(path_len);

        write_record(store, id, parent_pos, &mut body)?;

        let is_dir_with_children = store
            .get(id)
            .dir()
            .is_some_and(|d| !d.children.is_empty());
        if is_dir_with_children {
            dir_count += 1;
            store.sort_children_if_needed(id);
            let it = DirIter {
                ids: store.children(id).to_vec(),
                pos: 0,
            };
            let key = head_key(store, &it);
            let pos = iters.partition_point(|probe| head_key(store, probe) < key);
            iters.insert(pos, it);
        } else if store.get(id).is_dir() {
            dir_count += 1;
        }
    }

    // Header; the size fields carry a little slack for readers that
    // append while loading.
    let mut header = format!(
        "{VERSION} {HEADER_LEN} {entry_count} {dir_count} {} {}",
        name_bytes + 4,
        max_path + 4
    );
    if header.len() > HEADER_LEN - 2 {
        return Err(Error::internal("entry-list header does not fit"));
    }
    while header.len() < HEADER_LEN - 2 {
        header.push(' ');
    }
    header.push_str("$\n");

    out.write_all(header.as_bytes())
        .context("writing entry-list header")?;
    out.write_all(&body).context("writing entry-list records")?;
    debug!(entries = entry_count, dirs = dir_count, "entry list written");
    Ok(())
}

fn write_record(
    store: &EntryStore,
    id: EntryId,
    parent_pos: u32,
    out: &mut Vec<u8>,
) -> Result<()> {
    let entry = store.get(id);
    let st = &entry.meta;

    let digest = match &entry.payload {
        Payload::Dir(_) => DIR_MARK.to_owned(),
        Payload::File(f) => match st.kind() {
            FileKind::Symlink => format!("{LINK_MARK}{}", md5_to_hex(&f.md5)),
            FileKind::BlockDev | FileKind::CharDev => special::dev_to_string(st),
            _ => md5_to_hex(&f.md5),
        },
    };
    let url = entry
        .url_id
        .map_or_else(|| NO_URL.to_owned(), |u| u.to_string());
    let child_count = store
        .children(id)
        .iter()
        .filter(|c| store.get(**c).should_be_written())
        .count();

    write!(
        out,
        "{} {} {} {:o} {} {} {} {} {} {} {} {} {} {} {:x} {} {}\0\n",
        st.ino,
        st.dev,
        st.size_or_rdev,
        st.mode,
        st.uid,
        st.gid,
        st.mtime_sec,
        st.mtime_nsec,
        st.ctime_sec,
        st.ctime_nsec,
        entry.repos_rev,
        url,
        parent_pos,
        child_count,
        entry.flags.persistent().bits(),
        digest,
        entry.name
    )
    .context("formatting entry record")
}

fn field<T: FromStr>(value: Option<&str>, what: &str) -> Result<T> {
    value
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| damaged(format!("unparsable {what} field")))
}

/// Reads a serialized tree back into an arena.
///
/// The reader is strict: any structural violation reports `TreeDamaged`,
/// after which only a repository sync can help.
pub fn read(data: &[u8]) -> Result<EntryStore> {
    if data.len() < HEADER_LEN + 4 {
        return Err(damaged("the file is too short"));
    }
    if data[HEADER_LEN - 2] != b'$' || data[HEADER_LEN - 1] != b'\n' {
        return Err(damaged("the header is not correctly terminated"));
    }
    if data[data.len() - 2] != 0 || data[data.len() - 1] != b'\n' {
        return Err(damaged("the file is not correctly terminated"));
    }

    let header = std::str::from_utf8(&data[..HEADER_LEN - 2])
        .map_err(|_| damaged("the header is not text"))?;
    let mut fields = header.split_ascii_whitespace();
    let version: u32 = field(fields.next(), "version")?;
    let header_len: usize = field(fields.next(), "header length")?;
    let count: u32 = field(fields.next(), "entry count")?;
    let _dirs: u32 = field(fields.next(), "directory count")?;
    let _name_bytes: u64 = field(fields.next(), "name bytes")?;
    let _max_path: u32 = field(fields.next(), "path length")?;
    if version != VERSION || header_len != HEADER_LEN {
        return Err(damaged("the header has a wrong version"));
    }
    if count == 0 {
        return Err(damaged("the file contains no root entry"));
    }

    let mut store: Option<EntryStore> = None;
    let mut cursor = HEADER_LEN;

    for position in 1..=count {
        let nul = data[cursor..]
            .iter()
            .position(|&b| b == 0)
            .map(|off| cursor + off)
            .ok_or_else(|| damaged("an entry record is not terminated"))?;
        if data.get(nul + 1) != Some(&b'\n') {
            return Err(damaged("an entry record is not terminated"));
        }
        let line = std::str::from_utf8(&data[cursor..nul])
            .map_err(|_| damaged("an entry record is not text"))?;
        cursor = nul + 2;

        let (entry, parent_pos) = parse_record(line)?;

        if position == 1 {
            if parent_pos != 0 {
                return Err(damaged("the first record is not the root"));
            }
            if !entry.is_dir() {
                return Err(damaged("the root entry is not a directory"));
            }
            store = Some(EntryStore::new(entry));
            continue;
        }

        let store = store.as_mut().expect("store exists after the root");
        if parent_pos == 0 || parent_pos >= position {
            return Err(damaged("the parent pointers are invalid"));
        }
        let parent = EntryId(parent_pos - 1);
        let id = store.push_entry(entry);
        store.get_mut(id).parent = Some(parent);

        let Some(dir) = store.get_mut(parent).dir_mut() else {
            return Err(damaged("a non-directory entry has children"));
        };
        if dir.child_index >= dir.entry_count {
            return Err(damaged("too many children for a directory"));
        }
        dir.child_index += 1;
        dir.children.push(id);
    }

    if cursor != data.len() {
        return Err(damaged("trailing bytes after the last record"));
    }

    let mut store = store.expect("count >= 1 parsed a root");
    for id in store.ids().collect::<Vec<_>>() {
        if let Some(dir) = store.get_mut(id).dir_mut() {
            if dir.child_index != dir.entry_count {
                return Err(damaged("a directory is missing children"));
            }
            dir.child_index = 0;
        }
    }

    store.set_full_block();
    Ok(store)
}

fn parse_record(line: &str) -> Result<(Entry, u32)> {
    let mut fields = line.splitn(17, ' ');

    let ino: u64 = field(fields.next(), "inode")?;
    let dev: u64 = field(fields.next(), "device")?;
    let size_or_rdev: u64 = field(fields.next(), "size")?;
    let mode = fields
        .next()
        .and_then(|s| u32::from_str_radix(s, 8).ok())
        .ok_or_else(|| damaged("unparsable mode field"))?;
    let uid: u32 = field(fields.next(), "uid")?;
    let gid: u32 = field(fields.next(), "gid")?;
    let mtime_sec: i64 = field(fields.next(), "mtime")?;
    let mtime_nsec: u32 = field(fields.next(), "mtime fraction")?;
    let ctime_sec: i64 = field(fields.next(), "ctime")?;
    let ctime_nsec: u32 = field(fields.next(), "ctime fraction")?;
    let repos_rev: u64 = field(fields.next(), "revision")?;
    let url = fields
        .next()
        .ok_or_else(|| damaged("missing URL field"))?;
    let parent_pos: u32 = field(fields.next(), "parent position")?;
    let entry_count: u32 = field(fields.next(), "child count")?;
    let flags = fields
        .next()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| damaged("unparsable flags field"))?;
    let digest = fields
        .next()
        .ok_or_else(|| damaged("missing digest field"))?;
    let name = fields.next().ok_or_else(|| damaged("missing name"))?;
    if name.is_empty() || name.contains('/') {
        return Err(damaged("an entry name is not a path component"));
    }

    let meta = StatInfo {
        mtime_sec,
        mtime_nsec,
        ctime_sec,
        ctime_nsec,
        size_or_rdev,
        dev,
        ino,
        mode,
        uid,
        gid,
    };

    let mut entry = Entry::new(name, meta);
    entry.repos_rev = repos_rev;
    entry.old_rev = repos_rev;
    entry.url_id = if url == NO_URL {
        None
    } else {
        Some(field(Some(url), "URL id")?)
    };
    entry.flags = EntryFlags::from_bits_truncate(flags) & EntryFlags::SAVE_MASK;

    match &mut entry.payload {
        Payload::Dir(dir) => {
            if digest != DIR_MARK {
                return Err(damaged("a directory record carries a digest"));
            }
            dir.entry_count = entry_count;
            dir.children = Vec::with_capacity(entry_count as usize);
        }
        Payload::File(file) => {
            let kind = meta.kind();
            match kind {
                FileKind::Symlink => {
                    let hex = digest
                        .strip_prefix(LINK_MARK)
                        .ok_or_else(|| damaged("a symlink record has no link marker"))?;
                    file.md5 = parse_md5_hex(hex)
                        .ok_or_else(|| damaged("a symlink record has a bad digest"))?;
                }
                FileKind::BlockDev | FileKind::CharDev => {
                    special::parse_dev_string(digest)?;
                }
                _ => {
                    file.md5 = parse_md5_hex(digest)
                        .ok_or_else(|| damaged("a file record has a bad digest"))?;
                }
            }
        }
    }

    Ok((entry, parent_pos))
}

/// Maps and reads a `dir` file.
pub fn read_file(file: &std::fs::File) -> Result<EntryStore> {
    // SAFETY: the mapping is read-only and lives only for the parse; the
    // WAA write discipline guarantees nobody rewrites the file in place.
    #[allow(unsafe_code)]
    let map = unsafe { memmap2::Mmap::map(file) }.context("mapping the entry list")?;
    read(&map)
}
