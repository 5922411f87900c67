//! crates/repos/src/props.rs
//!
//! Per-entry user properties: the store interface and its flat-file
//! implementation.
//!
//! The interface mirrors an embedded key/value database; the standard
//! implementation here keeps the whole (small) set in memory and writes a
//! sorted flat file under the entry's WAA directory, so iteration order
//! is deterministic.

use base::error::ResultExt;
use base::{Error, ErrorKind, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use waa::{Waa, ext};

/// Reserved property names.
pub mod propname {
    /// Recorded modification time.
    pub const TEXT_TIME: &str = "svn:text-time";
    /// Recorded owner, `uid name` form.
    pub const OWNER: &str = "svn:owner";
    /// Recorded group, `gid name` form.
    pub const GROUP: &str = "svn:group";
    /// Recorded access mode, octal.
    pub const UNIX_MODE: &str = "svn:unix-mode";
    /// Marks symlinks and device nodes.
    pub const SPECIAL: &str = "svn:special";
    /// Shell command encoding content on commit.
    pub const COMMIT_PIPE: &str = "trackfs:commit-pipe";
    /// Shell command decoding content on update/revert.
    pub const UPDATE_PIPE: &str = "trackfs:update-pipe";
    /// MD5 of the unencoded content for piped entries.
    pub const ORIGINAL_MD5: &str = "trackfs:original-md5";
    /// Install-time hook command.
    pub const INSTALL: &str = "trackfs:install";
}

/// Value sentinel denoting "delete this property at the next commit".
pub const REMOVAL_SENTINEL: &[u8] = b"\x00trackfs:remove-at-commit";

/// Key/value store for one entry's user-defined properties.
pub trait PropertyStore {
    /// Fetches a value.
    fn get(&self, key: &str) -> Option<&[u8]>;

    /// Stores a value.
    fn set(&mut self, key: &str, value: Vec<u8>);

    /// Removes a key entirely.
    fn delete(&mut self, key: &str);

    /// All pairs in deterministic (sorted) order.
    fn entries(&self) -> Vec<(&str, &[u8])>;

    /// Closes the store. With `committed` the state is persisted, else
    /// every change since open is dropped.
    fn close(self: Box<Self>, committed: bool) -> Result<()>;
}

/// Flat-file property store under `<entryHash>/prop`.
///
/// File format, repeated: `KEYLEN VALUELEN\n KEY VALUE \n` with the
/// lengths in decimal and the raw bytes following.
#[derive(Debug)]
pub struct FilePropertyStore {
    waa_base: PathBuf,
    target: PathBuf,
    values: BTreeMap<String, Vec<u8>>,
}

impl FilePropertyStore {
    /// Opens (or starts fresh) the property store of `entry_path`.
    pub fn open(waa: &Waa, entry_path: &Path) -> Result<Self> {
        let values = match waa.read(entry_path, ext::PROP) {
            Ok(bytes) => parse(&bytes)?,
            Err(e) if e.is_not_found() => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            waa_base: waa.waa_base().to_path_buf(),
            target: waa.file_path(entry_path, ext::PROP),
            values,
        })
    }

    /// Does any property exist?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let bad = || Error::new(ErrorKind::Io, "malformed property file");
    let mut values = BTreeMap::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let nl = bytes[cursor..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|off| cursor + off)
            .ok_or_else(bad)?;
        let head = std::str::from_utf8(&bytes[cursor..nl]).map_err(|_| bad())?;
        let (key_len, value_len) = head.split_once(' ').ok_or_else(bad)?;
        let key_len: usize = key_len.parse().map_err(|_| bad())?;
        let value_len: usize = value_len.parse().map_err(|_| bad())?;
        cursor = nl + 1;

        if cursor + key_len + value_len + 1 > bytes.len() {
            return Err(bad());
        }
        let key = std::str::from_utf8(&bytes[cursor..cursor + key_len])
            .map_err(|_| bad())?
            .to_owned();
        cursor += key_len;
        let value = bytes[cursor..cursor + value_len].to_vec();
        cursor += value_len;
        if bytes[cursor] != b'\n' {
            return Err(bad());
        }
        cursor += 1;
        values.insert(key, value);
    }
    Ok(values)
}

impl PropertyStore for FilePropertyStore {
    fn get(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.values.insert(key.to_owned(), value);
    }

    fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn entries(&self) -> Vec<(&str, &[u8])> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect()
    }

    fn close(self: Box<Self>, committed: bool) -> Result<()> {
        if !committed {
            return Ok(());
        }
        if self.values.is_empty() {
            if self.target.exists() {
                std::fs::remove_file(&self.target)
                    .with_context(|| format!("removing \"{}\"", self.target.display()))?;
            }
            return Ok(());
        }
        let mut writer = waa::AtomicWriter::below(&self.waa_base, &self.target)?;
        for (key, value) in &self.values {
            write!(writer, "{} {}\n", key.len(), value.len()).context("writing property")?;
            writer.write_all(key.as_bytes()).context("writing property")?;
            writer.write_all(value).context("writing property")?;
            writer.write_all(b"\n").context("writing property")?;
        }
        writer.commit()
    }
}
