//! crates/repos/src/fs.rs
//!
//! A local, file-backed repository for `file://` URLs: the in-memory
//! model persisted as one snapshot file per revision. It exists so a
//! working copy can be exercised end-to-end without a network transport;
//! a real Subversion session would plug in behind the same trait.

use crate::mem::{MemSession, Node};
use crate::session::{DirEntry, PropList, RemoteDelta, Session};
use base::error::ResultExt;
use base::{Error, ErrorKind, Result, RevNum};
use metadata::FileKind;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT_FILE: &str = "format";
const FORMAT: &str = "trackfs-repository-1\n";

fn kind_word(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Directory => "dir",
        FileKind::Symlink => "link",
        FileKind::BlockDev => "bdev",
        FileKind::CharDev => "cdev",
        _ => "file",
    }
}

fn kind_from_word(word: &str) -> Result<FileKind> {
    Ok(match word {
        "dir" => FileKind::Directory,
        "link" => FileKind::Symlink,
        "bdev" => FileKind::BlockDev,
        "cdev" => FileKind::CharDev,
        "file" => FileKind::File,
        other => {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("unknown node kind \"{other}\" in repository"),
            ));
        }
    })
}

/// Local repository rooted at a directory.
pub struct FsRepository {
    root: PathBuf,
    inner: MemSession,
}

impl FsRepository {
    /// Creates an empty repository at `root`.
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join("revs"))
            .with_context(|| format!("creating \"{}\"", root.display()))?;
        std::fs::write(root.join(FORMAT_FILE), FORMAT)
            .with_context(|| format!("initializing \"{}\"", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            inner: MemSession::new(),
        })
    }

    /// Opens an existing repository, loading every revision snapshot.
    pub fn open(root: &Path) -> Result<Self> {
        let format = std::fs::read_to_string(root.join(FORMAT_FILE))
            .with_context(|| format!("opening repository \"{}\"", root.display()))?;
        if format != FORMAT {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("\"{}\" is not a trackfs repository", root.display()),
            ));
        }

        let mut inner = MemSession::new();
        let mut rev: RevNum = 1;
        loop {
            let path = root.join("revs").join(rev.to_string());
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => {
                    return Err(Error::io(e, format!("reading \"{}\"", path.display())));
                }
            };
            inner.restore_revision(parse_snapshot(&bytes)?);
            rev += 1;
        }
        debug!(root = %root.display(), revisions = rev - 1, "repository loaded");
        Ok(Self {
            root: root.to_path_buf(),
            inner,
        })
    }

    /// Opens `root`, creating a fresh repository when nothing is there.
    pub fn open_or_create(root: &Path) -> Result<Self> {
        if root.join(FORMAT_FILE).exists() {
            Self::open(root)
        } else {
            Self::create(root)
        }
    }

    /// Direct node access, for inspection and tests.
    #[must_use]
    pub fn node_at(&self, rev: RevNum, path: &str) -> Option<&Node> {
        self.inner.node_at(rev, path)
    }

    fn persist(&self, rev: RevNum) -> Result<()> {
        let tree = self
            .inner
            .tree_snapshot(rev)
            .ok_or_else(|| Error::internal("committed revision is missing"))?;
        let path = self.root.join("revs").join(rev.to_string());
        let mut out = Vec::new();
        for (node_path, node) in tree {
            write!(
                out,
                "{} {} {} {}\n",
                node_path.len(),
                kind_word(node.kind),
                node.content.len(),
                node.props.len()
            )
            .expect("write! to Vec cannot fail");
            out.extend_from_slice(node_path.as_bytes());
            out.extend_from_slice(&node.content);
            for (key, value) in &node.props {
                write!(out, "{} {}\n", key.len(), value.len())
                    .expect("write! to Vec cannot fail");
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(value.as_bytes());
            }
        }
        std::fs::write(&path, out)
            .with_context(|| format!("writing \"{}\"", path.display()))
    }
}

fn parse_snapshot(bytes: &[u8]) -> Result<BTreeMap<String, Node>> {
    let bad = || Error::new(ErrorKind::Protocol, "malformed repository snapshot");
    let mut tree = BTreeMap::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        let nl = bytes[cursor..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|off| cursor + off)
            .ok_or_else(bad)?;
        let head = std::str::from_utf8(&bytes[cursor..nl]).map_err(|_| bad())?;
        cursor = nl + 1;
        let mut fields = head.split(' ');
        let path_len: usize = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let kind = kind_from_word(fields.next().ok_or_else(bad)?)?;
        let content_len: usize =
            fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
        let prop_count: usize =
            fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;

        if cursor + path_len + content_len > bytes.len() {
            return Err(bad());
        }
        let path = std::str::from_utf8(&bytes[cursor..cursor + path_len])
            .map_err(|_| bad())?
            .to_owned();
        cursor += path_len;
        let content = bytes[cursor..cursor + content_len].to_vec();
        cursor += content_len;

        let mut props = Vec::with_capacity(prop_count);
        for _ in 0..prop_count {
            let nl = bytes[cursor..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|off| cursor + off)
                .ok_or_else(bad)?;
            let head = std::str::from_utf8(&bytes[cursor..nl]).map_err(|_| bad())?;
            cursor = nl + 1;
            let (klen, vlen) = head.split_once(' ').ok_or_else(bad)?;
            let klen: usize = klen.parse().map_err(|_| bad())?;
            let vlen: usize = vlen.parse().map_err(|_| bad())?;
            if cursor + klen + vlen > bytes.len() {
                return Err(bad());
            }
            let key = std::str::from_utf8(&bytes[cursor..cursor + klen])
                .map_err(|_| bad())?
                .to_owned();
            cursor += klen;
            let value = std::str::from_utf8(&bytes[cursor..cursor + vlen])
                .map_err(|_| bad())?
                .to_owned();
            cursor += vlen;
            props.push((key, value));
        }

        tree.insert(
            path,
            Node {
                kind,
                content,
                props,
            },
        );
    }
    Ok(tree)
}

impl Session for FsRepository {
    fn head_rev(&mut self) -> Result<RevNum> {
        self.inner.head_rev()
    }

    fn get_file(
        &mut self,
        path: &str,
        rev: Option<RevNum>,
        sink: &mut dyn Write,
    ) -> Result<(PropList, RevNum)> {
        self.inner.get_file(path, rev, sink)
    }

    fn get_dir(
        &mut self,
        path: &str,
        rev: Option<RevNum>,
    ) -> Result<(Vec<DirEntry>, PropList)> {
        self.inner.get_dir(path, rev)
    }

    fn report_changes(
        &mut self,
        base: RevNum,
        target: Option<RevNum>,
        report: &mut dyn FnMut(RemoteDelta) -> Result<()>,
    ) -> Result<RevNum> {
        self.inner.report_changes(base, target, report)
    }

    fn begin_commit(&mut self, message: &str) -> Result<()> {
        self.inner.begin_commit(message)
    }

    fn put_file(&mut self, path: &str, content: &mut dyn Read, props: &PropList) -> Result<()> {
        self.inner.put_file(path, content, props)
    }

    fn make_dir(&mut self, path: &str, props: &PropList) -> Result<()> {
        self.inner.make_dir(path, props)
    }

    fn delete_entry(&mut self, path: &str) -> Result<()> {
        self.inner.delete_entry(path)
    }

    fn change_props(&mut self, path: &str, props: &PropList) -> Result<()> {
        self.inner.change_props(path, props)
    }

    fn finish_commit(&mut self) -> Result<RevNum> {
        let rev = self.inner.finish_commit()?;
        self.persist(rev)?;
        Ok(rev)
    }

    fn abort_commit(&mut self) {
        self.inner.abort_commit();
    }
}
