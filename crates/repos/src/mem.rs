//! crates/repos/src/mem.rs
//!
//! A complete in-process repository behind the [`Session`] trait. The
//! test suites and local round-trip scenarios use it in place of a real
//! transport.

use crate::session::{DeltaAction, DirEntry, PropList, RemoteDelta, Session};
use base::{Error, ErrorKind, Result, RevNum};
use metadata::FileKind;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::debug;

/// One versioned node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Node kind.
    pub kind: FileKind,
    /// Stored bytes: file content, `link TARGET`, or a device string.
    pub content: Vec<u8>,
    /// Properties.
    pub props: PropList,
}

impl Node {
    /// A regular file node.
    #[must_use]
    pub fn file(content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FileKind::File,
            content: content.into(),
            props: Vec::new(),
        }
    }

    /// A directory node.
    #[must_use]
    pub fn dir() -> Self {
        Self {
            kind: FileKind::Directory,
            content: Vec::new(),
            props: Vec::new(),
        }
    }

    /// Attaches a property.
    #[must_use]
    pub fn with_prop(mut self, name: &str, value: &str) -> Self {
        self.props.push((name.to_owned(), value.to_owned()));
        self
    }
}

type Tree = BTreeMap<String, Node>;

/// In-memory repository; revision 0 is always empty.
#[derive(Debug, Default)]
pub struct MemSession {
    revisions: Vec<Tree>,
    txn: Option<Tree>,
}

impl MemSession {
    /// A repository with just the empty revision 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            revisions: vec![Tree::new()],
            txn: None,
        }
    }

    fn tree_at(&self, rev: Option<RevNum>) -> Result<(&Tree, RevNum)> {
        let rev = rev.unwrap_or(self.revisions.len() as RevNum - 1);
        self.revisions
            .get(rev as usize)
            .map(|t| (t, rev))
            .ok_or_else(|| {
                Error::new(ErrorKind::Protocol, format!("no such revision {rev}"))
            })
    }

    /// Direct node access, for test assertions.
    #[must_use]
    pub fn node_at(&self, rev: RevNum, path: &str) -> Option<&Node> {
        self.revisions.get(rev as usize)?.get(path)
    }

    /// Appends a fully-formed revision. The persistence layer uses this
    /// when loading a stored repository.
    pub fn restore_revision(&mut self, tree: BTreeMap<String, Node>) {
        self.revisions.push(tree);
    }

    /// The complete tree of one revision.
    #[must_use]
    pub fn tree_snapshot(&self, rev: RevNum) -> Option<&BTreeMap<String, Node>> {
        self.revisions.get(rev as usize)
    }

    fn txn_mut(&mut self) -> Result<&mut Tree> {
        self.txn
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Protocol, "no commit transaction is open"))
    }
}

impl Session for MemSession {
    fn head_rev(&mut self) -> Result<RevNum> {
        Ok(self.revisions.len() as RevNum - 1)
    }

    fn get_file(
        &mut self,
        path: &str,
        rev: Option<RevNum>,
        sink: &mut dyn Write,
    ) -> Result<(PropList, RevNum)> {
        let (tree, rev) = self.tree_at(rev)?;
        let node = tree.get(path).ok_or_else(|| {
            Error::new(
                ErrorKind::Protocol,
                format!("\"{path}\" does not exist in revision {rev}"),
            )
        })?;
        if node.kind == FileKind::Directory {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!("\"{path}\" is a directory"),
            ));
        }
        sink.write_all(&node.content)
            .map_err(|e| Error::io(e, format!("delivering \"{path}\"")))?;
        Ok((node.props.clone(), rev))
    }

    fn get_dir(
        &mut self,
        path: &str,
        rev: Option<RevNum>,
    ) -> Result<(Vec<DirEntry>, PropList)> {
        let (tree, rev) = self.tree_at(rev)?;
        let props = if path.is_empty() {
            Vec::new()
        } else {
            let node = tree.get(path).ok_or_else(|| {
                Error::new(
                    ErrorKind::Protocol,
                    format!("\"{path}\" does not exist in revision {rev}"),
                )
            })?;
            if node.kind != FileKind::Directory {
                return Err(Error::new(
                    ErrorKind::Protocol,
                    format!("\"{path}\" is not a directory"),
                ));
            }
            node.props.clone()
        };

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut entries = Vec::new();
        for (child_path, node) in tree.range(prefix.clone()..) {
            let Some(rest) = child_path.strip_prefix(&prefix) else {
                break;
            };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
            entries.push(DirEntry {
                name: rest.to_owned(),
                kind: node.kind,
                size: node.content.len() as u64,
            });
        }
        Ok((entries, props))
    }

    fn report_changes(
        &mut self,
        base: RevNum,
        target: Option<RevNum>,
        report: &mut dyn FnMut(RemoteDelta) -> Result<()>,
    ) -> Result<RevNum> {
        let (base_tree, _) = self.tree_at(Some(base))?;
        let (target_tree, target_rev) = self.tree_at(target)?;
        debug!(base, target_rev, "reporting changes");

        for (path, node) in target_tree {
            match base_tree.get(path) {
                None => report(RemoteDelta {
                    path: path.clone(),
                    action: DeltaAction::Add(node.kind),
                })?,
                Some(old) if old.kind != node.kind => {
                    // A node replaced by another kind is a delete plus an
                    // add, the way the repository models it.
                    report(RemoteDelta {
                        path: path.clone(),
                        action: DeltaAction::Delete,
                    })?;
                    report(RemoteDelta {
                        path: path.clone(),
                        action: DeltaAction::Add(node.kind),
                    })?;
                }
                Some(old) if old.content != node.content => {
                    report(RemoteDelta {
                        path: path.clone(),
                        action: DeltaAction::Modify,
                    })?;
                }
                Some(old) if old.props != node.props => report(RemoteDelta {
                    path: path.clone(),
                    action: DeltaAction::MetaOnly,
                })?,
                Some(_) => {}
            }
        }
        for path in base_tree.keys() {
            if !target_tree.contains_key(path) {
                report(RemoteDelta {
                    path: path.clone(),
                    action: DeltaAction::Delete,
                })?;
            }
        }
        Ok(target_rev)
    }

    fn begin_commit(&mut self, message: &str) -> Result<()> {
        if self.txn.is_some() {
            return Err(Error::new(
                ErrorKind::Protocol,
                "a commit transaction is already open",
            ));
        }
        debug!(message, "commit transaction opened");
        self.txn = Some(self.revisions.last().expect("revision 0 exists").clone());
        Ok(())
    }

    fn put_file(&mut self, path: &str, content: &mut dyn Read, props: &PropList) -> Result<()> {
        let mut bytes = Vec::new();
        content
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(e, format!("receiving \"{path}\"")))?;
        let node = Node {
            kind: FileKind::File,
            content: bytes,
            props: props.clone(),
        };
        self.txn_mut()?.insert(path.to_owned(), node);
        Ok(())
    }

    fn make_dir(&mut self, path: &str, props: &PropList) -> Result<()> {
        let node = Node {
            kind: FileKind::Directory,
            content: Vec::new(),
            props: props.clone(),
        };
        self.txn_mut()?.insert(path.to_owned(), node);
        Ok(())
    }

    fn delete_entry(&mut self, path: &str) -> Result<()> {
        let prefix = format!("{path}/");
        let txn = self.txn_mut()?;
        txn.remove(path);
        txn.retain(|p, _| !p.starts_with(&prefix));
        Ok(())
    }

    fn change_props(&mut self, path: &str, props: &PropList) -> Result<()> {
        let node = self.txn_mut()?.get_mut(path).ok_or_else(|| {
            Error::new(
                ErrorKind::Protocol,
                format!("property change for unknown \"{path}\""),
            )
        })?;
        node.props = props.clone();
        Ok(())
    }

    fn finish_commit(&mut self) -> Result<RevNum> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| Error::new(ErrorKind::Protocol, "no commit transaction is open"))?;
        self.revisions.push(txn);
        Ok(self.revisions.len() as RevNum - 1)
    }

    fn abort_commit(&mut self) {
        self.txn = None;
    }
}
