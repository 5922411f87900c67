//! Shared fixture: a scratch working copy with its administrative area
//! and an in-memory repository.
#![allow(dead_code)] // not every test binary uses every helper

use base::options::Context;
use engine::Engine;
use filters::PatternList;
use repos::mem::MemSession;
use std::fs;
use std::path::{Path, PathBuf};
use tree::{dir_file, Entry, EntryId, EntryStore};
use walk::Walker;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub ctx: Context,
    pub waa: waa::Waa,
    pub patterns: PatternList,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let wc = dir.path().join("wc");
        fs::create_dir_all(&wc).expect("mkdir wc");
        let waa = waa::Waa::open(
            &dir.path().join("waa"),
            &dir.path().join("conf"),
            None,
            &wc,
        )
        .expect("waa");
        let mut ctx = Context::default();
        ctx.verbosity.set(base::options::Priority::MustHave, 0);
        Self {
            dir,
            ctx,
            waa,
            patterns: PatternList::new(),
        }
    }

    pub fn wc(&self) -> &Path {
        self.waa.wc_path()
    }

    pub fn walker(&self) -> Walker<'_> {
        Walker::new(&self.ctx, &self.waa, &self.patterns)
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(&self.ctx, &self.waa)
    }

    /// Builds the tree from disk and commits it; returns the serialized
    /// entry list and the created revision.
    pub fn build_and_commit(&self, session: &mut MemSession) -> (Vec<u8>, u64) {
        let root_meta = metadata::lstat(self.wc()).expect("lstat wc");
        let mut store = EntryStore::new(Entry::new(".", root_meta));
        self.walker()
            .build_tree(&mut store, EntryId::ROOT, &mut |_, _| Ok(()))
            .expect("build");
        let rev = self
            .engine()
            .commit_tree(&mut store, session, "baseline", 0)
            .expect("commit")
            .expect("something to commit");

        let mut bytes = Vec::new();
        dir_file::write(&mut store, &mut bytes).expect("serialize");
        (bytes, rev)
    }

    /// Reads an entry list back and runs a full detection walk over it.
    pub fn load_and_walk(&self, bytes: &[u8]) -> EntryStore {
        let mut store = dir_file::read(bytes).expect("read entry list");
        self.walker()
            .update_tree(&mut store, &mut |_, _| Ok(()))
            .expect("walk");
        store
    }

    /// Installs a fake merge program and configures it.
    pub fn fake_merge(&mut self, script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let script = self.dir.path().join("fake-merge");
        fs::write(&script, script_body).expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        self.ctx.merge_prog.set(
            base::options::Priority::MustHave,
            script.display().to_string(),
        );
        self.ctx
            .merge_opts
            .set(base::options::Priority::MustHave, Vec::new());
        script
    }
}

/// Deterministic pseudo-random bytes (xorshift64*), content-rich enough
/// to produce Manber block boundaries.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        out.extend_from_slice(&x.wrapping_mul(0x2545_F491_4F6C_DD1D).to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Remote-side edit helper: commits directly into the repository,
/// carrying existing properties forward.
pub fn remote_commit(session: &mut MemSession, edits: &[(&str, Option<&[u8]>)]) -> u64 {
    use repos::Session;
    let head = session.head_rev().expect("head");
    let carried: Vec<_> = edits
        .iter()
        .map(|(path, _)| {
            session
                .node_at(head, path)
                .map(|n| n.props.clone())
                .unwrap_or_default()
        })
        .collect();

    session.begin_commit("remote edit").expect("begin");
    for ((path, content), props) in edits.iter().zip(carried) {
        match content {
            Some(bytes) => session.put_file(path, &mut &bytes[..], &props).expect("put"),
            None => session.delete_entry(path).expect("delete"),
        }
    }
    session.finish_commit().expect("finish")
}
