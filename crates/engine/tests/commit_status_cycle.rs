//! Fresh tracking: commit, touch, content check, modify, commit again.

mod common;

use base::status::StatusBits;
use common::Fixture;
use repos::Session;
use repos::mem::MemSession;
use std::fs;
use tree::EntryId;

fn touch(path: &std::path::Path, seconds: i64) {
    let t = filetime::FileTime::from_unix_time(seconds, 0);
    filetime::set_file_times(path, t, t).expect("set times");
}

#[test]
fn fresh_commit_lands_in_the_repository() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"hello\n").expect("write");

    let mut session = MemSession::new();
    let (_bytes, rev) = fx.build_and_commit(&mut session);
    assert_eq!(rev, 1);
    let node = session.node_at(1, "a").expect("a committed");
    assert_eq!(node.content, b"hello\n");
    assert!(
        node.props
            .iter()
            .any(|(k, _)| k == repos::propname::UNIX_MODE)
    );
}

#[test]
fn touch_reports_likely_then_content_check_clears_it() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"hello\n").expect("write");
    let mut session = MemSession::new();
    let (bytes, _rev) = fx.build_and_commit(&mut session);

    touch(&fx.wc().join("a"), 2_000_000_000);
    let mut store = fx.load_and_walk(&bytes);
    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert!(store.get(a).entry_status.contains(StatusBits::LIKELY));

    walk::resolve_likely(&mut store, a, &fx.waa, &fx.wc().join("a")).expect("resolve");
    assert!(
        !store
            .get(a)
            .entry_status
            .intersects(StatusBits::LIKELY | StatusBits::CHANGED)
    );

    // Nothing content-worthy to commit; the run reports no new revision.
    let outcome = fx
        .engine()
        .commit_tree(&mut store, &mut session, "noop", 0)
        .expect("commit");
    // The touch is a meta-data (mtime) change, which is committable.
    assert!(outcome.is_some());
    assert_eq!(
        session.node_at(2, "a").expect("a").content,
        b"hello\n",
        "content unchanged"
    );
}

#[test]
fn content_change_reports_changed_with_new_size_and_commits() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"hello\n").expect("write");
    let mut session = MemSession::new();
    let (bytes, _) = fx.build_and_commit(&mut session);

    fs::write(fx.wc().join("a"), b"hello world\n").expect("rewrite");
    let mut store = fx.load_and_walk(&bytes);
    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert!(store.get(a).entry_status.contains(StatusBits::CHANGED));
    assert_eq!(
        store.get(a).local_meta.expect("local").size_or_rdev,
        12
    );

    let rev = fx
        .engine()
        .commit_tree(&mut store, &mut session, "edit", 0)
        .expect("commit")
        .expect("a revision");
    assert_eq!(session.node_at(rev, "a").expect("a").content, b"hello world\n");
    assert_eq!(store.get(a).repos_rev, rev);
    assert_eq!(store.get(a).meta.size_or_rdev, 12);
}

#[test]
fn replace_file_with_directory_round_trips() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"plain file").expect("write");
    let mut session = MemSession::new();
    let (bytes, _) = fx.build_and_commit(&mut session);

    fs::remove_file(fx.wc().join("a")).expect("rm");
    fs::create_dir(fx.wc().join("a")).expect("mkdir");
    fs::write(fx.wc().join("a/b"), vec![7u8; 100]).expect("write child");

    let mut store = fx.load_and_walk(&bytes);
    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert!(store.get(a).entry_status.is_replaced());

    let rev = fx
        .engine()
        .commit_tree(&mut store, &mut session, "replace", 0)
        .expect("commit")
        .expect("a revision");

    use metadata::FileKind;
    assert_eq!(session.node_at(rev, "a").expect("a").kind, FileKind::Directory);
    assert_eq!(session.node_at(rev, "a/b").expect("b").content, vec![7u8; 100]);

    // Read the rewritten list back: a directory with one child, no
    // file-role leftovers.
    let mut out = Vec::new();
    tree::dir_file::write(&mut store, &mut out).expect("serialize");
    let reread = tree::dir_file::read(&out).expect("read");
    let a = reread.find_child(EntryId::ROOT, "a").expect("a");
    assert!(reread.get(a).is_dir());
    assert!(reread.get(a).file().is_none());
    assert_eq!(reread.get(a).repos_rev, rev);
    let b = reread.find_child(a, "b").expect("b");
    assert_eq!(reread.get(b).meta.size_or_rdev, 100);
}

#[test]
fn large_file_commit_writes_the_sidecar_small_one_does_not() {
    let fx = Fixture::new();
    let big = common::random_bytes(600_000, 12345);
    fs::write(fx.wc().join("big"), &big).expect("write big");
    fs::write(fx.wc().join("small"), b"tiny").expect("write small");

    let mut session = MemSession::new();
    let (_bytes, _rev) = fx.build_and_commit(&mut session);

    assert!(fx.waa.exists(&fx.wc().join("big"), waa::ext::MD5S));
    assert!(!fx.waa.exists(&fx.wc().join("small"), waa::ext::MD5S));
}

#[test]
fn unchanged_tree_commits_nothing() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"x").expect("write");
    let mut session = MemSession::new();
    let (bytes, rev) = fx.build_and_commit(&mut session);

    let mut store = fx.load_and_walk(&bytes);
    let outcome = fx
        .engine()
        .commit_tree(&mut store, &mut session, "noop", 0)
        .expect("commit");
    assert!(outcome.is_none());
    assert_eq!(session.head_rev().expect("head"), rev);
}
