//! User properties and the content transform pipes.

mod common;

use common::Fixture;
use repos::mem::MemSession;
use repos::props::{FilePropertyStore, PropertyStore, REMOVAL_SENTINEL};
use repos::propname;
use std::fs;
use tree::EntryId;

fn set_props(fx: &Fixture, rel: &str, props: &[(&str, &[u8])]) {
    let abs = fx.wc().join(rel);
    let mut store = Box::new(FilePropertyStore::open(&fx.waa, &abs).expect("open props"));
    for (key, value) in props {
        store.set(key, value.to_vec());
    }
    store.close(true).expect("close props");
}

#[test]
fn commit_pipe_encodes_and_update_pipe_decodes() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"secret data\n").expect("write");
    set_props(
        &fx,
        "a",
        &[
            (propname::COMMIT_PIPE, b"tr a-z A-Z"),
            (propname::UPDATE_PIPE, b"tr A-Z a-z"),
        ],
    );

    let mut session = MemSession::new();
    let (bytes, rev) = fx.build_and_commit(&mut session);

    // The repository holds the encoded form, plus the cleartext digest.
    let node = session.node_at(rev, "a").expect("a");
    assert_eq!(node.content, b"SECRET DATA\n");
    assert!(
        node.props
            .iter()
            .any(|(k, _)| k == propname::ORIGINAL_MD5)
    );
    assert!(
        node.props
            .iter()
            .any(|(k, v)| k == propname::UPDATE_PIPE && v == "tr A-Z a-z")
    );

    // Reverting decodes on the way back in.
    fs::write(fx.wc().join("a"), b"scribbled\n").expect("tamper");
    let mut store = fx.load_and_walk(&bytes);
    fx.engine()
        .revert_tree(&mut store, &mut session, &repos::copy::CopyRelations::new())
        .expect("revert");
    assert_eq!(
        fs::read(fx.wc().join("a")).expect("read"),
        b"secret data\n"
    );
}

#[test]
fn removal_sentinel_drops_the_property_at_commit() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"content\n").expect("write");
    set_props(&fx, "a", &[("user:note", b"keep me around")]);

    let mut session = MemSession::new();
    let (bytes, rev) = fx.build_and_commit(&mut session);
    assert!(
        session
            .node_at(rev, "a")
            .expect("a")
            .props
            .iter()
            .any(|(k, _)| k == "user:note")
    );

    // Mark for removal, make the entry committable, commit again.
    set_props(&fx, "a", &[("user:note", REMOVAL_SENTINEL)]);
    let t = filetime::FileTime::from_unix_time(2_000_000_000, 0);
    filetime::set_file_times(fx.wc().join("a"), t, t).expect("touch");

    let mut store = fx.load_and_walk(&bytes);
    let rev = fx
        .engine()
        .commit_tree(&mut store, &mut session, "drop prop", 0)
        .expect("commit")
        .expect("revision");

    assert!(
        !session
            .node_at(rev, "a")
            .expect("a")
            .props
            .iter()
            .any(|(k, _)| k == "user:note")
    );

    // The local property store forgot the key as well.
    let abs = fx.wc().join("a");
    let reopened = FilePropertyStore::open(&fx.waa, &abs).expect("reopen");
    assert!(reopened.get("user:note").is_none());

    // The walk also dispatched nothing odd: the entry is clean now.
    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert!(store.get(a).entry_status.is_empty());
}
