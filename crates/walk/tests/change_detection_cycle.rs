//! End-to-end walks over a real scratch tree: build, record, modify,
//! re-walk, and check the reported statuses.

use base::options::Context;
use base::status::{EntryFlags, StatusBits};
use filters::PatternList;
use std::fs;
use std::path::Path;
use tree::{Entry, EntryId, EntryStore};
use walk::Walker;

struct Fixture {
    _dir: tempfile::TempDir,
    ctx: Context,
    waa: waa::Waa,
    patterns: PatternList,
}

impl Fixture {
    fn new() -> Self {
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
        Self {
            _dir: dir,
            ctx: Context::default(),
            waa,
            patterns: PatternList::new(),
        }
    }

    fn wc(&self) -> &Path {
        self.waa.wc_path()
    }

    fn walker(&self) -> Walker<'_> {
        Walker::new(&self.ctx, &self.waa, &self.patterns)
    }

    /// Builds a store for the on-disk tree and then "records" it: every
    /// entry's fresh stat becomes the recorded state, as a commit would.
    fn recorded_store(&self) -> EntryStore {
        let root_meta = metadata::lstat(self.wc()).expect("lstat wc");
        let mut store = EntryStore::new(Entry::new(".", root_meta));
        let walker = self.walker();
        walker
            .build_tree(&mut store, EntryId::ROOT, &mut |_, _| Ok(()))
            .expect("build");

        for id in store.ids().collect::<Vec<_>>() {
            let abs = walker.abs_path(&store, id);
            let entry = store.get_mut(id);
            if let Some(local) = entry.local_meta.take() {
                entry.meta = local;
            }
            entry.entry_status = StatusBits::empty();
            entry.flags -= EntryFlags::IS_NEW;
            entry.do_userselected = false;
            entry.do_this_entry = false;
            entry.do_child_wanted = false;
            entry.was_output = false;
            if entry.meta.kind() == metadata::FileKind::File {
                let (md5, _) = checksums::compare::hash_file(&abs, None).expect("hash");
                store.get_mut(id).file_mut().expect("file").md5 = md5;
            }
        }
        store.set_full_block();
        store
    }

    fn statuses(&self, store: &mut EntryStore) -> Vec<(String, StatusBits)> {
        let mut seen = Vec::new();
        self.walker()
            .update_tree(store, &mut |store, id| {
                seen.push((store.rel_str(id), store.get(id).entry_status));
                Ok(())
            })
            .expect("walk");
        seen
    }
}

fn touch(path: &Path, seconds: i64) {
    let t = filetime::FileTime::from_unix_time(seconds, 0);
    filetime::set_file_times(path, t, t).expect("set times");
}

#[test]
fn fresh_tree_reports_everything_new() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc")).expect("mkdir");
    fs::write(fx.wc().join("etc/hosts"), b"hello\n").expect("write");

    let root_meta = metadata::lstat(fx.wc()).expect("lstat");
    let mut store = EntryStore::new(Entry::new(".", root_meta));
    let mut seen = Vec::new();
    fx.walker()
        .build_tree(&mut store, EntryId::ROOT, &mut |store, id| {
            seen.push(store.rel_str(id));
            Ok(())
        })
        .expect("build");

    // Children are reported before their directory.
    assert_eq!(seen, vec!["etc/hosts".to_owned(), "etc".to_owned()]);
    let etc = store.find_child(EntryId::ROOT, "etc").expect("etc");
    assert!(store.get(etc).flags.contains(EntryFlags::IS_NEW));
    assert_eq!(store.get(etc).entry_status, StatusBits::NEW);
}

#[test]
fn unchanged_tree_reports_nothing() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc")).expect("mkdir");
    fs::write(fx.wc().join("etc/hosts"), b"hello\n").expect("write");

    let mut store = fx.recorded_store();
    let seen = fx.statuses(&mut store);
    let changed: Vec<_> = seen
        .iter()
        .filter(|(_, st)| !st.is_empty())
        .collect();
    assert!(changed.is_empty(), "{changed:?}");
}

#[test]
fn touched_file_is_likely_then_settles_clean() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"hello\n").expect("write");
    let mut store = fx.recorded_store();

    touch(&fx.wc().join("a"), 2_000_000_000);
    let seen = fx.statuses(&mut store);
    let (_, st) = seen.iter().find(|(p, _)| p == "a").expect("a");
    assert!(st.contains(StatusBits::LIKELY));
    assert!(!st.contains(StatusBits::CHANGED));

    // Content check: same bytes, so the soft flag clears.
    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    let abs = fx.wc().join("a");
    walk::resolve_likely(&mut store, a, &fx.waa, &abs).expect("resolve");
    assert!(!store.get(a).entry_status.contains(StatusBits::LIKELY));
    assert!(!store.get(a).entry_status.contains(StatusBits::CHANGED));
}

#[test]
fn rewritten_file_reports_changed_with_new_size() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"hello\n").expect("write");
    let mut store = fx.recorded_store();

    fs::write(fx.wc().join("a"), b"hello world\n").expect("rewrite");
    let seen = fx.statuses(&mut store);
    let (_, st) = seen.iter().find(|(p, _)| p == "a").expect("a");
    assert!(st.contains(StatusBits::CHANGED));

    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert_eq!(
        store.get(a).local_meta.expect("local meta").size_or_rdev,
        12
    );
}

#[test]
fn removed_file_marks_parent_changed() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc")).expect("mkdir");
    fs::write(fx.wc().join("etc/hosts"), b"x").expect("write");
    let mut store = fx.recorded_store();

    fs::remove_file(fx.wc().join("etc/hosts")).expect("rm");
    fx.statuses(&mut store);

    let etc = store.find_child(EntryId::ROOT, "etc").expect("etc");
    let hosts = store.find_child(etc, "hosts").expect("hosts");
    assert!(store.get(hosts).entry_status.contains(StatusBits::REMOVED));
    assert!(store.get(etc).entry_status.contains(StatusBits::CHANGED));
    assert!(
        store
            .get(EntryId::ROOT)
            .entry_status
            .contains(StatusBits::CHILD_CHANGED)
    );
}

#[test]
fn removed_directory_short_circuits_children() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc/sub")).expect("mkdir");
    fs::write(fx.wc().join("etc/sub/file"), b"x").expect("write");
    let mut store = fx.recorded_store();

    fs::remove_dir_all(fx.wc().join("etc")).expect("rm -r");
    fx.statuses(&mut store);

    let etc = store.find_child(EntryId::ROOT, "etc").expect("etc");
    let sub = store.find_child(etc, "sub").expect("sub");
    let file = store.find_child(sub, "file").expect("file");
    for id in [etc, sub, file] {
        assert!(store.get(id).entry_status.contains(StatusBits::REMOVED));
    }
}

#[test]
fn new_entry_is_discovered_and_ignored_patterns_hold() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc")).expect("mkdir");
    fs::write(fx.wc().join("etc/hosts"), b"x").expect("write");
    let mut store = fx.recorded_store();

    fs::write(fx.wc().join("etc/hosts.bak"), b"y").expect("write");
    fs::write(fx.wc().join("etc/fresh"), b"z").expect("write");

    let mut fx = fx;
    fx.patterns = PatternList::parse("./**/*.bak\n").expect("patterns");
    let seen = fx.statuses(&mut store);

    assert!(seen.iter().any(|(p, st)| p == "etc/fresh" && st.contains(StatusBits::NEW)));
    assert!(!seen.iter().any(|(p, _)| p == "etc/hosts.bak"));
    let etc = store.find_child(EntryId::ROOT, "etc").expect("etc");
    assert!(store.find_child(etc, "fresh").is_some());
    assert!(store.find_child(etc, "hosts.bak").is_none());
}

#[test]
fn replaced_file_becomes_directory_with_children() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("a"), b"file content").expect("write");
    let mut store = fx.recorded_store();

    fs::remove_file(fx.wc().join("a")).expect("rm");
    fs::create_dir(fx.wc().join("a")).expect("mkdir");
    fs::write(fx.wc().join("a/b"), vec![7u8; 100]).expect("write child");

    fx.statuses(&mut store);

    let a = store.find_child(EntryId::ROOT, "a").expect("a");
    assert!(store.get(a).entry_status.is_replaced());
    assert!(store.get(a).is_dir(), "payload switched to directory");
    let b = store.find_child(a, "b").expect("b discovered");
    assert_eq!(store.get(b).entry_status, StatusBits::NEW);
    // The old file state survives in the shadow arena.
    let shadow = store.shadow_of(a).expect("shadow");
    assert!(!shadow.is_dir());
}

#[test]
fn selection_limits_reporting_to_the_chosen_subtree() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.wc().join("etc")).expect("mkdir");
    fs::create_dir_all(fx.wc().join("var")).expect("mkdir");
    fs::write(fx.wc().join("etc/hosts"), b"x").expect("write");
    fs::write(fx.wc().join("var/log"), b"y").expect("write");
    let mut store = fx.recorded_store();

    fs::write(fx.wc().join("etc/hosts"), b"xxxx").expect("rewrite");
    fs::write(fx.wc().join("var/log"), b"yyyy").expect("rewrite");

    let walker = fx.walker();
    walker
        .select_paths(&mut store, &["etc".to_owned()])
        .expect("select");
    let mut seen = Vec::new();
    walker
        .update_tree(&mut store, &mut |store, id| {
            seen.push(store.rel_str(id));
            Ok(())
        })
        .expect("walk");

    assert!(seen.iter().any(|p| p == "etc/hosts"));
    assert!(!seen.iter().any(|p| p == "var/log"), "{seen:?}");
}

#[test]
fn filter_narrows_reports_and_memoizes() {
    let fx = Fixture::new();
    fs::write(fx.wc().join("kept"), b"x").expect("write");
    fs::write(fx.wc().join("gone"), b"y").expect("write");
    let mut store = fx.recorded_store();

    fs::remove_file(fx.wc().join("gone")).expect("rm");
    fs::write(fx.wc().join("kept"), b"xx").expect("rewrite");

    let mut fx = fx;
    fx.ctx
        .filter
        .set(base::options::Priority::CommandLine, StatusBits::REMOVED);
    let seen = fx.statuses(&mut store);

    let paths: Vec<&str> = seen.iter().map(|(p, _)| p.as_str()).collect();
    assert!(paths.contains(&"gone"));
    assert!(!paths.contains(&"kept"), "{paths:?}");

    for id in store.ids().collect::<Vec<_>>() {
        assert!(store.get(id).filter_computed(), "{}", store.get(id).name);
    }
}
