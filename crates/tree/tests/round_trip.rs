use base::status::EntryFlags;
use metadata::StatInfo;
use tree::{Entry, EntryId, EntryStore, dir_file};

fn dir_meta(ino: u64) -> StatInfo {
    StatInfo {
        mode: 0o040_755,
        dev: 1,
        ino,
        mtime_sec: 1_700_000_000,
        ..StatInfo::default()
    }
}

fn file_meta(ino: u64, size: u64) -> StatInfo {
    StatInfo {
        mode: 0o100_644,
        dev: 1,
        ino,
        size_or_rdev: size,
        mtime_sec: 1_700_000_100,
        mtime_nsec: 123_456_789,
        uid: 1000,
        gid: 100,
        ..StatInfo::default()
    }
}

/// A tree with nested directories, deliberately unsorted children.
fn sample_store() -> EntryStore {
    let mut store = EntryStore::new(Entry::new(".", dir_meta(2)));
    let etc = store.add_child(EntryId::ROOT, Entry::new("etc", dir_meta(90)));
    let var = store.add_child(EntryId::ROOT, Entry::new("var", dir_meta(40)));

    let hosts = store.add_child(etc, Entry::new("hosts", file_meta(120, 6)));
    store.get_mut(hosts).repos_rev = 3;
    store.get_mut(hosts).url_id = Some(0);
    store.get_mut(hosts).file_mut().expect("file").md5 = [0x5d; 16];

    let passwd = store.add_child(etc, Entry::new("passwd", file_meta(95, 1000)));
    store.get_mut(passwd).flags |= EntryFlags::CHECK;

    let log = store.add_child(var, Entry::new("log", dir_meta(41)));
    store.add_child(log, Entry::new("syslog", file_meta(300, 12_345)));
    store
}

fn serialize(store: &mut EntryStore) -> Vec<u8> {
    let mut out = Vec::new();
    dir_file::write(store, &mut out).expect("write");
    out
}

#[test]
fn read_back_matches_structure_and_fields() {
    let mut store = sample_store();
    let bytes = serialize(&mut store);
    let read = dir_file::read(&bytes).expect("read");

    assert_eq!(read.len(), store.len());
    let etc = read.find_child(EntryId::ROOT, "etc").expect("etc");
    let hosts = read.find_child(etc, "hosts").expect("hosts");
    let entry = read.get(hosts);
    assert_eq!(entry.repos_rev, 3);
    assert_eq!(entry.url_id, Some(0));
    assert_eq!(entry.file().expect("file").md5, [0x5d; 16]);
    assert_eq!(entry.meta, store.get(store.find_child(
        store.find_child(EntryId::ROOT, "etc").expect("etc"), "hosts").expect("hosts")).meta);

    let passwd = read.find_child(etc, "passwd").expect("passwd");
    assert_eq!(read.get(passwd).flags, EntryFlags::CHECK);

    let var = read.find_child(EntryId::ROOT, "var").expect("var");
    let log = read.find_child(var, "log").expect("log");
    assert_eq!(read.children(log).len(), 1);
}

#[test]
fn serialization_is_reproducible_byte_for_byte() {
    let mut store = sample_store();
    let first = serialize(&mut store);
    let reread = dir_file::read(&first).expect("read");
    let mut reread = reread;
    let second = serialize(&mut reread);
    assert_eq!(first, second);
}

#[test]
fn records_are_parent_before_child_and_inode_ascending() {
    let mut store = sample_store();
    let bytes = serialize(&mut store);

    // Parse the raw records: field 0 is the inode, field 12 the parent
    // position.
    let mut positions_seen = 0u32;
    let mut parent_of: Vec<u32> = Vec::new();
    let mut inode_of: Vec<u64> = Vec::new();
    for record in bytes[64..].split_inclusive(|&b| b == b'\n') {
        let text = std::str::from_utf8(&record[..record.len() - 2]).expect("utf8");
        let fields: Vec<&str> = text.splitn(17, ' ').collect();
        assert_eq!(fields.len(), 17);
        inode_of.push(fields[0].parse().expect("inode"));
        parent_of.push(fields[12].parse().expect("parent"));
        positions_seen += 1;
    }
    assert_eq!(positions_seen, 7);

    // Every parent reference points to a strictly smaller file position.
    for (index, parent) in parent_of.iter().enumerate().skip(1) {
        assert!(*parent >= 1);
        assert!((*parent as usize) < index + 1, "record {index} parent {parent}");
    }
    assert_eq!(parent_of[0], 0, "root has no parent");

    // Within one directory, inodes ascend.
    for dir_pos in 1..=positions_seen {
        let childs: Vec<u64> = (0..positions_seen as usize)
            .filter(|i| parent_of[*i] == dir_pos)
            .map(|i| inode_of[i])
            .collect();
        let mut sorted = childs.clone();
        sorted.sort_unstable();
        assert_eq!(childs, sorted, "children of position {dir_pos}");
    }
}

#[test]
fn ignored_entries_are_left_out_with_their_subtree() {
    let mut store = sample_store();
    let var = store.find_child(EntryId::ROOT, "var").expect("var");
    store.get_mut(var).to_be_ignored = true;
    let bytes = serialize(&mut store);

    let read = dir_file::read(&bytes).expect("read");
    assert!(read.find_child(EntryId::ROOT, "var").is_none());
    assert_eq!(read.len(), 4, "var, var/log and var/log/syslog are gone");
}

#[test]
fn hardlinks_serialize_deterministically() {
    let mut store = EntryStore::new(Entry::new(".", dir_meta(2)));
    // Two names for the same (dev, ino).
    store.add_child(EntryId::ROOT, Entry::new("second", file_meta(77, 1)));
    store.add_child(EntryId::ROOT, Entry::new("first", file_meta(77, 1)));
    let bytes_a = serialize(&mut store);

    let mut other = EntryStore::new(Entry::new(".", dir_meta(2)));
    other.add_child(EntryId::ROOT, Entry::new("first", file_meta(77, 1)));
    other.add_child(EntryId::ROOT, Entry::new("second", file_meta(77, 1)));
    let bytes_b = serialize(&mut other);

    assert_eq!(bytes_a, bytes_b, "insertion order must not matter");
}
