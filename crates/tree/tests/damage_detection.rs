use base::ErrorKind;
use metadata::StatInfo;
use tree::{Entry, EntryId, EntryStore, dir_file};

fn dir_meta(ino: u64) -> StatInfo {
    StatInfo {
        mode: 0o040_755,
        ino,
        ..StatInfo::default()
    }
}

fn file_meta(ino: u64) -> StatInfo {
    StatInfo {
        mode: 0o100_644,
        ino,
        ..StatInfo::default()
    }
}

fn serialized() -> Vec<u8> {
    let mut store = EntryStore::new(Entry::new(".", dir_meta(2)));
    let sub = store.add_child(EntryId::ROOT, Entry::new("etc", dir_meta(10)));
    store.add_child(sub, Entry::new("hosts", file_meta(20)));
    let mut out = Vec::new();
    dir_file::write(&mut store, &mut out).expect("write");
    out
}

fn expect_damaged(bytes: &[u8]) {
    let err = dir_file::read(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TreeDamaged, "{err}");
}

#[test]
fn valid_file_reads() {
    assert!(dir_file::read(&serialized()).is_ok());
}

#[test]
fn truncated_header_is_rejected() {
    let bytes = serialized();
    expect_damaged(&bytes[..32]);
}

#[test]
fn header_without_dollar_terminator_is_rejected() {
    let mut bytes = serialized();
    bytes[62] = b' ';
    expect_damaged(&bytes);
}

#[test]
fn wrong_version_is_rejected() {
    let mut bytes = serialized();
    assert_eq!(bytes[0], b'1');
    bytes[0] = b'7';
    expect_damaged(&bytes);
}

#[test]
fn missing_final_terminator_is_rejected() {
    let mut bytes = serialized();
    bytes.truncate(bytes.len() - 2);
    bytes.extend_from_slice(b"x\n");
    expect_damaged(&bytes);
}

#[test]
fn forward_parent_reference_is_rejected() {
    let bytes = serialized();
    let text = String::from_utf8(bytes).expect("utf8");
    // Rewrite the second record's parent position (field 13) to point at
    // itself.
    let mut records: Vec<String> = text[64..]
        .split_inclusive('\n')
        .map(str::to_owned)
        .collect();
    let mut fields: Vec<String> = records[1]
        .splitn(17, ' ')
        .map(str::to_owned)
        .collect();
    fields[12] = "2".to_owned();
    records[1] = fields.join(" ");
    let mut bytes = text[..64].as_bytes().to_vec();
    for r in &records {
        bytes.extend_from_slice(r.as_bytes());
    }
    expect_damaged(&bytes);
}

#[test]
fn child_count_overflow_is_rejected() {
    let bytes = serialized();
    let text = String::from_utf8(bytes).expect("utf8");
    // Shrink the root's recorded child count to zero, so attaching "etc"
    // overflows.
    let mut records: Vec<String> = text[64..]
        .split_inclusive('\n')
        .map(str::to_owned)
        .collect();
    let mut fields: Vec<String> = records[0]
        .splitn(17, ' ')
        .map(str::to_owned)
        .collect();
    fields[13] = "0".to_owned();
    records[0] = fields.join(" ");
    let mut bytes = text[..64].as_bytes().to_vec();
    for r in &records {
        bytes.extend_from_slice(r.as_bytes());
    }
    expect_damaged(&bytes);
}

#[test]
fn garbage_record_is_rejected() {
    let mut bytes = serialized()[..64].to_vec();
    bytes.extend_from_slice(b"not a record at all\0\n");
    expect_damaged(&bytes);
}
