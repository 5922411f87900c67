use filters::{Decision, PatternList};
use metadata::StatInfo;

#[test]
fn serialize_then_parse_keeps_behavior() {
    let source = "\
take,./etc/ssh/**
group:backup,prop:trackfs:commit-pipe=gzip,./var/backups/**
./var/**
regex:.*\\.swp
";
    let list = PatternList::parse(source).expect("parse");
    let reparsed = PatternList::parse(&list.serialize()).expect("reparse");
    assert_eq!(list.len(), reparsed.len());

    let st = StatInfo {
        mode: 0o100_600,
        ..StatInfo::default()
    };
    for path in ["etc/ssh/sshd_config", "var/backups/x", "var/cache/y", "a.swp", "etc/hosts"] {
        assert_eq!(list.decide(path, &st), reparsed.decide(path, &st), "{path}");
    }
}

#[test]
fn comments_and_blank_lines_are_skipped() {
    let list = PatternList::parse("# header\n\n./tmp/**\n").expect("parse");
    assert_eq!(list.len(), 1);
}

#[test]
fn auto_props_come_from_the_winning_group() {
    let list = PatternList::parse(
        "group:pipes,prop:trackfs:commit-pipe=gzip -c,./var/log/**\n./var/**\n",
    )
    .expect("parse");
    let st = StatInfo {
        mode: 0o100_644,
        ..StatInfo::default()
    };
    assert_eq!(
        list.decide("var/log/syslog", &st),
        Decision::Taken {
            group: Some("pipes".to_owned())
        }
    );
    assert_eq!(
        list.auto_props("var/log/syslog", &st),
        &[("trackfs:commit-pipe".to_owned(), "gzip -c".to_owned())]
    );
    assert!(list.auto_props("var/cache/x", &st).is_empty());
}
