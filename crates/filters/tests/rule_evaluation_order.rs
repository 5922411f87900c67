use filters::{Decision, PatternList, Position};
use metadata::StatInfo;

fn file_stat() -> StatInfo {
    StatInfo {
        mode: 0o100_644,
        ..StatInfo::default()
    }
}

#[test]
fn first_matching_pattern_wins_take_before_ignore() {
    let mut list = PatternList::new();
    list.add_specs(
        ["take,./etc/keepme/**", "./etc/**"],
        Position::End,
    )
    .expect("specs");

    let st = file_stat();
    assert_eq!(
        list.decide("etc/keepme/file", &st),
        Decision::Taken { group: None }
    );
    assert_eq!(list.decide("etc/other", &st), Decision::Ignored);
}

#[test]
fn first_matching_pattern_wins_ignore_before_take() {
    let mut list = PatternList::new();
    list.add_specs(
        ["./etc/**", "take,./etc/keepme/**"],
        Position::End,
    )
    .expect("specs");

    let st = file_stat();
    // The broad ignore comes first, so even the take path is dropped.
    assert_eq!(list.decide("etc/keepme/file", &st), Decision::Ignored);
}

#[test]
fn front_insertion_preserves_batch_order() {
    let mut list = PatternList::new();
    list.add_specs(["./c/**"], Position::End).expect("specs");
    list.add_specs(["take,./a/**", "./b/**"], Position::Front)
        .expect("specs");

    let serialized = list.serialize();
    let lines: Vec<&str> = serialized.lines().collect();
    assert_eq!(lines, vec!["take,./a/**", "./b/**", "./c/**"]);
}

#[test]
fn unmatched_paths_pass_through() {
    let mut list = PatternList::new();
    list.add_specs(["./tmp/**"], Position::End).expect("specs");
    assert_eq!(
        list.decide("etc/hosts", &file_stat()),
        Decision::Unmatched
    );
}
