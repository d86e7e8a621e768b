//! Pure release-management logic: ordering, rollback selection,
//! and retention.

use lightfold::release::{previous_release, releases_to_delete};

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[test]
fn timestamps_sort_lexicographically_and_chronologically() {
    let mut releases = names(&[
        "20250102000000",
        "20241231235959",
        "20250101000000",
    ]);
    releases.sort();
    assert_eq!(
        releases,
        names(&["20241231235959", "20250101000000", "20250102000000"])
    );
}

#[test]
fn rollback_picks_the_release_before_current() {
    // Seeded release, then a bad push: rollback target is the
    // seed.
    let releases = names(&["20250101000000", "20250102000000"]);
    let prev = previous_release(&releases, Some("20250102000000"));
    assert_eq!(prev.as_deref(), Some("20250101000000"));
}

#[test]
fn no_rollback_target_on_first_deploy() {
    let releases = names(&["20250101000000"]);
    assert_eq!(previous_release(&releases, Some("20250101000000")), None);
}

#[test]
fn no_rollback_past_the_oldest_release() {
    let releases = names(&["20250101000000", "20250102000000"]);
    assert_eq!(previous_release(&releases, Some("20250101000000")), None);
}

#[test]
fn dangling_current_falls_back_to_newest_but_one() {
    let releases = names(&["20250101000000", "20250102000000", "20250103000000"]);
    let prev = previous_release(&releases, Some("20250199999999"));
    assert_eq!(prev.as_deref(), Some("20250102000000"));
}

#[test]
fn retention_keeps_newest_five_by_default() {
    let releases = names(&[
        "20250101000000",
        "20250102000000",
        "20250103000000",
        "20250104000000",
        "20250105000000",
        "20250106000000",
        "20250107000000",
    ]);
    let doomed = releases_to_delete(&releases, Some("20250107000000"), 5);
    assert_eq!(doomed, names(&["20250101000000", "20250102000000"]));
}

#[test]
fn retention_never_deletes_the_active_release() {
    let releases = names(&[
        "20250101000000",
        "20250102000000",
        "20250103000000",
        "20250104000000",
    ]);
    // Operator rolled all the way back; the active release is the
    // oldest on disk.
    let doomed = releases_to_delete(&releases, Some("20250101000000"), 1);
    assert!(!doomed.contains(&"20250101000000".to_string()));
    assert_eq!(
        doomed,
        names(&["20250102000000", "20250103000000"])
    );
}

#[test]
fn retention_is_a_noop_below_the_limit() {
    let releases = names(&["20250101000000"]);
    assert!(releases_to_delete(&releases, Some("20250101000000"), 5).is_empty());
}
