// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use regroup_domain::{CounterKey, DEFAULT_GROUP_NAME, SeedSource};

use super::{bounds, default_named_groups, run_migration};
use crate::sequence::MemorySequenceCounter;
use crate::tests::create_test_options;
use crate::{NewFriend, NewFriendGroup, Persistence};

fn group_key() -> CounterKey {
    create_test_options().friend_group_seq_key
}

fn friend_key() -> CounterKey {
    create_test_options().friend_seq_key
}

/// Ten owners `u00`..`u09`; `u00`..`u02` already own a group with the
/// default name in various states.
fn seed_ten_owners(persistence: &mut Persistence) -> Vec<i64> {
    for i in 0..10 {
        persistence.insert_user(&format!("u{i:02}")).unwrap();
    }
    let existing = vec![
        persistence
            .insert_friend_group(&NewFriendGroup::new("u00", DEFAULT_GROUP_NAME))
            .unwrap(),
        persistence
            .insert_friend_group(&NewFriendGroup::new("u01", DEFAULT_GROUP_NAME).deleted())
            .unwrap(),
        persistence
            .insert_friend_group(
                &NewFriendGroup::new("u02", DEFAULT_GROUP_NAME)
                    .default_group()
                    .with_version(50),
            )
            .unwrap(),
    ];
    persistence
        .insert_friend_group(&NewFriendGroup::new("u00", "Work").with_version(3))
        .unwrap();
    existing
}

#[test]
fn test_missing_defaults_are_inserted_before_existing_are_refreshed() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let existing_ids = seed_ten_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(report.existing_defaults, 3);
    assert_eq!(report.missing_defaults, 7);
    assert_eq!(report.friends_to_update, 0);
    assert_eq!(bounds(report.inserted_default_versions), Some((1, 7)));
    assert_eq!(bounds(report.refreshed_default_versions), Some((8, 3)));
    assert_eq!(report.friend_versions, None);
    assert_eq!(report.versions_consumed(), 10);
    assert_eq!(report.attempts, 1);
    assert!(!report.dry_run);

    let groups = default_named_groups(&mut persistence);
    assert_eq!(groups.len(), 10);

    // Existing rows are refreshed in ID order.
    for (expected_version, id) in (8..).zip(&existing_ids) {
        let group = groups.iter().find(|group| group.id == *id).unwrap();
        assert!(group.is_default && !group.is_deleted, "{group:?}");
        assert_eq!(group.version, expected_version);
    }

    // New rows are versioned in owner order.
    for (expected_version, i) in (1..).zip(3..10) {
        let uid = format!("u{i:02}");
        let group = groups.iter().find(|group| group.uid == uid).unwrap();
        assert!(group.is_default && !group.is_deleted, "{group:?}");
        assert_eq!(group.version, expected_version, "version of {uid}");
    }

    assert_eq!(counter.value(&group_key()), 10);
    assert_eq!(counter.value(&friend_key()), 0);
}

#[test]
fn test_groups_with_other_names_are_untouched() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_ten_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();

    run_migration(&mut persistence, &counter, &create_test_options());

    let work = persistence
        .list_friend_groups()
        .unwrap()
        .into_iter()
        .find(|group| group.name == "Work")
        .unwrap();
    assert!(!work.is_default);
    assert_eq!(work.version, 3);
}

#[test]
fn test_rerun_inserts_nothing_and_uses_fresh_versions() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_ten_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let options = create_test_options();

    run_migration(&mut persistence, &counter, &options);
    let groups_after_first: usize = persistence.list_friend_groups().unwrap().len();

    let second = run_migration(&mut persistence, &counter, &options);

    assert_eq!(second.missing_defaults, 0);
    assert_eq!(second.existing_defaults, 10);
    assert_eq!(second.friends_to_update, 0);
    assert_eq!(second.inserted_default_versions, None);
    assert_eq!(bounds(second.refreshed_default_versions), Some((11, 10)));
    assert_eq!(
        persistence.list_friend_groups().unwrap().len(),
        groups_after_first
    );
}

#[test]
fn test_versions_continue_from_counter_state() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    persistence.insert_user("alice").unwrap();
    let counter = MemorySequenceCounter::new().with_value(&group_key(), 1_000);

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(bounds(report.inserted_default_versions), Some((1_001, 1)));
    assert_eq!(default_named_groups(&mut persistence)[0].version, 1_001);
}

#[test]
fn test_custom_default_name_is_used() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    persistence.insert_user("alice").unwrap();
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.default_group_name = regroup_domain::GroupName::new("Friends").unwrap();

    run_migration(&mut persistence, &counter, &options);

    let groups = persistence.list_friend_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Friends");
    assert!(default_named_groups(&mut persistence).is_empty());
}

#[test]
fn test_empty_store_reserves_nothing() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let counter = MemorySequenceCounter::new();

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(report.versions_consumed(), 0);
    assert!(counter.reservations().is_empty());
}

#[test]
fn test_skip_default_groups_leaves_groups_alone() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_ten_owners(&mut persistence);
    let before = persistence.list_friend_groups().unwrap();
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.skip_default_groups = true;

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.existing_defaults, 0);
    assert_eq!(report.missing_defaults, 0);
    assert_eq!(persistence.list_friend_groups().unwrap(), before);
    assert_eq!(counter.value(&group_key()), 0);
}

// ============================================================================
// Seed sources
// ============================================================================

/// `alice` is a user without friends; `bob` and `carol` own friend rows
/// but are not users.
fn seed_mixed_owners(persistence: &mut Persistence) {
    persistence.insert_user("alice").unwrap();
    persistence
        .insert_friend(&NewFriend::new("bob", "alice"))
        .unwrap();
    persistence
        .insert_friend(&NewFriend::new("carol", "alice"))
        .unwrap();
    persistence
        .insert_friend(&NewFriend::new("carol", "bob"))
        .unwrap();
}

fn owners_with_default(persistence: &mut Persistence) -> Vec<String> {
    let mut owners: Vec<String> = default_named_groups(persistence)
        .into_iter()
        .map(|group| group.uid)
        .collect();
    owners.sort();
    owners
}

#[test]
fn test_seed_from_users() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_mixed_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(report.missing_defaults, 1);
    assert_eq!(owners_with_default(&mut persistence), vec!["alice"]);
    // Friend rows of owners without a default group have no target.
    assert_eq!(report.friends_to_update, 0);
}

#[test]
fn test_seed_from_friends() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_mixed_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.seed_source = SeedSource::Friends;

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.missing_defaults, 2);
    assert_eq!(owners_with_default(&mut persistence), vec!["bob", "carol"]);
    assert_eq!(report.friends_to_update, 3);
    assert_eq!(bounds(report.friend_versions), Some((1, 3)));
}

#[test]
fn test_seed_from_both() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_mixed_owners(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.seed_source = SeedSource::Both;

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.missing_defaults, 3);
    assert_eq!(
        owners_with_default(&mut persistence),
        vec!["alice", "bob", "carol"]
    );
}
