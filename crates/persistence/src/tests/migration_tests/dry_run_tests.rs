// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use regroup_domain::DEFAULT_GROUP_NAME;

use super::{run_migration, seed_friend_graph};
use crate::sequence::{DbSequenceCounter, MemorySequenceCounter};
use crate::tests::create_test_options;
use crate::{NewFriend, NewFriendGroup, Persistence};

/// One owner with a default group and four ungrouped friends, plus five
/// users without a default group.
fn seed_dry_run_store(persistence: &mut Persistence) {
    persistence.insert_user("owner").unwrap();
    persistence
        .insert_friend_group(&NewFriendGroup::new("owner", DEFAULT_GROUP_NAME).default_group())
        .unwrap();
    for i in 0..4 {
        persistence
            .insert_friend(&NewFriend::new("owner", &format!("friend{i}")))
            .unwrap();
    }
    for i in 0..5 {
        persistence.insert_user(&format!("lonely{i}")).unwrap();
    }
}

#[test]
fn test_dry_run_reports_counts_and_changes_nothing() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_dry_run_store(&mut persistence);
    let groups_before = persistence.list_friend_groups().unwrap();
    let friends_before = persistence.list_friends().unwrap();
    let counter = MemorySequenceCounter::new();
    let options = create_test_options().with_dry_run(true);

    let report = run_migration(&mut persistence, &counter, &options);

    assert!(report.dry_run);
    assert_eq!(report.existing_defaults, 1);
    assert_eq!(report.missing_defaults, 5);
    assert_eq!(report.friends_to_update, 4);
    assert_eq!(report.inserted_default_versions, None);
    assert_eq!(report.refreshed_default_versions, None);
    assert_eq!(report.friend_versions, None);
    assert_eq!(report.versions_consumed(), 0);
    assert_eq!(report.attempts, 1);

    assert!(counter.reservations().is_empty(), "dry run must not reserve");
    assert_eq!(persistence.list_friend_groups().unwrap(), groups_before);
    assert_eq!(persistence.list_friends().unwrap(), friends_before);
}

#[test]
fn test_dry_run_leaves_database_counter_untouched() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let counter = DbSequenceCounter::open_in_memory().unwrap();
    let options = create_test_options().with_dry_run(true);

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.friends_to_update, 2);
    assert_eq!(counter.value(&options.friend_seq_key).unwrap(), 0);
    assert_eq!(counter.value(&options.friend_group_seq_key).unwrap(), 0);
}

#[test]
fn test_live_run_after_dry_run_matches_its_counts() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_dry_run_store(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let options = create_test_options();

    let dry = run_migration(&mut persistence, &counter, &options.clone().with_dry_run(true));
    let live = run_migration(&mut persistence, &counter, &options);

    assert_eq!(dry.existing_defaults, live.existing_defaults);
    assert_eq!(dry.missing_defaults, live.missing_defaults);
    // Owners gaining a default only get targets in a live run.
    assert!(live.friends_to_update >= dry.friends_to_update);
    assert!(!live.dry_run);
}
