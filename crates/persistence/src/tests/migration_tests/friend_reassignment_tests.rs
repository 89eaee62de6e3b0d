// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use regroup_domain::{DEFAULT_GROUP_NAME, FriendFilter};

use super::{bounds, default_named_groups, friend, run_migration, seed_friend_graph};
use crate::sequence::MemorySequenceCounter;
use crate::tests::create_test_options;
use crate::{NewFriend, NewFriendGroup, Persistence};

#[test]
fn test_friends_move_to_their_target_group() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(report.missing_defaults, 1, "bob lacks a default group");
    assert_eq!(report.existing_defaults, 1);
    assert_eq!(report.friends_to_update, 3);
    assert_eq!(bounds(report.friend_versions), Some((1, 3)));

    let bob_default = default_named_groups(&mut persistence)
        .into_iter()
        .find(|group| group.uid == "bob")
        .unwrap()
        .id;

    // Ungrouped friend goes to the owner's default group.
    let to_bob = friend(&mut persistence, graph.alice_to_bob);
    assert_eq!(to_bob.friend_group_id, Some(graph.alice_default));
    assert_eq!(to_bob.version, 1);

    // A deleted membership does not count as an explicit group.
    let to_erin = friend(&mut persistence, graph.alice_to_erin);
    assert_eq!(to_erin.friend_group_id, Some(graph.alice_default));
    assert_eq!(to_erin.version, 2);

    // The group created by this run is a valid target.
    let bob_to_alice = friend(&mut persistence, graph.bob_to_alice);
    assert_eq!(bob_to_alice.friend_group_id, Some(bob_default));
    assert_eq!(bob_to_alice.version, 3);
}

#[test]
fn test_rows_already_at_target_are_not_touched() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();

    run_migration(&mut persistence, &counter, &create_test_options());

    let to_carol = friend(&mut persistence, graph.alice_to_carol);
    assert_eq!(to_carol.friend_group_id, Some(graph.alice_work));
    assert_eq!(to_carol.version, 0);

    let to_dave = friend(&mut persistence, graph.alice_to_dave);
    assert_eq!(to_dave.friend_group_id, Some(graph.alice_default));
    assert_eq!(to_dave.version, 0);

    let to_frank = friend(&mut persistence, graph.alice_to_frank_deleted);
    assert_eq!(to_frank.friend_group_id, None);
    assert_eq!(to_frank.version, 0);
}

#[test]
fn test_second_run_finds_no_friends_to_update() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let options = create_test_options();

    run_migration(&mut persistence, &counter, &options);
    let friends_after_first = persistence.list_friends().unwrap();
    let second = run_migration(&mut persistence, &counter, &options);

    assert_eq!(second.friends_to_update, 0);
    assert_eq!(second.friend_versions, None);
    assert_eq!(persistence.list_friends().unwrap(), friends_after_first);
}

#[test]
fn test_excluded_targets_are_never_reassigned() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.excluded_targets = vec![String::from("bob"), String::from("bob")];

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.friends_to_update, 2);
    let to_bob = friend(&mut persistence, graph.alice_to_bob);
    assert_eq!(to_bob.friend_group_id, None);
    assert_eq!(to_bob.version, 0);
    assert_eq!(friend(&mut persistence, graph.alice_to_erin).version, 1);
    assert_eq!(friend(&mut persistence, graph.bob_to_alice).version, 2);
}

#[test]
fn test_deleted_only_filter_repairs_deleted_rows() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.friend_filter = FriendFilter::DeletedOnly;

    let report = run_migration(&mut persistence, &counter, &options);

    assert_eq!(report.friends_to_update, 1);
    let to_frank = friend(&mut persistence, graph.alice_to_frank_deleted);
    assert_eq!(to_frank.friend_group_id, Some(graph.alice_default));
    assert_eq!(to_frank.version, 1);
    assert!(to_frank.is_deleted);
    assert_eq!(friend(&mut persistence, graph.alice_to_bob).friend_group_id, None);
}

#[test]
fn test_skip_default_groups_still_reassigns_friends() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.skip_default_groups = true;

    let report = run_migration(&mut persistence, &counter, &options);

    // bob has no default group, so only alice's rows move.
    assert_eq!(report.friends_to_update, 2);
    assert_eq!(report.inserted_default_versions, None);
    assert_eq!(
        friend(&mut persistence, graph.alice_to_bob).friend_group_id,
        Some(graph.alice_default)
    );
    assert_eq!(friend(&mut persistence, graph.bob_to_alice).friend_group_id, None);
}

#[test]
fn test_smallest_active_group_wins_ties() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    persistence.insert_user("alice").unwrap();
    persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Old").default_group().deleted())
        .unwrap();
    let first_default = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Close").default_group())
        .unwrap();
    persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Other").default_group())
        .unwrap();

    let removed = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Removed").deleted())
        .unwrap();
    let team_a = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Team A"))
        .unwrap();
    let team_b = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Team B"))
        .unwrap();
    persistence
        .insert_group_member("alice", "bob", removed, false)
        .unwrap();
    persistence
        .insert_group_member("alice", "carol", team_b, false)
        .unwrap();
    persistence
        .insert_group_member("alice", "carol", team_a, false)
        .unwrap();

    let to_bob = persistence
        .insert_friend(&NewFriend::new("alice", "bob"))
        .unwrap();
    let to_carol = persistence
        .insert_friend(&NewFriend::new("alice", "carol"))
        .unwrap();

    let counter = MemorySequenceCounter::new();
    let mut options = create_test_options();
    options.skip_default_groups = true;
    run_migration(&mut persistence, &counter, &options);

    // Membership in a deleted group is ignored; the earliest active default wins.
    assert_eq!(
        friend(&mut persistence, to_bob).friend_group_id,
        Some(first_default)
    );
    // Several explicit groups resolve to the smallest ID.
    assert_eq!(friend(&mut persistence, to_carol).friend_group_id, Some(team_a));
}

#[test]
fn test_default_named_group_gets_default_flag_before_reassignment() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    persistence.insert_user("alice").unwrap();
    // Named like the default but not flagged yet.
    let group = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", DEFAULT_GROUP_NAME))
        .unwrap();
    let to_bob = persistence
        .insert_friend(&NewFriend::new("alice", "bob"))
        .unwrap();
    let counter = MemorySequenceCounter::new();

    let report = run_migration(&mut persistence, &counter, &create_test_options());

    assert_eq!(report.existing_defaults, 1);
    assert_eq!(report.friends_to_update, 1);
    assert_eq!(friend(&mut persistence, to_bob).friend_group_id, Some(group));
}
