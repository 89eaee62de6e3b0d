// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Default friend group migration scenarios against `SQLite`.

mod default_group_tests;
mod dry_run_tests;
mod failure_tests;
mod friend_reassignment_tests;

use regroup_domain::{DEFAULT_GROUP_NAME, MigrationOptions, MigrationReport, VersionRange};

use crate::sequence::SequenceCounter;
use crate::tx::TransactionManager;
use crate::{FriendData, FriendGroupData, NewFriend, NewFriendGroup, Persistence};

/// Runs the migration with a single-attempt manager.
pub fn run_migration(
    persistence: &mut Persistence,
    counter: &dyn SequenceCounter,
    options: &MigrationOptions,
) -> MigrationReport {
    persistence
        .migrate_friend_groups(&TransactionManager::default(), counter, options)
        .unwrap()
}

/// `(start, count)` of a reported range.
pub fn bounds(range: Option<VersionRange>) -> Option<(i64, u64)> {
    range.map(|range| (range.start(), range.count()))
}

/// Groups carrying the default name, ordered by ID.
pub fn default_named_groups(persistence: &mut Persistence) -> Vec<FriendGroupData> {
    persistence
        .list_friend_groups()
        .unwrap()
        .into_iter()
        .filter(|group| group.name == DEFAULT_GROUP_NAME)
        .collect()
}

pub fn friend(persistence: &mut Persistence, id: i64) -> FriendData {
    persistence
        .list_friends()
        .unwrap()
        .into_iter()
        .find(|friend| friend.id == id)
        .unwrap()
}

/// IDs of the rows seeded by [`seed_friend_graph`].
pub struct FriendGraph {
    pub alice_default: i64,
    pub alice_work: i64,
    pub alice_to_bob: i64,
    pub alice_to_carol: i64,
    pub alice_to_dave: i64,
    pub alice_to_erin: i64,
    pub bob_to_alice: i64,
    pub alice_to_frank_deleted: i64,
}

/// Seeds a small graph:
///
/// - `alice` owns the default group and a `Work` group; `carol` is an
///   active member of `Work`, `erin` a deleted one.
/// - `bob` is a user without any group.
/// - `alice` has friends `bob` (ungrouped), `carol` (in `Work`), `dave`
///   (already in the default group), `erin` (in `Work`) and a deleted
///   friendship with `frank`; `bob` has friend `alice` (ungrouped).
pub fn seed_friend_graph(persistence: &mut Persistence) -> FriendGraph {
    persistence.insert_user("alice").unwrap();
    persistence.insert_user("bob").unwrap();

    let alice_default = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", DEFAULT_GROUP_NAME).default_group())
        .unwrap();
    let alice_work = persistence
        .insert_friend_group(&NewFriendGroup::new("alice", "Work"))
        .unwrap();
    persistence
        .insert_group_member("alice", "carol", alice_work, false)
        .unwrap();
    persistence
        .insert_group_member("alice", "erin", alice_work, true)
        .unwrap();

    FriendGraph {
        alice_default,
        alice_work,
        alice_to_bob: persistence
            .insert_friend(&NewFriend::new("alice", "bob"))
            .unwrap(),
        alice_to_carol: persistence
            .insert_friend(&NewFriend::new("alice", "carol").in_group(alice_work))
            .unwrap(),
        alice_to_dave: persistence
            .insert_friend(&NewFriend::new("alice", "dave").in_group(alice_default))
            .unwrap(),
        alice_to_erin: persistence
            .insert_friend(&NewFriend::new("alice", "erin").in_group(alice_work))
            .unwrap(),
        bob_to_alice: persistence
            .insert_friend(&NewFriend::new("bob", "alice"))
            .unwrap(),
        alice_to_frank_deleted: persistence
            .insert_friend(&NewFriend::new("alice", "frank").deleted())
            .unwrap(),
    }
}
