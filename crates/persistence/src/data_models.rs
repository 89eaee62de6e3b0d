// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

/// A row of `friend_groups`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendGroupData {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub is_default: bool,
    pub is_deleted: bool,
    pub version: i64,
}

/// A row of `friends`: `uid`'s relationship to `to_uid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendData {
    pub id: i64,
    pub uid: String,
    pub to_uid: String,
    pub friend_group_id: Option<i64>,
    pub is_deleted: bool,
    pub version: i64,
}

/// Values for a new `friend_groups` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFriendGroup {
    pub uid: String,
    pub name: String,
    pub is_default: bool,
    pub is_deleted: bool,
    pub version: i64,
}

impl NewFriendGroup {
    /// An active, non-default group at version 0.
    #[must_use]
    pub fn new(uid: &str, name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            is_default: false,
            is_deleted: false,
            version: 0,
        }
    }

    #[must_use]
    pub const fn default_group(mut self) -> Self {
        self.is_default = true;
        self
    }

    #[must_use]
    pub const fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

/// Values for a new `friends` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFriend {
    pub uid: String,
    pub to_uid: String,
    pub friend_group_id: Option<i64>,
    pub is_deleted: bool,
    pub version: i64,
}

impl NewFriend {
    /// An active friendship with no group at version 0.
    #[must_use]
    pub fn new(uid: &str, to_uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            to_uid: to_uid.to_string(),
            friend_group_id: None,
            is_deleted: false,
            version: 0,
        }
    }

    #[must_use]
    pub const fn in_group(mut self, group_id: i64) -> Self {
        self.friend_group_id = Some(group_id);
        self
    }

    #[must_use]
    pub const fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    #[must_use]
    pub const fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

/// Row tuple of `friend_groups` in column order.
pub type FriendGroupRow = (i64, String, String, i32, i32, i64);

/// Row tuple of `friends` in column order.
pub type FriendRow = (i64, String, String, Option<i64>, i32, i64);

impl From<FriendGroupRow> for FriendGroupData {
    fn from(row: FriendGroupRow) -> Self {
        let (id, uid, name, is_default, is_deleted, version) = row;
        Self {
            id,
            uid,
            name,
            is_default: is_default != 0,
            is_deleted: is_deleted != 0,
            version,
        }
    }
}

impl From<FriendRow> for FriendData {
    fn from(row: FriendRow) -> Self {
        let (id, uid, to_uid, friend_group_id, is_deleted, version) = row;
        Self {
            id,
            uid,
            to_uid,
            friend_group_id,
            is_deleted: is_deleted != 0,
            version,
        }
    }
}
