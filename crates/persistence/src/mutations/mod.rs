// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Backend-agnostic mutation modules.
//!
//! ## Module Organization
//!
//! - `seed`: Inserts of users, groups, memberships and friends
//! - `sequences`: Counter increments for the database-backed version counter
//! - `versioned`: Optimistic-lock updates keyed on a row's version
//!
//! The migration's set-based statements live in `migrate::steps`.

pub mod seed;
pub mod sequences;
pub mod versioned;
