// Copyright (C) 2025 Eventwire contributors
//
// This file is part of eventwire.
//
// eventwire is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// eventwire is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with eventwire.  If not,
// see <http://www.gnu.org/licenses/>.

//! The ambient causal context.
//!
//! Every emitted record is stamped with the 128-bit [`ActivityId`] ambient on the emitting
//! thread, which is what lets a consumer stitch records into causally-linked timelines across
//! threads and process boundaries. The cell is thread-local; it is never shared by reference,
//! only copied out at explicit capture points. The mutation API is deliberately narrow --
//! [`Activity::set`], [`Activity::transfer`] and [`Activity::current`] are the whole of it --
//! so that causal edges can only be created at reviewable call sites.
//!
//! Crossing a worker-pool or continuation boundary is the *caller's* obligation: capture
//! [`Activity::current`] before suspending and [`Activity::set`] it on the resuming thread.
//! The scheduler does not expose enough to make auto-propagation correct, so this crate does
//! not attempt it.

use std::cell::Cell;

use uuid::Uuid;

/// A 128-bit identifier for the operation currently in progress.
///
/// The all-zero value is the reserved "no context" sentinel; see [`ActivityId::NONE`].
/// Rendered in canonical hyphenated form on any human-facing surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActivityId(Uuid);

impl ActivityId {
    /// The reserved "no context" sentinel.
    pub const NONE: ActivityId = ActivityId(Uuid::nil());

    /// Draw a fresh identifier.
    pub fn new() -> ActivityId {
        ActivityId(Uuid::new_v4())
    }

    pub const fn from_u128(value: u128) -> ActivityId {
        ActivityId(Uuid::from_u128(value))
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> ActivityId {
        ActivityId(Uuid::from_bytes(bytes))
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        ActivityId::NONE
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

thread_local! {
    static CURRENT: Cell<ActivityId> = Cell::new(ActivityId::NONE);
}

/// The per-thread ambient activity cell.
///
/// There is one cell per OS thread, starting at [`ActivityId::NONE`]. All three operations
/// are a single access to the thread-local cell; none of them can block, allocate or fail.
pub struct Activity;

impl Activity {
    /// Read-only snapshot of the ambient identifier.
    pub fn current() -> ActivityId {
        CURRENT.with(|cell| cell.get())
    }

    /// Unconditionally overwrite the ambient identifier.
    ///
    /// Used on entering a new top-level logical operation, or to restore an identifier
    /// captured earlier (resuming after a suspend, for instance).
    pub fn set(id: ActivityId) {
        CURRENT.with(|cell| cell.set(id));
    }

    /// Swap in `new_id`, returning the previous ambient value.
    ///
    /// The returned value is the parent link: record it as the related activity of a
    /// Send/Receive-style record and a consumer can stitch the two timelines together.
    pub fn transfer(new_id: ActivityId) -> ActivityId {
        CURRENT.with(|cell| cell.replace(new_id))
    }
}
