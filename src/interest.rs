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

//! The enablement check gating all emission cost.
//!
//! [`Enablement::is_enabled`] answers "is any consumer currently interested in this
//! (level, keywords, channel) triple?" and is called unconditionally on every emission
//! attempt, from any thread, before anything else happens. The contract is therefore
//! strict: a pure, total function over the currently-attached consumers, never blocking,
//! cheap enough to sit inside a hot request loop. The provided [`ConsumerRegistry`] meets it
//! by folding all live subscriptions into an immutable snapshot behind an
//! [`arc_swap::ArcSwap`]; the check is one atomic pointer load plus a few bitwise tests,
//! and subscription changes (rare) pay the rebuild cost instead.

use crate::keyword::{Channel, ChannelSet, KeywordMask, Level};

use arc_swap::ArcSwap;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The query the emission path puts to the consumer side.
///
/// Implementations must be pure functions of attached-consumer state, safe to call from any
/// thread without blocking. The emission path guarantees in return that it will not
/// construct event arguments, serialize payloads, or touch the causal context's write path
/// until this returns `true`.
pub trait Enablement {
    fn is_enabled(&self, level: Level, keywords: KeywordMask, channel: Channel) -> bool;
}

/// Enables nothing. The disabled path in tests and benchmarks.
pub struct AlwaysOff;

impl Enablement for AlwaysOff {
    fn is_enabled(&self, _level: Level, _keywords: KeywordMask, _channel: Channel) -> bool {
        false
    }
}

/// Enables everything. For tests and the helper bins.
pub struct AlwaysOn;

impl Enablement for AlwaysOn {
    fn is_enabled(&self, _level: Level, _keywords: KeywordMask, _channel: Channel) -> bool {
        true
    }
}

/// What one attached consumer declares itself interested in.
///
/// `level` is a threshold (more-severe events pass), `keywords` an intersection test
/// (an event declaring no keywords passes any filter), `channels` exact membership.
#[derive(Copy, Clone, Debug)]
pub struct Subscription {
    pub level: Level,
    pub keywords: KeywordMask,
    pub channels: ChannelSet,
}

impl Subscription {
    fn accepts(&self, level: Level, keywords: KeywordMask, channel: Channel) -> bool {
        level.passes(self.level)
            && (keywords.is_empty() || keywords.intersects(self.keywords))
            && self.channels.contains(channel)
    }
}

/// Handle for removing a subscription later.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct Snapshot {
    subscriptions: Vec<Subscription>,
}

struct RegistryInner {
    snapshot: ArcSwap<Snapshot>,
    // Source of truth for rebuilds; never touched on the read path.
    subscribers: Mutex<Vec<(SubscriberId, Subscription)>>,
    next_id: AtomicU64,
}

/// The provided [`Enablement`] implementation: a registry of consumer subscriptions.
///
/// Cloning yields another handle to the same registry; hand one clone to the provider and
/// keep another wherever consumers attach and detach.
#[derive(Clone)]
pub struct ConsumerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        ConsumerRegistry::new()
    }
}

impl ConsumerRegistry {
    pub fn new() -> ConsumerRegistry {
        ConsumerRegistry {
            inner: Arc::new(RegistryInner {
                snapshot: ArcSwap::from_pointee(Snapshot::default()),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a consumer. Takes effect for emissions that begin after the call returns.
    pub fn subscribe(&self, subscription: Subscription) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut subscribers = self.inner.subscribers.lock().unwrap();
            subscribers.push((id, subscription));
            self.publish(&subscribers);
        }
        id
    }

    /// Detach a consumer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        subscribers.retain(|(sid, _)| *sid != id);
        self.publish(&subscribers);
    }

    fn publish(&self, subscribers: &[(SubscriberId, Subscription)]) {
        let snapshot = Snapshot {
            subscriptions: subscribers.iter().map(|(_, s)| *s).collect(),
        };
        self.inner.snapshot.store(Arc::new(snapshot));
    }
}

impl Enablement for ConsumerRegistry {
    fn is_enabled(&self, level: Level, keywords: KeywordMask, channel: Channel) -> bool {
        self.inner
            .snapshot
            .load()
            .subscriptions
            .iter()
            .any(|s| s.accepts(level, keywords, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::Keyword;

    const A: Keyword = Keyword::from_bit("a", 0);
    const B: Keyword = Keyword::from_bit("b", 1);
    const C: Keyword = Keyword::from_bit("c", 2);

    fn sub(level: Level, keywords: KeywordMask) -> Subscription {
        Subscription {
            level,
            keywords,
            channels: ChannelSet::ALL,
        }
    }

    #[test]
    fn test_no_consumers_means_disabled() {
        let registry = ConsumerRegistry::new();
        assert!(!registry.is_enabled(Level::Critical, KeywordMask::NONE, Channel::Admin));
    }

    #[test]
    fn test_level_is_a_threshold_not_a_match() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(sub(Level::Warning, A.mask()));

        // More severe than the threshold: delivered.
        assert!(registry.is_enabled(Level::Critical, A.mask(), Channel::Operational));
        assert!(registry.is_enabled(Level::Error, A.mask(), Channel::Operational));
        // At the threshold: delivered.
        assert!(registry.is_enabled(Level::Warning, A.mask(), Channel::Operational));
        // Less severe: not delivered.
        assert!(!registry.is_enabled(Level::Informational, A.mask(), Channel::Operational));
        assert!(!registry.is_enabled(Level::Verbose, A.mask(), Channel::Operational));
        // The sentinel passes any threshold.
        assert!(registry.is_enabled(Level::LogAlways, A.mask(), Channel::Operational));
    }

    #[test]
    fn test_keywords_are_an_intersection() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(sub(Level::Verbose, B.mask()));

        // {A, B} delivered to a {B} subscriber...
        assert!(registry.is_enabled(Level::Informational, A | B, Channel::Operational));
        // ...but {A} and {C} alone are not.
        assert!(!registry.is_enabled(Level::Informational, A.mask(), Channel::Operational));
        assert!(!registry.is_enabled(Level::Informational, C.mask(), Channel::Operational));
        // An event declaring no keywords passes any filter.
        assert!(registry.is_enabled(
            Level::Informational,
            KeywordMask::NONE,
            Channel::Operational
        ));
    }

    #[test]
    fn test_channel_membership() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(Subscription {
            level: Level::Verbose,
            keywords: A.mask(),
            channels: ChannelSet::of(&[Channel::Analytic]),
        });

        assert!(registry.is_enabled(Level::Informational, A.mask(), Channel::Analytic));
        assert!(!registry.is_enabled(Level::Informational, A.mask(), Channel::Debug));
        assert!(!registry.is_enabled(Level::Informational, A.mask(), Channel::Admin));
    }

    #[test]
    fn test_unsubscribe_disables() {
        let registry = ConsumerRegistry::new();
        let id = registry.subscribe(sub(Level::Verbose, A.mask()));
        assert!(registry.is_enabled(Level::Verbose, A.mask(), Channel::Admin));
        registry.unsubscribe(id);
        assert!(!registry.is_enabled(Level::Verbose, A.mask(), Channel::Admin));
    }

    #[test]
    fn test_any_of_several_consumers_enables() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(sub(Level::Error, A.mask()));
        registry.subscribe(sub(Level::Verbose, C.mask()));

        assert!(registry.is_enabled(Level::Verbose, C.mask(), Channel::Debug));
        assert!(registry.is_enabled(Level::Error, A.mask(), Channel::Debug));
        assert!(!registry.is_enabled(Level::Verbose, B.mask(), Channel::Debug));
    }
}
