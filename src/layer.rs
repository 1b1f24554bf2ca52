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

//! A [`tracing-subscriber`] [`Layer`] that forwards [`tracing`] events into the provider.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! An application instrumented with this crate's typed events usually also carries ordinary
//! `tracing` call sites, its own and its dependencies'. Installing this layer funnels those
//! through the same enablement check, activity stamping and transport as the typed schema,
//! under the reserved bridge descriptor (fields: target, message). The forwarded event's
//! level -- not the bridge descriptor's nominal one -- decides enablement, and the event's
//! fields are only visited once that check passes.
//!
//! The provider's own degraded paths report through `tracing::error!`; a thread-local
//! re-entrancy guard keeps those reports from cycling back through this layer.

use crate::error::{Error, Result};
use crate::interest::Enablement;
use crate::keyword::Level;
use crate::provider::EventProvider;
use crate::transport::Transport;

use backtrace::Backtrace;

use tracing::Event;
use tracing_subscriber::layer::Context;

use std::cell::Cell;
use std::sync::Arc;

/// The default mapping from [`tracing::Level`] to this crate's [`Level`].
pub fn default_level_mapping(level: &tracing::Level) -> Level {
    match level {
        &tracing::Level::TRACE | &tracing::Level::DEBUG => Level::Verbose,
        &tracing::Level::INFO => Level::Informational,
        &tracing::Level::WARN => Level::Warning,
        &tracing::Level::ERROR => Level::Error,
    }
}

struct MessageEventVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageEventVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // Regrettably, we have only a `Debug` implementation available to us; but the
            // tracing macros `info!()`, `event!()` & the like all take care to "pre-format"
            // the `message` field so that `value` actually refers to a
            // `std::fmt::Arguments` instance, which will print to a debug format without
            // enclosing double-quotes.
            self.message = Some(format!("{:?}", value));
        }
    }
}

thread_local! {
    static IN_BRIDGE: Cell<bool> = Cell::new(false);
}

/// Held while an event is being forwarded; keeps the provider's own `tracing` output from
/// re-entering this layer on the same thread.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn try_enter() -> Option<ReentrancyGuard> {
        IN_BRIDGE.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentrancyGuard)
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_BRIDGE.with(|flag| flag.set(false));
    }
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation forwarding [`tracing`]
/// [`Event`]s into an [`EventProvider`].
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer<S, E: Enablement, T: Transport>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    provider: Arc<EventProvider<E, T>>,
    map_level: Box<dyn Fn(&tracing::Level) -> Level + Send + Sync>,
    // I need the Subscriber implementation type as a type parameter to transmit it to the
    // Layer trait. 👇 gets the compiler to shut-up about unused type parameters.
    subscriber_type: std::marker::PhantomData<S>,
}

impl<S, E: Enablement, T: Transport> Layer<S, E, T>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    /// Attach to `provider`, which must have been built with
    /// [`with_tracing_bridge`](crate::provider::ProviderBuilder::with_tracing_bridge).
    pub fn new(provider: Arc<EventProvider<E, T>>) -> Result<Self> {
        if !provider.has_bridge() {
            return Err(Error::MissingBridgeDescriptor {
                back: Backtrace::new(),
            });
        }
        Ok(Layer {
            provider,
            map_level: Box::new(default_level_mapping),
            subscriber_type: std::marker::PhantomData,
        })
    }

    /// Replace the default level mapping.
    pub fn with_level_mapping<F>(mut self, map_level: F) -> Self
    where
        F: Fn(&tracing::Level) -> Level + Send + Sync + 'static,
    {
        self.map_level = Box::new(map_level);
        self
    }
}

impl<S, E, T> tracing_subscriber::layer::Layer<S> for Layer<S, E, T>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    E: Enablement + 'static,
    T: Transport + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(_guard) = ReentrancyGuard::try_enter() else {
            return;
        };
        let meta = event.metadata();
        let level = (self.map_level)(meta.level());
        self.provider.forward(level, meta.target(), || {
            let mut visitor = MessageEventVisitor { message: None };
            event.record(&mut visitor);
            visitor.message
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EventId;
    use crate::interest::{ConsumerRegistry, Subscription};
    use crate::keyword::{Channel, ChannelSet, KeywordMask};
    use crate::provider::{ProviderBuilder, BRIDGE_EVENT_ID};
    use crate::record::FieldValue;
    use crate::replay;
    use crate::transport::CollectorTransport;

    use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
    use tracing_subscriber::registry::Registry;

    fn bridge_provider(
        registry: ConsumerRegistry,
    ) -> (
        Arc<EventProvider<ConsumerRegistry, CollectorTransport>>,
        CollectorTransport,
    ) {
        let collector = CollectorTransport::new();
        let provider = Arc::new(
            ProviderBuilder::new()
                .name_as_string("bridge-test".to_owned())
                .unwrap()
                .with_tracing_bridge(true)
                .build(registry, collector.clone())
                .unwrap(),
        );
        (provider, collector)
    }

    fn debug_subscription() -> Subscription {
        Subscription {
            level: Level::Verbose,
            keywords: KeywordMask::NONE,
            channels: ChannelSet::of(&[Channel::Debug]),
        }
    }

    #[test]
    fn test_new_requires_the_bridge_descriptor() {
        let collector = CollectorTransport::new();
        let provider = Arc::new(
            ProviderBuilder::new()
                .build(ConsumerRegistry::new(), collector)
                .unwrap(),
        );
        assert!(Layer::<Registry, _, _>::new(provider).is_err());
    }

    #[test]
    fn test_forwards_message_and_target() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(debug_subscription());
        let (provider, collector) = bridge_provider(registry);

        let subscriber =
            Registry::default().with(Layer::<Registry, _, _>::new(provider).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "bridge::demo", "Hello, 世界!");
        });

        let sent = collector.take();
        assert_eq!(sent.len(), 1);
        let record = replay::decode(&sent[0]).unwrap();
        assert_eq!(record.event_id, BRIDGE_EVENT_ID);
        assert_eq!(record.channel, Channel::Debug);
        assert_eq!(
            record.fields,
            vec![
                FieldValue::Str("bridge::demo".to_owned()),
                FieldValue::Str("Hello, 世界!".to_owned()),
            ]
        );
    }

    #[test]
    fn test_disabled_bridge_forwards_nothing() {
        // No subscription at all.
        let (provider, collector) = bridge_provider(ConsumerRegistry::new());

        let subscriber =
            Registry::default().with(Layer::<Registry, _, _>::new(provider).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("nobody is listening");
        });
        assert!(collector.is_empty());
    }

    #[test]
    fn test_forwarded_level_decides_enablement() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(Subscription {
            level: Level::Warning,
            keywords: KeywordMask::NONE,
            channels: ChannelSet::of(&[Channel::Debug]),
        });
        let (provider, collector) = bridge_provider(registry);

        let subscriber =
            Registry::default().with(Layer::<Registry, _, _>::new(provider).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("below the threshold");
            tracing::error!("above the threshold");
        });

        let sent = collector.take();
        assert_eq!(sent.len(), 1);
        let record = replay::decode(&sent[0]).unwrap();
        match &record.fields[1] {
            FieldValue::Str(message) => assert_eq!(message, "above the threshold"),
            other => panic!("expected a string, got {:?}", other),
        }
    }

    #[test]
    fn test_eventless_message_degrades_to_placeholder() {
        let registry = ConsumerRegistry::new();
        registry.subscribe(debug_subscription());
        let (provider, collector) = bridge_provider(registry);

        let subscriber =
            Registry::default().with(Layer::<Registry, _, _>::new(provider).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            // Structured fields but no message.
            tracing::info!(answer = 42);
        });

        let sent = collector.take();
        assert_eq!(sent.len(), 1);
        let record = replay::decode(&sent[0]).unwrap();
        assert_eq!(record.fields[1], FieldValue::Str("<no message>".to_owned()));
        assert_eq!(record.event_id, EventId(BRIDGE_EVENT_ID.0));
    }
}
