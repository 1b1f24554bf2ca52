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

//! Structured, schema-driven diagnostic event emission with causal correlation.
//!
//! # Introduction
//!
//! Many independent subsystems of a long-running program want to emit richly-typed,
//! categorized diagnostic records -- and almost all of the time, nobody is listening. This
//! crate is built around that asymmetry. Every event type is described once, at startup, by
//! an immutable [`EventDescriptor`]: numeric identity, severity [`Level`], orthogonal
//! [`Keyword`] categories, an audience [`Channel`], an optional lifecycle tag and a
//! positional message template. Emitting is then a single question -- *is any consumer
//! currently interested?* -- answered in O(1) by the [`Enablement`] check, and only a "yes"
//! pays for anything else: argument construction, marshaling, the transport hand-off.
//!
//! [`EventDescriptor`]: crate::descriptor::EventDescriptor
//! [`Level`]: crate::keyword::Level
//! [`Keyword`]: crate::keyword::Keyword
//! [`Channel`]: crate::keyword::Channel
//! [`Enablement`]: crate::interest::Enablement
//!
//! When someone *is* listening, records carry enough to be reassembled into causally-linked
//! timelines: each is stamped with the 128-bit [`ActivityId`] ambient on the emitting
//! thread (see [`Activity`]), and boundary-crossing records link the previous identifier as
//! a parent. Records are self-describing against a schema [`Manifest`] published once per
//! process, so downstream tooling never needs the emitting binary's source.
//!
//! [`ActivityId`]: crate::activity::ActivityId
//! [`Activity`]: crate::activity::Activity
//! [`Manifest`]: crate::provider::Manifest
//!
//! Emission is synchronous, lock-free on the hot path, and infallible from the caller's
//! point of view: a failure downstream degrades to "emit less" or "emit nothing", never to
//! an error -- let alone a panic -- inside the instrumented code.
//!
//! # Usage
//!
//! Declare a schema, build an [`EventProvider`], subscribe a consumer, emit:
//!
//! [`EventProvider`]: crate::provider::EventProvider
//!
//! ```rust
//! use eventwire::descriptor::{EventDescriptor, EventId, FieldType};
//! use eventwire::interest::{ConsumerRegistry, Subscription};
//! use eventwire::keyword::{Channel, ChannelSet, Keyword, Level};
//! use eventwire::provider::ProviderBuilder;
//! use eventwire::record::FieldValue;
//! use eventwire::transport::CollectorTransport;
//!
//! const WF_TRACKING: Keyword = Keyword::from_bit("wf_tracking", 3);
//!
//! let registry = ConsumerRegistry::new();
//! let collector = CollectorTransport::new();
//! let provider = ProviderBuilder::new()
//!     .name_as_string("workflow-host".to_owned()).unwrap()
//!     .keyword(WF_TRACKING).unwrap()
//!     .event(EventDescriptor {
//!         id: EventId(100),
//!         name: "RecordPersisted",
//!         level: Level::Informational,
//!         keywords: WF_TRACKING.mask(),
//!         channel: Channel::Analytic,
//!         task: None,
//!         opcode: None,
//!         template: "instance {0} persisted record {1}",
//!         fields: &[("instance_id", FieldType::Guid), ("record_number", FieldType::Int64)],
//!     }).unwrap()
//!     .build(registry.clone(), collector.clone()).unwrap();
//!
//! // Nobody listening: this is (almost) free, and sends nothing.
//! provider.write(EventId(100), vec![]);
//! assert!(collector.is_empty());
//!
//! registry.subscribe(Subscription {
//!     level: Level::Verbose,
//!     keywords: WF_TRACKING.mask(),
//!     channels: ChannelSet::ALL,
//! });
//! provider.write(EventId(100), vec![
//!     FieldValue::Guid(eventwire::activity::ActivityId::from_u128(1)),
//!     FieldValue::Int64(42),
//! ]);
//! assert_eq!(collector.len(), 1);
//! ```
//!
//! When a field is expensive to produce -- serializing an object graph, rendering a full
//! error chain -- pass a closure to
//! [`write_with`](crate::provider::EventProvider::write_with) (or use the methods
//! [`define_events!`] generates, which do so for you); the closure runs only after the
//! enablement check passes. Computing first and checking second defeats the entire cost
//! model.
//!
//! Schemas of realistic size are better declared than hand-written; see [`define_events!`].
//! For forwarding ordinary [`tracing`] events through the same pipeline, see
//! [`layer::Layer`]. For the consumer side -- decoding records and pairing
//! `Start`/`Stop` lifecycle records into spans -- see [`replay`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! Longer-form design notes live in [`_docs`].

pub mod _docs;
pub mod activity;
pub mod descriptor;
pub mod error;
pub mod interest;
pub mod keyword;
pub mod layer;
pub mod macros;
pub mod provider;
pub mod record;
pub mod replay;
pub mod transport;
