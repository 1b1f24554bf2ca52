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

//! # General eventwire Documentation
//!
//! ## Introduction
//!
//! General (i.e. not documenting a particular struct or method) documentation goes here.
//!
//! ## From a typed event to a wire record
//!
//! An enabled emission passes through three steps:
//!
//! 1. the enablement check: [`Enablement::is_enabled`] is asked whether any attached
//!    consumer's subscription matches the descriptor's (level, keywords, channel) triple
//!
//! 2. marshaling: [`marshal`] converts the typed argument list into a [`WireRecord`],
//!    stamping the ambient [`ActivityId`] and the declared field order
//!
//! 3. transport: [`encode`] frames the record and a [`Transport`] implementation carries
//!    the bytes away
//!
//! [`Enablement::is_enabled`]: crate::interest::Enablement::is_enabled
//! [`marshal`]: crate::record::marshal
//! [`WireRecord`]: crate::record::WireRecord
//! [`ActivityId`]: crate::activity::ActivityId
//! [`encode`]: crate::record::encode
//! [`Transport`]: crate::transport::Transport
//!
//! The order is load-bearing. Step 1 runs unconditionally on every attempt and must stay
//! at a snapshot-read's cost, because instrumented code calls it from hot loops; steps 2
//! and 3 run only after a "yes". Nothing in the sequence blocks, spawns, awaits or
//! performs I/O on the calling thread -- a transport that needs any of those buffers
//! behind its [`send`](crate::transport::Transport::send) and does the work elsewhere.
//!
//! ## Why the schema is static
//!
//! Descriptors are registered once, at startup, into a table that is then sealed. That
//! write-once discipline is what lets the emission path read the table with no locking,
//! and it is also what makes the published [`Manifest`] trustworthy: the schema a consumer
//! downloads at attach time is the schema for the life of the process. Registration
//! failures (duplicate id, template/field disagreement, keyword bit collisions) are
//! schema *defects*, so they surface as startup errors rather than runtime conditions.
//!
//! [`Manifest`]: crate::provider::Manifest
//!
//! ## How causal correlation works
//!
//! Each thread carries one ambient [`ActivityId`] cell (see [`Activity`]). Records are
//! stamped with it implicitly. Two mutation protocols exist:
//!
//! [`Activity`]: crate::activity::Activity
//!
//! - *set*: overwrite, used on entering a new top-level operation or when restoring an
//!   identifier captured before a suspension;
//! - *transfer*: exchange, returning the previous value, used at Send/Receive-style
//!   boundaries so the parent identifier can ride along as the record's related activity.
//!
//! The emission side never tracks open spans. A consumer pairs `Start` and `Stop` records
//! sharing a task and an activity id -- [`assemble_spans`] is a reference implementation
//! -- which keeps the emitting side stateless and cheap, and means a missing `Stop`
//! degrades to an unpaired record rather than a leak.
//!
//! [`assemble_spans`]: crate::replay::assemble_spans
//!
//! ## How this plugs into the tracing framework
//!
//! [`layer::Layer`] is a [`tracing-subscriber`] layer parameterized by the provider's
//! enablement and transport implementations:
//!
//! [`layer::Layer`]: crate::layer::Layer
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//!
//! ```ignore
//! pub struct Layer<S, E: Enablement, T: Transport> where
//!    S: Subscriber + for<'a> LookupSpan<'a>,
//! ```
//!
//! Installed in a subscriber stack, it forwards each `tracing` event -- mapped onto this
//! crate's levels -- through the same enablement check and transport as the typed schema,
//! under a reserved bridge descriptor.
