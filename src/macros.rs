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

//! The schema-driven façade generator.
//!
//! A real instrumented system has hundreds of distinct events, and writing a hand-rolled
//! emission method for each is how per-event code balloons into thousands of mechanically
//! repeated lines. [`define_events!`] collapses that to one declarative schema: each
//! `event` block becomes a registered descriptor plus one typed convenience method whose
//! arguments follow the declared field list. The generated methods defer all field
//! construction behind the enablement check via
//! [`EventProvider::write_with`](crate::provider::EventProvider::write_with), so a
//! disabled event costs a descriptor lookup and a snapshot read, nothing more.
//!
//! ```rust
//! use std::sync::Arc;
//! use eventwire::{define_events, interest::AlwaysOn, transport::CollectorTransport};
//! use eventwire::descriptor::{Opcode, Task};
//! use eventwire::keyword::{Channel, Keyword, Level};
//! use eventwire::provider::ProviderBuilder;
//!
//! const WF_TRACKING: Keyword = Keyword::from_bit("wf_tracking", 3);
//!
//! define_events! {
//!     pub struct WorkflowEvents {
//!         event record_persisted {
//!             id: 100,
//!             name: "RecordPersisted",
//!             level: Level::Informational,
//!             keywords: WF_TRACKING.mask(),
//!             channel: Channel::Analytic,
//!             template: "instance {0} persisted record {1}",
//!             fields: { instance_id: Guid, record_number: Int64 },
//!         }
//!         event run_completed {
//!             id: 101,
//!             name: "RunCompleted",
//!             level: Level::Informational,
//!             keywords: WF_TRACKING.mask(),
//!             channel: Channel::Analytic,
//!             task: Task(1), opcode: Opcode::Stop,
//!             template: "run {0} completed",
//!             fields: { run: Str },
//!         }
//!     }
//! }
//!
//! let provider = Arc::new(
//!     ProviderBuilder::new()
//!         .events(WorkflowEvents::<AlwaysOn, CollectorTransport>::schema())
//!         .unwrap()
//!         .build(AlwaysOn, CollectorTransport::new())
//!         .unwrap(),
//! );
//! let events = WorkflowEvents::attach(provider);
//! events.run_completed("nightly-sync");
//! ```

/// Declare an event schema: registered descriptors plus typed emission methods.
///
/// Each `event` block takes the descriptor's metadata (with `task`/`opcode` optional) and
/// a `fields` list of `name: Type` pairs drawn from [`crate::descriptor::FieldType`]. The
/// generated struct exposes `schema()` (the descriptors, for
/// [`ProviderBuilder::events`](crate::provider::ProviderBuilder::events)), `attach(Arc<EventProvider>)`,
/// and one method per event named after its block, taking `&str` for `Str` fields, `i64`
/// for `Int64`, and so on, in declared order.
#[macro_export]
macro_rules! define_events {
    (
        $(#[$outer:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$ev_meta:meta])*
                event $method:ident {
                    id: $id:expr,
                    name: $ev_name:expr,
                    level: $level:expr,
                    keywords: $keywords:expr,
                    channel: $channel:expr,
                    $(task: $task:expr, opcode: $opcode:expr,)?
                    template: $template:expr,
                    fields: { $($field:ident : $ftype:ident),* $(,)? } $(,)?
                }
            )*
        }
    ) => {
        $(#[$outer])*
        $vis struct $name<E: $crate::interest::Enablement, T: $crate::transport::Transport> {
            provider: ::std::sync::Arc<$crate::provider::EventProvider<E, T>>,
        }

        impl<E: $crate::interest::Enablement, T: $crate::transport::Transport> $name<E, T> {
            /// The descriptors this schema registers, in declaration order.
            $vis fn schema() -> ::std::vec::Vec<$crate::descriptor::EventDescriptor> {
                ::std::vec![
                    $(
                        {
                            const FIELDS: &[(&str, $crate::descriptor::FieldType)] = &[
                                $((stringify!($field), $crate::descriptor::FieldType::$ftype)),*
                            ];
                            $crate::descriptor::EventDescriptor {
                                id: $crate::descriptor::EventId($id),
                                name: $ev_name,
                                level: $level,
                                keywords: $keywords,
                                channel: $channel,
                                task: $crate::__lifecycle_task!($($task)?),
                                opcode: $crate::__lifecycle_opcode!($($opcode)?),
                                template: $template,
                                fields: FIELDS,
                            }
                        }
                    ),*
                ]
            }

            /// Bind the generated methods to a built provider.
            $vis fn attach(
                provider: ::std::sync::Arc<$crate::provider::EventProvider<E, T>>,
            ) -> Self {
                Self { provider }
            }

            $(
                $(#[$ev_meta])*
                $vis fn $method(&self, $($field: $crate::__field_arg!($ftype)),*) {
                    self.provider.write_with(
                        $crate::descriptor::EventId($id),
                        || ::std::vec![$($crate::__field_value!($ftype, $field)),*],
                    );
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __lifecycle_task {
    () => {
        ::std::option::Option::None
    };
    ($task:expr) => {
        ::std::option::Option::Some($task)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __lifecycle_opcode {
    () => {
        ::std::option::Option::None
    };
    ($opcode:expr) => {
        ::std::option::Option::Some($opcode)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_arg {
    (Str) => { &str };
    (Int64) => { i64 };
    (UInt64) => { u64 };
    (Bool) => { bool };
    (Guid) => { $crate::activity::ActivityId };
    (Timestamp) => { $crate::record::Timestamp };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_value {
    (Str, $value:expr) => {
        $crate::record::FieldValue::Str(::std::borrow::ToOwned::to_owned($value))
    };
    (Int64, $value:expr) => {
        $crate::record::FieldValue::Int64($value)
    };
    (UInt64, $value:expr) => {
        $crate::record::FieldValue::UInt64($value)
    };
    (Bool, $value:expr) => {
        $crate::record::FieldValue::Bool($value)
    };
    (Guid, $value:expr) => {
        $crate::record::FieldValue::Guid($value)
    };
    (Timestamp, $value:expr) => {
        $crate::record::FieldValue::Timestamp($value)
    };
}

#[cfg(test)]
mod tests {
    use crate::activity::ActivityId;
    use crate::descriptor::{EventId, Opcode, Task};
    use crate::interest::{AlwaysOff, AlwaysOn, Enablement};
    use crate::keyword::{Channel, Keyword, Level};
    use crate::provider::ProviderBuilder;
    use crate::record::FieldValue;
    use crate::replay;
    use crate::transport::CollectorTransport;

    use std::sync::Arc;

    const QUOTA: Keyword = Keyword::from_bit("quota", 1);

    crate::define_events! {
        pub struct QuotaEvents {
            /// Someone went over their allotment.
            event quota_exceeded {
                id: 200,
                name: "QuotaExceeded",
                level: Level::Warning,
                keywords: QUOTA.mask(),
                channel: Channel::Operational,
                template: "quota for {0} exceeded by {1}, hard limit {2}",
                fields: { principal: Str, overage: Int64, hard_limit: Bool },
            }
            event enforcement_started {
                id: 201,
                name: "EnforcementStarted",
                level: Level::Informational,
                keywords: QUOTA.mask(),
                channel: Channel::Operational,
                task: Task(4), opcode: Opcode::Start,
                template: "enforcement for {0} started",
                fields: { principal: Str },
            }
        }
    }

    fn build<E: Enablement>(
        enablement: E,
    ) -> (QuotaEvents<E, CollectorTransport>, CollectorTransport) {
        let collector = CollectorTransport::new();
        let provider = Arc::new(
            ProviderBuilder::new()
                .events(QuotaEvents::<E, CollectorTransport>::schema())
                .unwrap()
                .build(enablement, collector.clone())
                .unwrap(),
        );
        (QuotaEvents::attach(provider), collector)
    }

    #[test]
    fn test_schema_carries_declarations() {
        let schema = QuotaEvents::<AlwaysOn, CollectorTransport>::schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].id, EventId(200));
        assert_eq!(schema[0].task, None);
        assert_eq!(schema[0].fields[1], ("overage", crate::descriptor::FieldType::Int64));
        assert_eq!(schema[1].task, Some(Task(4)));
        assert_eq!(schema[1].opcode, Some(Opcode::Start));
    }

    #[test]
    fn test_generated_method_emits_fields_in_order() {
        let (events, collector) = build(AlwaysOn);
        events.quota_exceeded("alice", 512, true);

        let sent = collector.take();
        assert_eq!(sent.len(), 1);
        let record = replay::decode(&sent[0]).unwrap();
        assert_eq!(record.event_id, EventId(200));
        assert_eq!(
            record.fields,
            vec![
                FieldValue::Str("alice".to_owned()),
                FieldValue::Int64(512),
                FieldValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_generated_method_is_free_when_disabled() {
        let (events, collector) = build(AlwaysOff);
        events.quota_exceeded("alice", 512, true);
        events.enforcement_started("alice");
        assert!(collector.is_empty());
    }

    #[test]
    fn test_guid_and_timestamp_arguments() {
        crate::define_events! {
            struct InstanceEvents {
                event instance_loaded {
                    id: 210,
                    name: "InstanceLoaded",
                    level: Level::Verbose,
                    keywords: QUOTA.mask(),
                    channel: Channel::Debug,
                    template: "instance {0} loaded, deadline {1}",
                    fields: { instance_id: Guid, deadline: Timestamp },
                }
            }
        }

        let collector = CollectorTransport::new();
        let provider = Arc::new(
            ProviderBuilder::new()
                .events(InstanceEvents::<AlwaysOn, CollectorTransport>::schema())
                .unwrap()
                .build(AlwaysOn, collector.clone())
                .unwrap(),
        );
        let events = InstanceEvents::attach(provider);

        let instance = ActivityId::from_u128(9);
        let deadline = chrono::TimeZone::timestamp_opt(&chrono::Utc, 60, 0).unwrap();
        events.instance_loaded(instance, deadline);

        let sent = collector.take();
        let record = replay::decode(&sent[0]).unwrap();
        assert_eq!(
            record.fields,
            vec![FieldValue::Guid(instance), FieldValue::Timestamp(deadline)]
        );
    }
}
