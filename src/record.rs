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

//! Wire records & marshaling.
//!
//! [`marshal`] turns the typed argument list of an *enabled* event into a [`WireRecord`], the
//! only thing that crosses the boundary to the transport; [`encode`] assembles the record
//! into its transport framing. Both are pure, synchronous transformations that never perform
//! I/O and never fail the record: a field that disagrees with the declared schema degrades to
//! a placeholder, an oversized string is truncated and flagged, and the record is emitted
//! either way. Losing the fact that something happened is worse than losing one field's
//! detail.

use crate::activity::ActivityId;
use crate::descriptor::{EventDescriptor, EventId, FieldType};
use crate::keyword::Channel;

use chrono::prelude::*;

/// The timestamp type carried by records.
pub type Timestamp = DateTime<Utc>;

/// Substituted for a field whose value could not be produced or did not match the schema.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// Appended to a string field cut down to [`MAX_STRING_BYTES`].
pub const TRUNCATION_MARKER: &str = "<truncated>";

/// Per-field ceiling keeping any single record under the transport's record-size limit.
pub const MAX_STRING_BYTES: usize = 32 * 1024;

/// One marshaled field value, in the event's declared order.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    Guid(ActivityId),
    Timestamp(Timestamp),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Str(_) => FieldType::Str,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Guid(_) => FieldType::Guid,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Int64(v) => write!(f, "{}", v),
            FieldValue::UInt64(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Guid(id) => write!(f, "{}", id),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// The marshaled, transport-ready representation of one emitted event.
///
/// Self-describing via `event_id` against the schema the provider publishes once per
/// process; field values appear in the descriptor's declared order.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRecord {
    pub event_id: EventId,
    pub channel: Channel,
    pub timestamp: Timestamp,
    pub activity: ActivityId,
    pub related_activity: Option<ActivityId>,
    pub fields: Vec<FieldValue>,
}

/// Truncate `s` to at most `max` bytes on a character boundary and flag the cut.
fn clamp_string(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s.push_str(TRUNCATION_MARKER);
    s
}

/// Convert an enabled event's typed argument list into its wire representation.
///
/// `values` are taken in the descriptor's declared order. A missing value, or one whose
/// type disagrees with the declaration, becomes a [`UNSERIALIZABLE`] placeholder; surplus
/// values are dropped. With `timestamp` as `None` the record is stamped with the current
/// time (tests pass an explicit instant for determinism, as does replaying).
pub fn marshal(
    descriptor: &EventDescriptor,
    values: Vec<FieldValue>,
    activity: ActivityId,
    related_activity: Option<ActivityId>,
    timestamp: Option<Timestamp>,
) -> WireRecord {
    let mut values = values.into_iter();
    let fields = descriptor
        .fields
        .iter()
        .map(|(_, declared)| match values.next() {
            Some(FieldValue::Str(s)) if *declared == FieldType::Str => {
                FieldValue::Str(clamp_string(s, MAX_STRING_BYTES))
            }
            Some(value) if value.field_type() == *declared => value,
            _ => FieldValue::Str(UNSERIALIZABLE.to_owned()),
        })
        .collect();

    WireRecord {
        event_id: descriptor.id,
        channel: descriptor.channel,
        timestamp: timestamp.unwrap_or_else(Utc::now),
        activity,
        related_activity,
        fields,
    }
}

const TAG_STR: u8 = 0;
const TAG_INT64: u8 = 1;
const TAG_UINT64: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_GUID: u8 = 4;
const TAG_TIMESTAMP: u8 = 5;

pub(crate) fn channel_code(channel: Channel) -> u8 {
    match channel {
        Channel::Admin => 0,
        Channel::Operational => 1,
        Channel::Analytic => 2,
        Channel::Debug => 3,
    }
}

pub(crate) fn channel_from_code(code: u8) -> Option<Channel> {
    match code {
        0 => Some(Channel::Admin),
        1 => Some(Channel::Operational),
        2 => Some(Channel::Analytic),
        3 => Some(Channel::Debug),
        _ => None,
    }
}

/// Assemble a record's transport framing.
///
/// Layout, all integers big-endian: event id (u32), channel (u8), flags (u8, bit 0 =
/// related activity present), timestamp in Unix microseconds (i64), activity id (16
/// bytes), related activity id (16 bytes, when flagged), field count (u16), then each
/// field as a one-byte tag followed by its payload (strings are u32-length-prefixed
/// UTF-8).
pub fn encode(record: &WireRecord) -> Vec<u8> {
    use bytes::BufMut;

    let mut buf: Vec<u8> = Vec::with_capacity(64);
    buf.put_u32(record.event_id.0);
    buf.put_u8(channel_code(record.channel));
    buf.put_u8(u8::from(record.related_activity.is_some()));
    buf.put_i64(record.timestamp.timestamp_micros());
    buf.put_slice(record.activity.as_bytes());
    if let Some(related) = &record.related_activity {
        buf.put_slice(related.as_bytes());
    }
    buf.put_u16(record.fields.len() as u16);
    for field in &record.fields {
        match field {
            FieldValue::Str(s) => {
                buf.put_u8(TAG_STR);
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            FieldValue::Int64(v) => {
                buf.put_u8(TAG_INT64);
                buf.put_i64(*v);
            }
            FieldValue::UInt64(v) => {
                buf.put_u8(TAG_UINT64);
                buf.put_u64(*v);
            }
            FieldValue::Bool(v) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(u8::from(*v));
            }
            FieldValue::Guid(id) => {
                buf.put_u8(TAG_GUID);
                buf.put_slice(id.as_bytes());
            }
            FieldValue::Timestamp(ts) => {
                buf.put_u8(TAG_TIMESTAMP);
                buf.put_i64(ts.timestamp_micros());
            }
        }
    }
    buf
}

pub(crate) const fn tag_of(ty: FieldType) -> u8 {
    match ty {
        FieldType::Str => TAG_STR,
        FieldType::Int64 => TAG_INT64,
        FieldType::UInt64 => TAG_UINT64,
        FieldType::Bool => TAG_BOOL,
        FieldType::Guid => TAG_GUID,
        FieldType::Timestamp => TAG_TIMESTAMP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::{Keyword, KeywordMask, Level};

    fn descriptor() -> EventDescriptor {
        EventDescriptor {
            id: EventId(100),
            name: "RecordPersisted",
            level: Level::Informational,
            keywords: Keyword::from_bit("wf_tracking", 3).mask(),
            channel: Channel::Analytic,
            task: None,
            opcode: None,
            template: "instance {0} persisted record {1}",
            fields: &[
                ("instance_id", FieldType::Guid),
                ("record_number", FieldType::Int64),
            ],
        }
    }

    #[test]
    fn test_marshal_preserves_order() {
        let instance = ActivityId::from_u128(1);
        let record = marshal(
            &descriptor(),
            vec![FieldValue::Guid(instance), FieldValue::Int64(42)],
            ActivityId::NONE,
            None,
            Some(Utc.timestamp_opt(0, 0).unwrap()),
        );
        assert_eq!(record.event_id, EventId(100));
        assert_eq!(record.channel, Channel::Analytic);
        assert_eq!(
            record.fields,
            vec![FieldValue::Guid(instance), FieldValue::Int64(42)]
        );
    }

    #[test]
    fn test_marshal_substitutes_mismatched_fields() {
        let record = marshal(
            &descriptor(),
            // Declared Guid, supplied Bool; declared Int64, supplied nothing.
            vec![FieldValue::Bool(true)],
            ActivityId::NONE,
            None,
            None,
        );
        assert_eq!(record.fields.len(), 2);
        assert_eq!(
            record.fields[0],
            FieldValue::Str(UNSERIALIZABLE.to_owned())
        );
        assert_eq!(
            record.fields[1],
            FieldValue::Str(UNSERIALIZABLE.to_owned())
        );
    }

    #[test]
    fn test_oversized_string_truncated_not_dropped() {
        let mut d = descriptor();
        d.fields = &[("payload", FieldType::Str), ("record_number", FieldType::Int64)];
        let record = marshal(
            &d,
            vec![
                FieldValue::Str("x".repeat(MAX_STRING_BYTES + 1)),
                FieldValue::Int64(1),
            ],
            ActivityId::NONE,
            None,
            None,
        );
        match &record.fields[0] {
            FieldValue::Str(s) => {
                assert!(s.ends_with(TRUNCATION_MARKER));
                assert!(s.len() <= MAX_STRING_BYTES + TRUNCATION_MARKER.len());
            }
            other => panic!("expected a string, got {:?}", other),
        }
    }

    #[test]
    fn test_clamp_respects_char_boundaries() {
        // '世' is three bytes; a cut mid-character must back up.
        let s = "世".repeat(4);
        let clamped = clamp_string(s, 7);
        assert_eq!(clamped, format!("{}{}", "世".repeat(2), TRUNCATION_MARKER));
    }

    #[test]
    fn test_encode_layout() {
        let record = WireRecord {
            event_id: EventId(100),
            channel: Channel::Analytic,
            timestamp: Utc.timestamp_opt(1, 500).unwrap(),
            activity: ActivityId::from_u128(1),
            related_activity: None,
            fields: vec![FieldValue::Int64(42)],
        };
        let buf = encode(&record);
        // u32 id + u8 channel + u8 flags + i64 ts + 16-byte activity + u16 count
        // + (u8 tag + i64 value)
        assert_eq!(buf.len(), 4 + 1 + 1 + 8 + 16 + 2 + 1 + 8);
        assert_eq!(&buf[0..4], &100u32.to_be_bytes());
        assert_eq!(buf[4], channel_code(Channel::Analytic));
        assert_eq!(buf[5], 0);
        assert_eq!(&buf[6..14], &1_000_000i64.to_be_bytes());
        assert_eq!(buf[29], 1); // low byte of the activity id
        assert_eq!(&buf[30..32], &1u16.to_be_bytes());
    }

    #[test]
    fn test_encode_related_activity_flag() {
        let record = WireRecord {
            event_id: EventId(7),
            channel: Channel::Admin,
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            activity: ActivityId::from_u128(2),
            related_activity: Some(ActivityId::from_u128(1)),
            fields: vec![],
        };
        let buf = encode(&record);
        assert_eq!(buf[5], 1);
        assert_eq!(buf.len(), 4 + 1 + 1 + 8 + 16 + 16 + 2);
    }
}
