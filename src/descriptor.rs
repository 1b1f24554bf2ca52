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

//! Event descriptors & the descriptor table.
//!
//! An [`EventDescriptor`] is the immutable metadata for one distinct diagnostic event:
//! numeric identity, name, severity, keyword mask, channel, optional lifecycle tag and the
//! positional-argument message template. Descriptors are registered once during startup into
//! a [`DescriptorTable`], which is then [sealed](DescriptorTable::seal) into a read-only
//! [`SealedTable`]; after that point lookups take no lock, which is what keeps the emission
//! path cheap. Registration failures indicate a programming defect in the schema and are
//! surfaced as errors the host should treat as fatal at startup.
//!
//! The table's contents are exportable once per process as a schema document (see
//! [`SealedTable::schema`] and [`crate::provider::Manifest`]) so that a consumer never needs
//! the emitting binary's source to interpret a record.

use crate::keyword::{Channel, KeywordMask, Level};
use crate::record::FieldValue;

use backtrace::Backtrace;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// module error type
#[non_exhaustive]
pub enum Error {
    /// Two descriptors registered under the same id
    DuplicateId { id: EventId, back: Backtrace },
    /// The template's placeholders disagree with the declared fields
    TemplateMismatch {
        id: EventId,
        placeholders: usize,
        fields: usize,
        back: Backtrace,
    },
    /// A placeholder references a field index that was never declared
    PlaceholderOutOfRange {
        id: EventId,
        index: usize,
        fields: usize,
        back: Backtrace,
    },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::DuplicateId { id, .. } => {
                write!(f, "Event id {} registered twice", id)
            }
            Error::TemplateMismatch {
                id,
                placeholders,
                fields,
                ..
            } => write!(
                f,
                "Event {} declares {} fields but its template references {}",
                id, fields, placeholders
            ),
            Error::PlaceholderOutOfRange {
                id, index, fields, ..
            } => write!(
                f,
                "Event {} template references {{{}}} but only {} fields are declared",
                id, index, fields
            ),
            _ => write!(f, "descriptor registration error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::DuplicateId { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::TemplateMismatch { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::PlaceholderOutOfRange { back, .. } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = StdResult<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      descriptor metadata                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Process-unique, version-stable numeric identity of one event type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub u32);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The semantic wire type of one declared field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Str,
    Int64,
    UInt64,
    Bool,
    Guid,
    Timestamp,
}

/// Identifies a logical multi-record operation that several records belong to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task(pub u16);

/// Where in a logical operation's lifecycle a record falls.
///
/// `Start` and `Stop` records sharing a [`Task`] and an activity id bound one span;
/// `Suspend`/`Resume` mark it paused and continued, possibly on a different thread, which is
/// why re-association goes through the causal context rather than the call stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Info,
    Start,
    Stop,
    Suspend,
    Resume,
    Send,
    Receive,
}

/// Immutable metadata describing one event type.
///
/// Created once at process start, never mutated, never destroyed until process exit. The
/// `fields` slice carries `(name, type)` pairs in declaration order; emitted records carry
/// values in the same order, which together with the published schema makes them
/// self-describing.
#[derive(Clone, Debug)]
pub struct EventDescriptor {
    pub id: EventId,
    pub name: &'static str,
    pub level: Level,
    pub keywords: KeywordMask,
    pub channel: Channel,
    pub task: Option<Task>,
    pub opcode: Option<Opcode>,
    /// Message template with ordinal placeholders: `"quota {0} exceeded by {1}"`.
    pub template: &'static str,
    pub fields: &'static [(&'static str, FieldType)],
}

impl EventDescriptor {
    /// Render the template against marshaled values, for human-facing surfaces only.
    ///
    /// Display formatting never runs on the emission path; a consumer renders from the
    /// published schema after the fact. Placeholders with no corresponding value print
    /// as-is.
    pub fn render(&self, values: &[FieldValue]) -> String {
        render_template(self.template, values)
    }
}

fn render_template(template: &str, values: &[FieldValue]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        if !digits.is_empty() && chars.peek() == Some(&'}') {
            chars.next();
            let index = digits.parse::<usize>().unwrap_or(usize::MAX);
            match values.get(index) {
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    out.push('{');
                    out.push_str(&digits);
                    out.push('}');
                }
            }
        } else {
            // Not a placeholder after all; emit what we consumed literally.
            out.push('{');
            out.push_str(&digits);
        }
    }
    out
}

/// Collect the distinct placeholder indices referenced by `template`.
fn placeholder_indices(template: &str) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        if !digits.is_empty() && chars.peek() == Some(&'}') {
            chars.next();
            // An absurdly large ordinal saturates; registration will reject it as
            // out of range.
            let index = digits.parse::<usize>().unwrap_or(usize::MAX);
            if !indices.contains(&index) {
                indices.push(index);
            }
        }
    }
    indices
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      the descriptor table                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The mutable, startup-time face of the table. Purely additive; consumed by
/// [`DescriptorTable::seal`].
#[derive(Default)]
pub struct DescriptorTable {
    events: HashMap<u32, EventDescriptor>,
}

impl DescriptorTable {
    pub fn new() -> DescriptorTable {
        DescriptorTable::default()
    }

    /// Register one descriptor.
    ///
    /// Fails on a duplicate id, or if the template's placeholder set disagrees with the
    /// declared field list (every field referenced exactly once, every reference in range).
    pub fn register(&mut self, descriptor: EventDescriptor) -> Result<EventId> {
        let id = descriptor.id;
        if self.events.contains_key(&id.0) {
            return Err(Error::DuplicateId {
                id,
                back: Backtrace::new(),
            });
        }
        let indices = placeholder_indices(descriptor.template);
        if let Some(&index) = indices.iter().find(|&&i| i >= descriptor.fields.len()) {
            return Err(Error::PlaceholderOutOfRange {
                id,
                index,
                fields: descriptor.fields.len(),
                back: Backtrace::new(),
            });
        }
        if indices.len() != descriptor.fields.len() {
            return Err(Error::TemplateMismatch {
                id,
                placeholders: indices.len(),
                fields: descriptor.fields.len(),
                back: Backtrace::new(),
            });
        }
        self.events.insert(id.0, descriptor);
        Ok(id)
    }

    /// Freeze the table. From here on it is read-only and shareable without locks.
    pub fn seal(self) -> SealedTable {
        SealedTable {
            events: self.events,
        }
    }
}

/// The read-only face of the table handed to the emission path.
pub struct SealedTable {
    events: HashMap<u32, EventDescriptor>,
}

impl SealedTable {
    /// O(1); never fails for an id obtained from [`DescriptorTable::register`].
    pub fn lookup(&self, id: EventId) -> Option<&EventDescriptor> {
        self.events.get(&id.0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Export the schema, sorted by id, for publication.
    pub fn schema(&self) -> Vec<EventDef> {
        let mut defs: Vec<EventDef> = self.events.values().map(EventDef::from).collect();
        defs.sort_by_key(|d| d.id.0);
        defs
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      published schema types                                     //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One field of a published event definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

/// One event of the published schema: everything a consumer needs to interpret a record
/// carrying this event's id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDef {
    pub id: EventId,
    pub name: String,
    pub level: Level,
    pub keywords: KeywordMask,
    pub channel: Channel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcode: Option<Opcode>,
    pub template: String,
    pub fields: Vec<FieldDef>,
}

impl EventDef {
    /// Consumer-side rendering: same semantics as [`EventDescriptor::render`], against
    /// the published schema rather than the in-process descriptor.
    pub fn render(&self, values: &[FieldValue]) -> String {
        render_template(&self.template, values)
    }
}

impl From<&EventDescriptor> for EventDef {
    fn from(d: &EventDescriptor) -> EventDef {
        EventDef {
            id: d.id,
            name: d.name.to_owned(),
            level: d.level,
            keywords: d.keywords,
            channel: d.channel,
            task: d.task,
            opcode: d.opcode,
            template: d.template.to_owned(),
            fields: d
                .fields
                .iter()
                .map(|(name, ty)| FieldDef {
                    name: (*name).to_owned(),
                    ty: *ty,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::Keyword;

    fn descriptor(id: u32, template: &'static str) -> EventDescriptor {
        EventDescriptor {
            id: EventId(id),
            name: "QuotaExceeded",
            level: Level::Warning,
            keywords: Keyword::from_bit("quota", 1).mask(),
            channel: Channel::Operational,
            task: None,
            opcode: None,
            template,
            fields: &[("principal", FieldType::Str), ("overage", FieldType::Int64)],
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut table = DescriptorTable::new();
        let id = table
            .register(descriptor(7, "quota for {0} exceeded by {1}"))
            .unwrap();
        let table = table.seal();
        let d = table.lookup(id).unwrap();
        assert_eq!(d.name, "QuotaExceeded");
        assert_eq!(d.fields.len(), 2);
        assert!(table.lookup(EventId(8)).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = DescriptorTable::new();
        table
            .register(descriptor(7, "quota for {0} exceeded by {1}"))
            .unwrap();
        // Same id, different shape: a schema defect, rejected at startup.
        let mut again = descriptor(7, "{0} and {1}");
        again.fields = &[("a", FieldType::Guid), ("b", FieldType::UInt64)];
        assert!(matches!(
            table.register(again),
            Err(Error::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_disjoint_ids_never_collide() {
        let mut table = DescriptorTable::new();
        for id in 0..64u32 {
            let mut d = descriptor(id, "quota for {0} exceeded by {1}");
            d.id = EventId(id);
            table.register(d).unwrap();
        }
        let table = table.seal();
        assert_eq!(table.len(), 64);
        for id in 0..64u32 {
            assert_eq!(table.lookup(EventId(id)).unwrap().id, EventId(id));
        }
    }

    #[test]
    fn test_template_arity_checked() {
        let mut table = DescriptorTable::new();
        assert!(matches!(
            table.register(descriptor(1, "quota exceeded by {1}")),
            Err(Error::TemplateMismatch { .. })
        ));
        assert!(matches!(
            table.register(descriptor(2, "quota for {0} exceeded by {2}")),
            Err(Error::PlaceholderOutOfRange { .. })
        ));
        // Repeated references to one field count once.
        assert!(table
            .register(descriptor(3, "{0} ({0}) exceeded by {1}"))
            .is_ok());
    }

    #[test]
    fn test_placeholder_scan() {
        assert_eq!(placeholder_indices("no holes"), Vec::<usize>::new());
        assert_eq!(placeholder_indices("{0} then {1}"), vec![0, 1]);
        assert_eq!(placeholder_indices("{1} before {0}"), vec![1, 0]);
        // Unterminated or non-numeric braces are literal text.
        assert_eq!(placeholder_indices("set {name} to {0"), Vec::<usize>::new());
    }

    #[test]
    fn test_render() {
        let d = descriptor(7, "quota for {0} exceeded by {1}");
        let rendered = d.render(&[
            FieldValue::Str("alice".to_owned()),
            FieldValue::Int64(42),
        ]);
        assert_eq!(rendered, "quota for alice exceeded by 42");
    }

    #[test]
    fn test_schema_export() {
        let mut table = DescriptorTable::new();
        table
            .register(descriptor(7, "quota for {0} exceeded by {1}"))
            .unwrap();
        let table = table.seal();
        let schema = table.schema();
        assert_eq!(schema.len(), 1);

        let json = serde_json::to_string(&schema).unwrap();
        let parsed: Vec<EventDef> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, schema);
        assert_eq!(parsed[0].fields[0].name, "principal");
        assert_eq!(parsed[0].fields[0].ty, FieldType::Str);
    }
}
