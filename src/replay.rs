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

//! Consumer-side record decoding & span assembly.
//!
//! The emission side is deliberately stateless: it never tracks "open spans", it just
//! stamps records. Reconstructing timelines is a consumer concern, and this module is that
//! consumer's toolkit: [`decode`] reverses [`crate::record::encode`], and
//! [`assemble_spans`] pairs `Start`/`Stop` records sharing a task and an activity id into
//! spans. It lives in this crate so the tests and the demo bins can verify the pipeline end
//! to end; nothing here runs on the emission path.

use crate::activity::ActivityId;
use crate::descriptor::{EventId, FieldType, Opcode, Task};
use crate::provider::Manifest;
use crate::record::{channel_from_code, tag_of, FieldValue, Timestamp, WireRecord};

use backtrace::Backtrace;

use chrono::prelude::*;

use std::collections::HashMap;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// module error type
#[non_exhaustive]
pub enum Error {
    /// The buffer ended before the record did
    Truncated { back: Backtrace },
    /// An unknown channel code
    BadChannel { code: u8, back: Backtrace },
    /// An unknown field tag
    BadTag { tag: u8, back: Backtrace },
    /// A timestamp outside the representable range
    BadTimestamp { micros: i64, back: Backtrace },
    /// A string field that is not UTF-8
    BadUtf8 { back: Backtrace },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Truncated { .. } => write!(f, "Record buffer ended mid-record"),
            Error::BadChannel { code, .. } => write!(f, "Unknown channel code {}", code),
            Error::BadTag { tag, .. } => write!(f, "Unknown field tag {}", tag),
            Error::BadTimestamp { micros, .. } => {
                write!(f, "Timestamp {}us is out of range", micros)
            }
            Error::BadUtf8 { .. } => write!(f, "String field is not valid UTF-8"),
            _ => write!(f, "record decoding error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Truncated { back } => write!(f, "{}\n{:#?}", self, back),
            Error::BadChannel { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadTag { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadTimestamp { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadUtf8 { back, .. } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = StdResult<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         record decoding                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A bounds-checked cursor over a record buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(Error::Truncated {
                back: Backtrace::new(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn activity(&mut self) -> Result<ActivityId> {
        Ok(ActivityId::from_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn timestamp(&mut self) -> Result<Timestamp> {
        let micros = self.i64()?;
        Utc.timestamp_opt(
            micros.div_euclid(1_000_000),
            (micros.rem_euclid(1_000_000) * 1_000) as u32,
        )
        .single()
        .ok_or(Error::BadTimestamp {
            micros,
            back: Backtrace::new(),
        })
    }
}

/// Reverse [`crate::record::encode`].
pub fn decode(buf: &[u8]) -> Result<WireRecord> {
    let mut reader = Reader { buf };

    let event_id = EventId(reader.u32()?);
    let channel_code = reader.u8()?;
    let channel = channel_from_code(channel_code).ok_or(Error::BadChannel {
        code: channel_code,
        back: Backtrace::new(),
    })?;
    let flags = reader.u8()?;
    let timestamp = reader.timestamp()?;
    let activity = reader.activity()?;
    let related_activity = if flags & 1 != 0 {
        Some(reader.activity()?)
    } else {
        None
    };

    let count = reader.u16()? as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = reader.u8()?;
        fields.push(match tag {
            t if t == tag_of(FieldType::Str) => {
                let len = reader.u32()? as usize;
                let bytes = reader.take(len)?;
                FieldValue::Str(
                    std::str::from_utf8(bytes)
                        .map_err(|_| Error::BadUtf8 {
                            back: Backtrace::new(),
                        })?
                        .to_owned(),
                )
            }
            t if t == tag_of(FieldType::Int64) => FieldValue::Int64(reader.i64()?),
            t if t == tag_of(FieldType::UInt64) => {
                FieldValue::UInt64(reader.u64()?)
            }
            t if t == tag_of(FieldType::Bool) => {
                FieldValue::Bool(reader.u8()? != 0)
            }
            t if t == tag_of(FieldType::Guid) => {
                FieldValue::Guid(reader.activity()?)
            }
            t if t == tag_of(FieldType::Timestamp) => {
                FieldValue::Timestamp(reader.timestamp()?)
            }
            tag => {
                return Err(Error::BadTag {
                    tag,
                    back: Backtrace::new(),
                })
            }
        });
    }

    Ok(WireRecord {
        event_id,
        channel,
        timestamp,
        activity,
        related_activity,
        fields,
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         span assembly                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One reconstructed logical operation: a `Start` record paired with its `Stop`.
#[derive(Clone, Debug, PartialEq)]
pub struct Span {
    pub task: Task,
    pub activity: ActivityId,
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl Span {
    pub fn duration(&self) -> chrono::Duration {
        self.stop - self.start
    }
}

/// Pair lifecycle-tagged records into spans.
///
/// A span is bound by a `Start` and a `Stop` record sharing a task and an activity id;
/// the opcode and task come from the published `manifest`, not the records, which is what
/// makes records self-describing. Records without a lifecycle tag, and `Start` records
/// with no matching `Stop` in `records`, contribute nothing.
pub fn assemble_spans(records: &[WireRecord], manifest: &Manifest) -> Vec<Span> {
    let defs: HashMap<u32, (Option<Task>, Option<Opcode>)> = manifest
        .events
        .iter()
        .map(|def| (def.id.0, (def.task, def.opcode)))
        .collect();

    let mut open: HashMap<(Task, ActivityId), Timestamp> = HashMap::new();
    let mut spans = Vec::new();
    for record in records {
        let Some(&(Some(task), Some(opcode))) = defs.get(&record.event_id.0) else {
            continue;
        };
        match opcode {
            Opcode::Start => {
                open.insert((task, record.activity), record.timestamp);
            }
            Opcode::Stop => {
                if let Some(start) = open.remove(&(task, record.activity)) {
                    spans.push(Span {
                        task,
                        activity: record.activity,
                        start,
                        stop: record.timestamp,
                    });
                }
            }
            // Suspend/Resume segment a span without bounding it; Send/Receive and Info
            // records carry no lifecycle edges of their own.
            _ => {}
        }
    }
    spans
}
