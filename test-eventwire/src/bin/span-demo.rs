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

//! Demonstrate causal correlation across a thread boundary: a span is started on one
//! thread, its activity captured and handed to a worker, resumed there, stopped, and the
//! consumer-side assembly stitches the records into a single span.

use eventwire::activity::{Activity, ActivityId};
use eventwire::define_events;
use eventwire::descriptor::{Opcode, Task};
use eventwire::interest::AlwaysOn;
use eventwire::keyword::{Channel, Keyword, Level};
use eventwire::provider::ProviderBuilder;
use eventwire::replay;
use eventwire::transport::CollectorTransport;

use std::sync::Arc;

const LIFECYCLE: Keyword = Keyword::from_bit("lifecycle", 0);

define_events! {
    struct SpanEvents {
        event calculate_started {
            id: 400,
            name: "CalculateStarted",
            level: Level::Informational,
            keywords: LIFECYCLE.mask(),
            channel: Channel::Analytic,
            task: Task(1), opcode: Opcode::Start,
            template: "calculation started",
            fields: {},
        }
        event calculate_suspended {
            id: 401,
            name: "CalculateSuspended",
            level: Level::Informational,
            keywords: LIFECYCLE.mask(),
            channel: Channel::Analytic,
            task: Task(1), opcode: Opcode::Suspend,
            template: "calculation suspended",
            fields: {},
        }
        event calculate_resumed {
            id: 402,
            name: "CalculateResumed",
            level: Level::Informational,
            keywords: LIFECYCLE.mask(),
            channel: Channel::Analytic,
            task: Task(1), opcode: Opcode::Resume,
            template: "calculation resumed",
            fields: {},
        }
        event calculate_stopped {
            id: 403,
            name: "CalculateStopped",
            level: Level::Informational,
            keywords: LIFECYCLE.mask(),
            channel: Channel::Analytic,
            task: Task(1), opcode: Opcode::Stop,
            template: "calculation finished",
            fields: {},
        }
    }
}

pub fn main() {
    let collector = CollectorTransport::new();
    let provider = Arc::new(
        ProviderBuilder::new()
            .name_as_string("span-demo".to_owned())
            .expect("provider name")
            .keyword(LIFECYCLE)
            .expect("keyword registration")
            .events(SpanEvents::<AlwaysOn, CollectorTransport>::schema())
            .expect("schema registration")
            .build(AlwaysOn, collector.clone())
            .expect("provider"),
    );
    let manifest = provider.manifest();
    let events = SpanEvents::attach(provider);

    // A new top-level operation on this thread.
    Activity::set(ActivityId::new());
    events.calculate_started();
    events.calculate_suspended();

    // Capture before crossing the boundary; the worker restores the context by hand.
    // This is the caller's obligation -- nothing propagates automatically.
    let captured = Activity::current();
    let worker = std::thread::spawn(move || {
        Activity::set(captured);
        events.calculate_resumed();
        std::thread::sleep(std::time::Duration::from_millis(10));
        events.calculate_stopped();
    });
    worker.join().expect("the worker finished");

    let records: Vec<_> = collector
        .take()
        .iter()
        .map(|buf| replay::decode(buf).expect("decode a record"))
        .collect();
    println!("{} records emitted across two threads", records.len());
    for record in &records {
        println!("  event {} activity {}", record.event_id, record.activity);
    }

    let spans = replay::assemble_spans(&records, &manifest);
    assert_eq!(spans.len(), 1, "one logical span expected");
    let span = &spans[0];
    println!(
        "assembled one span: task {:?} activity {} duration {}us",
        span.task,
        span.activity,
        span.duration().num_microseconds().unwrap_or(i64::MAX)
    );

    // All four records rendered against the published schema.
    for record in &records {
        if let Some(def) = manifest.events.iter().find(|d| d.id == record.event_id) {
            println!("  {}", def.render(&record.fields));
        }
    }
}
