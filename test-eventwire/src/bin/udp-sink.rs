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

//! Exercise the full pipeline over a real UDP socket: emit on one side, receive, decode
//! and render against the published manifest on the other.

use eventwire::define_events;
use eventwire::interest::{ConsumerRegistry, Subscription};
use eventwire::keyword::{Channel, ChannelSet, Keyword, Level};
use eventwire::provider::ProviderBuilder;
use eventwire::replay;
use eventwire::transport::UdpTransport;

use std::sync::Arc;

const TRANSPORT: Keyword = Keyword::from_bit("transport", 2);

define_events! {
    struct DemoEvents {
        event connection_accepted {
            id: 300,
            name: "ConnectionAccepted",
            level: Level::Informational,
            keywords: TRANSPORT.mask(),
            channel: Channel::Operational,
            template: "accepted connection {0} from {1}",
            fields: { connection: Int64, peer: Str },
        }
    }
}

pub fn main() {
    let listener = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind the sink socket");
    let addr = listener.local_addr().expect("sink socket address");

    let registry = ConsumerRegistry::new();
    registry.subscribe(Subscription {
        level: Level::Verbose,
        keywords: TRANSPORT.mask(),
        channels: ChannelSet::ALL,
    });

    let provider = Arc::new(
        ProviderBuilder::new()
            .name_as_string("udp-sink-demo".to_owned())
            .expect("provider name")
            .keyword(TRANSPORT)
            .expect("keyword registration")
            .events(DemoEvents::<ConsumerRegistry, UdpTransport>::schema())
            .expect("schema registration")
            .build(registry, UdpTransport::new(addr).expect("connect the transport"))
            .expect("provider"),
    );
    let manifest = provider.manifest();
    let events = DemoEvents::attach(provider);

    for connection in 0..5i64 {
        events.connection_accepted(connection, "10.0.0.7:51423");
    }

    let mut buf = [0u8; 64 * 1024];
    for _ in 0..5 {
        let (n, _) = listener.recv_from(&mut buf).expect("receive a record");
        let record = replay::decode(&buf[..n]).expect("decode a record");
        let def = manifest
            .events
            .iter()
            .find(|def| def.id == record.event_id)
            .expect("record id in the manifest");
        println!(
            "{} [{}] {} activity={}",
            record.timestamp,
            def.name,
            def.render(&record.fields),
            record.activity
        );
    }
}
