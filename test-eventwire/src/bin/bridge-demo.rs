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

//! Test forwarding ordinary `tracing` events through the bridge layer.

use eventwire::interest::{ConsumerRegistry, Subscription};
use eventwire::keyword::{Channel, ChannelSet, KeywordMask, Level};
use eventwire::layer::Layer;
use eventwire::provider::ProviderBuilder;
use eventwire::replay;
use eventwire::transport::CollectorTransport;

use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

use std::sync::Arc;

pub fn main() {
    let registry = ConsumerRegistry::new();
    // Subscribe at Warning: the info/debug/trace lines below should not come through.
    registry.subscribe(Subscription {
        level: Level::Warning,
        keywords: KeywordMask::NONE,
        channels: ChannelSet::of(&[Channel::Debug]),
    });

    let collector = CollectorTransport::new();
    let provider = Arc::new(
        ProviderBuilder::new()
            .name_as_string("bridge-demo".to_owned())
            .expect("provider name")
            .with_tracing_bridge(true)
            .build(registry, collector.clone())
            .expect("provider"),
    );

    // Setup the real subscriber...
    let subscriber = Registry::default()
        .with(Layer::<Registry, _, _>::new(provider.clone()).expect("bridge layer"));
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!("Hello, 世界!");
    warn!("Hello, 世界!");
    error!("Hello, 世界!");

    let records = collector.take();
    println!(
        "{} of 5 tracing events passed the Warning threshold",
        records.len()
    );
    let manifest = provider.manifest();
    for buf in &records {
        let record = replay::decode(buf).expect("decode a record");
        let def = manifest
            .events
            .iter()
            .find(|d| d.id == record.event_id)
            .expect("bridge descriptor in the manifest");
        println!("  {}", def.render(&record.fields));
    }
}
