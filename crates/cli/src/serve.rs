use std::sync::Arc;

use {
    rift::RelayEngine,
    rift_channels::{DestinationId, EventBus, InMemoryRiftStore, OutboundRouter},
    rift_config::{RiftConfig, StaticRift},
    rift_irc::{BridgeTimeouts, IrcBridge, IrcOutbound},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::detached::DetachedPlatform;

/// Parse the destinations of one configured web. Unparseable entries are
/// returned separately so the caller can report them.
pub(crate) fn parse_web(rift: &StaticRift) -> (Vec<DestinationId>, Vec<String>) {
    let mut destinations: Vec<DestinationId> = Vec::new();
    let mut invalid = Vec::new();
    for raw in &rift.destinations {
        match raw.parse::<DestinationId>() {
            Ok(d) if !destinations.contains(&d) => destinations.push(d),
            Ok(_) => {},
            Err(_) => invalid.push(raw.clone()),
        }
    }
    (destinations, invalid)
}

/// Connect and join every IRC destination of `destinations`, keeping the
/// ones that became reachable.
async fn prepare(bridge: &IrcBridge, destinations: Vec<DestinationId>) -> Vec<DestinationId> {
    let mut ready = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let result = match destination.as_irc() {
            Some(addr) if addr.is_channel() => {
                bridge.ensure_joined(addr.domain(), addr.target()).await
            },
            Some(addr) => bridge.ensure_connected(addr.domain()).await.map(|_| ()),
            None => Ok(()),
        };
        match result {
            Ok(()) => ready.push(destination),
            Err(e) => warn!(destination = %destination, error = %e, "static rift destination unavailable"),
        }
    }
    ready
}

async fn open_static_rifts(engine: &RelayEngine, bridge: &IrcBridge, rifts: &[StaticRift]) {
    for (i, rift) in rifts.iter().enumerate() {
        let name = rift.name.clone().unwrap_or_else(|| format!("rift #{i}"));
        let (destinations, invalid) = parse_web(rift);
        for raw in invalid {
            warn!(rift = %name, destination = %raw, "ignoring invalid destination");
        }
        let ready = prepare(bridge, destinations).await;
        if ready.len() < 2 {
            warn!(rift = %name, reachable = ready.len(), "static rift needs two reachable destinations");
            continue;
        }
        engine.link_all(&ready);
        info!(rift = %name, destinations = ready.len(), "static rift opened");
    }
}

/// Run the relay until ctrl-c.
pub async fn serve(config: RiftConfig) -> anyhow::Result<()> {
    let bus = EventBus::default();
    // subscribed before any connection exists so no early message is missed
    let events = bus.subscribe();

    let bridge = Arc::new(IrcBridge::new(
        config.irc.clone(),
        BridgeTimeouts::from(&config.timeouts),
        bus.clone(),
    ));
    let router = OutboundRouter::new().with(Arc::new(IrcOutbound::new(Arc::clone(&bridge))));
    let engine = Arc::new(RelayEngine::new(
        config.relay.clone(),
        router,
        Arc::new(DetachedPlatform),
        Arc::new(InMemoryRiftStore::new(config.relay.notify)),
    ));

    open_static_rifts(&engine, &bridge, &config.rifts).await;
    if engine.edges().is_empty() {
        warn!("no rifts are open; declare some under `rifts` in the config");
    }

    let cancel = CancellationToken::new();
    let mut relay = tokio::spawn(Arc::clone(&engine).run(events, cancel.clone()));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutting down");
            cancel.cancel();
            relay.await?;
        },
        result = &mut relay => {
            result?;
            warn!("relay engine exited");
        },
    }

    bridge.shutdown();
    Ok(())
}
