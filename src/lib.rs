//! etherflood -- raw Ethernet frame flood generator.
//!
//! This crate provides the concurrent send pipeline, an Ethernet frame codec,
//! Linux `AF_PACKET` sockets and interface discovery.

pub mod config;
pub mod flood;
pub mod frame;
pub mod link;

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::config::FloodConfig;
use crate::flood::{FloodError, Summary};
use crate::frame::EthernetCodec;
use crate::link::Interface;

/// Flood the configured interface with broadcast frames.
///
/// Resolves the interface and opens the raw socket before any worker starts;
/// failures there are returned as startup errors. The socket is closed once
/// the pool and the aggregator have both finished.
#[cfg(target_os = "linux")]
pub async fn send<F>(config: &FloodConfig, shutdown: F) -> Result<Summary, FloodError>
where
    F: Future<Output = ()>,
{
    let params = config.params()?;
    let iface = Interface::resolve(&config.interface_selector())?;
    info!(
        iface = iface.name.as_str(),
        index = iface.index,
        seed = params.seed,
        "selected interface"
    );

    let socket = Arc::new(link::PacketSocket::open(&iface, config.ether_type)?);
    let codec = Arc::new(EthernetCodec::new(config.ether_type, config.payload_len));

    flood::run(params, socket, codec, shutdown).await
}
