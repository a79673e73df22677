//! Raw link-layer transmission: interface lookup and packet sockets.

pub mod iface;
#[cfg(target_os = "linux")]
pub mod packet;

use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::frame::MacAddr;

pub use iface::{Interface, InterfaceSelector};
#[cfg(target_os = "linux")]
pub use packet::PacketSocket;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("interface {selector} not found")]
    InterfaceNotFound { selector: String },

    #[error("failed to enumerate network interfaces: {0}")]
    Enumerate(#[source] io::Error),

    #[error("insufficient privilege to open a raw socket on {iface} (need root or CAP_NET_RAW)")]
    InsufficientPrivilege { iface: String },

    #[error("cannot open raw socket on {iface}: {source}")]
    Open {
        iface: String,
        #[source]
        source: io::Error,
    },
}

/// A packet-oriented endpoint bound to one interface and protocol.
///
/// Implementations must tolerate concurrent `write_to` calls from many tasks.
#[async_trait]
pub trait LinkSocket: Send + Sync {
    /// Send one frame to `destination`, returning the bytes written.
    async fn write_to(&self, frame: &[u8], destination: MacAddr) -> io::Result<usize>;
}
