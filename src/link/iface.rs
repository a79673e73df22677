//! Network interface enumeration from sysfs.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::LinkError;
use crate::frame::MacAddr;

const SYSFS_NET: &str = "/sys/class/net";

/// A network interface as seen by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    /// `None` for interfaces without a 6-byte link address (e.g. tunnels).
    pub hardware_addr: Option<MacAddr>,
}

/// How the operator picked an interface: by kernel index or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceSelector {
    Index(u32),
    Name(String),
}

impl std::str::FromStr for InterfaceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<u32>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(s.to_string()),
        })
    }
}

impl std::fmt::Display for InterfaceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Name(n) => f.write_str(n),
        }
    }
}

/// List all interfaces on this host, ordered by index.
pub fn list() -> Result<Vec<Interface>, LinkError> {
    list_in(Path::new(SYSFS_NET))
}

/// List interfaces under a sysfs-style `root` (one directory per interface).
pub fn list_in(root: &Path) -> Result<Vec<Interface>, LinkError> {
    let entries = std::fs::read_dir(root).map_err(LinkError::Enumerate)?;

    let mut ifaces = Vec::new();
    for entry in entries {
        let entry = entry.map_err(LinkError::Enumerate)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let dir = entry.path();

        let index = match std::fs::read_to_string(dir.join("ifindex"))
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(i) => i,
            None => {
                debug!(iface = name.as_str(), "skipping entry without ifindex");
                continue;
            }
        };

        let hardware_addr = std::fs::read_to_string(dir.join("address"))
            .ok()
            .and_then(|s| s.trim().parse::<MacAddr>().ok());

        ifaces.push(Interface {
            index,
            name,
            hardware_addr,
        });
    }

    ifaces.sort_by_key(|i| i.index);
    Ok(ifaces)
}

impl Interface {
    /// Find the interface matching `selector` on this host.
    pub fn resolve(selector: &InterfaceSelector) -> Result<Interface, LinkError> {
        Self::resolve_in(Path::new(SYSFS_NET), selector)
    }

    pub fn resolve_in(root: &Path, selector: &InterfaceSelector) -> Result<Interface, LinkError> {
        list_in(root)?
            .into_iter()
            .find(|iface| match selector {
                InterfaceSelector::Index(i) => iface.index == *i,
                InterfaceSelector::Name(n) => iface.name == *n,
            })
            .ok_or_else(|| LinkError::InterfaceNotFound {
                selector: selector.to_string(),
            })
    }
}
