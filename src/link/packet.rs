//! `AF_PACKET` raw socket registered with the tokio reactor.
//!
//! The socket is opened non-blocking and wrapped in [`AsyncFd`], so a full
//! transmit queue parks the writing task instead of a runtime thread.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info};

use super::{Interface, LinkError, LinkSocket};
use crate::frame::MacAddr;

/// Raw link-layer socket bound to a single interface and EtherType.
///
/// Dropping it closes the file descriptor.
#[derive(Debug)]
pub struct PacketSocket {
    fd: AsyncFd<OwnedFd>,
    ifindex: i32,
    ifname: String,
    ether_type: u16,
}

impl PacketSocket {
    /// Open and bind a raw socket on `iface` for `ether_type`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(iface: &Interface, ether_type: u16) -> Result<Self, LinkError> {
        let ifindex = iface.index as i32;
        let protocol = ether_type.to_be();

        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol as libc::c_int,
            )
        };
        if raw < 0 {
            return Err(open_error(&iface.name, io::Error::last_os_error()));
        }
        let owned = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = link_addr(ifindex, protocol, MacAddr::default());
        let ret = unsafe {
            libc::bind(
                owned.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(open_error(&iface.name, io::Error::last_os_error()));
        }

        let fd = AsyncFd::new(owned).map_err(|e| open_error(&iface.name, e))?;

        info!(
            iface = iface.name.as_str(),
            ifindex = ifindex,
            ether_type = %format!("{:#06x}", ether_type),
            "raw packet socket open"
        );

        Ok(Self {
            fd,
            ifindex,
            ifname: iface.name.clone(),
            ether_type,
        })
    }

    fn send_once(&self, frame: &[u8], destination: MacAddr) -> io::Result<usize> {
        let addr = link_addr(self.ifindex, self.ether_type.to_be(), destination);
        let ret = unsafe {
            libc::sendto(
                self.fd.get_ref().as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

#[async_trait]
impl LinkSocket for PacketSocket {
    async fn write_to(&self, frame: &[u8], destination: MacAddr) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|_| self.send_once(frame, destination)) {
                Ok(result) => return result,
                // Readiness was stale; wait again.
                Err(_would_block) => continue,
            }
        }
    }
}

impl Drop for PacketSocket {
    fn drop(&mut self) {
        debug!(iface = self.ifname.as_str(), "closing raw packet socket");
    }
}

fn link_addr(ifindex: i32, protocol_be: u16, destination: MacAddr) -> libc::sockaddr_ll {
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as libc::c_ushort;
    addr.sll_protocol = protocol_be;
    addr.sll_ifindex = ifindex;
    addr.sll_halen = 6;
    addr.sll_addr[..6].copy_from_slice(&destination.octets());
    addr
}

fn open_error(iface: &str, source: io::Error) -> LinkError {
    match source.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => LinkError::InsufficientPrivilege {
            iface: iface.to_string(),
        },
        _ => LinkError::Open {
            iface: iface.to_string(),
            source,
        },
    }
}
