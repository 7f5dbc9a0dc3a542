#![deny(unsafe_op_in_unsafe_fn)]
//! Raw-frame DHCPv4 transport over BPF.
//!
//! A DHCPv4 server has to answer clients that do not own an address yet, so
//! it cannot rely on the kernel IP stack for delivery. This crate opens a
//! capture device per interface, installs a classic BPF program that only
//! lets DHCP traffic for the server through, and builds/parses the
//! Ethernet (or null-link), IPv4 and UDP headers itself.
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use dhcp_pktfilter::{Iface, HwAddr, Pkt4, PktFilter, PktFilterBpf, DHCP_SERVER_PORT};
//!
//! # fn main() -> dhcp_pktfilter::Result<()> {
//! let filter: Box<dyn PktFilter> = Box::new(PktFilterBpf::from_env());
//! let iface = Iface::new("em0", 2, "02:00:5e:10:00:01".parse::<HwAddr>().unwrap());
//! let socket = filter.open_socket(&iface, Ipv4Addr::new(192, 0, 2, 1), DHCP_SERVER_PORT, true, true)?;
//! if let Some(query) = filter.receive(&iface, &socket)? {
//!     let mut reply = Pkt4::new(query.payload().to_vec());
//!     reply.set_local_addr(socket.addr());
//!     filter.send(&iface, socket.primary(), &reply)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod bpf;
mod capture;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod iface;
pub mod logging;
pub mod packet;
pub mod socket;

pub use config::{BpfConfig, FallbackMode};
pub use error::{ErrorClass, PktFilterError, Result};
pub use filter::{PktFilter, PktFilterBpf};
pub use frame::{assemble_frame, parse_frame, Discard, LinkType};
pub use iface::{HwAddr, Iface, IfaceFlags};
pub use logging::LoggingConfig;
pub use packet::{Pkt4, DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
pub use socket::{fallback_required, open_fallback_socket, SocketInfo};
