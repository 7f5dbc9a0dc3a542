//! Classic BPF pieces shared by the capture backends.

mod program;
pub mod record;

pub use program::{af_inet_as_loaded, dhcp_program, BpfInsn, ACCEPT_WHOLE_PACKET};
