use std::io;
use std::net::Ipv4Addr;
use std::os::fd::RawFd;

use thiserror::Error;

/// Which packet filter operation an error belongs to.
///
/// Open errors are fatal to the `open_socket` call, send errors are handed back to
/// the caller to decide on a retry, and receive errors end the caller's read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    SocketOpen,
    Send,
    Receive,
}

/// Unified error type for the raw DHCPv4 packet filter.
///
/// Every variant names the interface and, where a syscall failed, carries the
/// underlying `io::Error` so the OS error code survives up to the caller's log line.
#[derive(Error, Debug)]
pub enum PktFilterError {
    // Socket open errors
    #[error("Permission denied: {operation} on '{interface}'. Root privileges required.")]
    PermissionDenied {
        interface: String,
        operation: String,
    },

    #[error("Interface '{interface}' is down, cannot open capture socket")]
    InterfaceDown { interface: String },

    #[error("Unsupported capture configuration on '{interface}': {reason}")]
    Unsupported { interface: String, reason: String },

    #[error("No free BPF device for '{interface}' under {prefix} (tried {tried})")]
    DeviceUnavailable {
        interface: String,
        prefix: String,
        tried: u32,
    },

    #[error("Failed to {operation} for '{interface}': {source}")]
    SocketOpen {
        interface: String,
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open fallback socket {addr}:{port} for '{interface}': {source}")]
    FallbackSocket {
        interface: String,
        addr: Ipv4Addr,
        port: u16,
        #[source]
        source: io::Error,
    },

    // Send errors
    #[error("Failed to send frame on '{interface}' (fd {fd}): {source}")]
    Send {
        interface: String,
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    #[error("Kernel buffer space exhausted sending on '{interface}' (fd {fd}): {source}")]
    SendBufferExhausted {
        interface: String,
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    #[error("Link on '{interface}' went down while sending (fd {fd})")]
    LinkDown { interface: String, fd: RawFd },

    #[error("Frame of {len} bytes does not fit '{interface}' (limit {limit})")]
    FrameTooLarge {
        interface: String,
        len: usize,
        limit: usize,
    },

    #[error("Short write on '{interface}' (fd {fd}): wrote {written} of {expected} bytes")]
    ShortWrite {
        interface: String,
        fd: RawFd,
        written: usize,
        expected: usize,
    },

    // Receive errors
    #[error("Failed to receive on '{interface}' (fd {fd}): {source}")]
    Receive {
        interface: String,
        fd: RawFd,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PktFilterError>;

impl PktFilterError {
    /// Build an open-path error, mapping permission and link-state failures to
    /// their dedicated variants.
    pub fn open_error(
        interface: impl Into<String>,
        operation: impl Into<String>,
        source: io::Error,
    ) -> Self {
        let interface = interface.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                interface,
                operation: operation.into(),
            };
        }
        if source.raw_os_error() == Some(libc::ENETDOWN) {
            return Self::InterfaceDown { interface };
        }
        Self::SocketOpen {
            interface,
            operation: operation.into(),
            source,
        }
    }

    /// Build a send-path error from a failed write.
    pub fn send_error(interface: impl Into<String>, fd: RawFd, source: io::Error) -> Self {
        let interface = interface.into();
        match source.raw_os_error() {
            Some(libc::ENOBUFS) => Self::SendBufferExhausted {
                interface,
                fd,
                source,
            },
            Some(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK => {
                Self::SendBufferExhausted {
                    interface,
                    fd,
                    source,
                }
            }
            Some(libc::ENETDOWN) | Some(libc::ENXIO) => Self::LinkDown { interface, fd },
            _ => Self::Send {
                interface,
                fd,
                source,
            },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PermissionDenied { .. }
            | Self::InterfaceDown { .. }
            | Self::Unsupported { .. }
            | Self::DeviceUnavailable { .. }
            | Self::SocketOpen { .. }
            | Self::FallbackSocket { .. } => ErrorClass::SocketOpen,
            Self::Send { .. }
            | Self::SendBufferExhausted { .. }
            | Self::LinkDown { .. }
            | Self::FrameTooLarge { .. }
            | Self::ShortWrite { .. } => ErrorClass::Send,
            Self::Receive { .. } => ErrorClass::Receive,
        }
    }

    /// True for send failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SendBufferExhausted { .. } | Self::ShortWrite { .. }
        )
    }

    /// The OS error code behind this error, if a syscall produced it.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SocketOpen { source, .. }
            | Self::FallbackSocket { source, .. }
            | Self::Send { source, .. }
            | Self::SendBufferExhausted { source, .. }
            | Self::Receive { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_maps_permission_denied() {
        let err = PktFilterError::open_error(
            "em0",
            "open /dev/bpf0",
            io::Error::from_raw_os_error(libc::EACCES),
        );
        assert!(matches!(err, PktFilterError::PermissionDenied { .. }));
        assert_eq!(err.class(), ErrorClass::SocketOpen);
    }

    #[test]
    fn test_open_error_maps_network_down() {
        let err = PktFilterError::open_error(
            "em0",
            "attach to interface",
            io::Error::from_raw_os_error(libc::ENETDOWN),
        );
        assert!(matches!(err, PktFilterError::InterfaceDown { .. }));
    }

    #[test]
    fn test_open_error_keeps_os_code() {
        let err = PktFilterError::open_error(
            "em0",
            "set filter",
            io::Error::from_raw_os_error(libc::EINVAL),
        );
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert!(err.to_string().contains("set filter"));
    }

    #[test]
    fn test_send_error_buffer_exhaustion_is_transient() {
        let err = PktFilterError::send_error("em0", 7, io::Error::from_raw_os_error(libc::ENOBUFS));
        assert!(matches!(err, PktFilterError::SendBufferExhausted { fd: 7, .. }));
        assert!(err.is_transient());
        assert_eq!(err.class(), ErrorClass::Send);
    }

    #[test]
    fn test_send_error_link_down() {
        let err = PktFilterError::send_error("em0", 7, io::Error::from_raw_os_error(libc::ENETDOWN));
        assert!(matches!(err, PktFilterError::LinkDown { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_receive_class() {
        let err = PktFilterError::Receive {
            interface: "em0".to_string(),
            fd: 3,
            source: io::Error::from_raw_os_error(libc::EBADF),
        };
        assert_eq!(err.class(), ErrorClass::Receive);
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
