use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEVICE_PREFIX: &str = "/dev/bpf";
pub const DEFAULT_MAX_DEVICES: u32 = 100;

/// When `open_socket` also opens the plain UDP fallback socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// When broadcast receive is requested on a broadcast-capable link.
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(FallbackMode::Auto),
            "always" | "on" => Ok(FallbackMode::Always),
            "never" | "off" => Ok(FallbackMode::Never),
            other => Err(format!("unknown fallback mode '{other}'")),
        }
    }
}

/// Tunables for the BPF packet filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpfConfig {
    /// Device path prefix; units are tried as `<prefix>0`, `<prefix>1`, ...
    pub device_prefix: String,
    pub max_devices: u32,
    /// Kernel buffer size (`BIOCSBLEN`, or `SO_RCVBUF` on Linux). `None`
    /// keeps the kernel default.
    pub buffer_size: Option<u32>,
    pub immediate: bool,
    pub nonblocking: bool,
    pub fallback: FallbackMode,
    pub verify_udp_checksum: bool,
}

impl Default for BpfConfig {
    fn default() -> Self {
        Self {
            device_prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            max_devices: DEFAULT_MAX_DEVICES,
            buffer_size: None,
            immediate: true,
            nonblocking: true,
            fallback: FallbackMode::Auto,
            verify_udp_checksum: true,
        }
    }
}

impl BpfConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let device_prefix =
            env::var("RAWDHCP_BPF_DEVICE_PREFIX").unwrap_or(defaults.device_prefix);
        let max_devices = env::var("RAWDHCP_BPF_MAX_DEVICES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_devices);
        let buffer_size = env::var("RAWDHCP_BUFFER_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|size| *size > 0);
        let fallback = env::var("RAWDHCP_FALLBACK")
            .ok()
            .and_then(|v| v.parse::<FallbackMode>().ok())
            .unwrap_or(defaults.fallback);

        Self {
            device_prefix,
            max_devices,
            buffer_size,
            immediate: env_bool("RAWDHCP_IMMEDIATE", defaults.immediate),
            nonblocking: env_bool("RAWDHCP_NONBLOCKING", defaults.nonblocking),
            fallback,
            verify_udp_checksum: env_bool(
                "RAWDHCP_VERIFY_UDP_CHECKSUM",
                defaults.verify_udp_checksum,
            ),
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read packet filter config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse packet filter config {}", path.display()))
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}
