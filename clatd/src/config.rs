// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The process-wide configuration record: defaults, the configuration file,
//! MTU clamping, and the two address-selection procedures.

use crate::args::CmdArgs;
use crate::setif;
use ipnet::Ipv4Net;
use net::interface::{InterfaceName, InterfaceNameError};
use net::plat::{self, PlatPrefix, PlatPrefixError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};
use std::path::Path;
use tracing::{debug, info, warn};

/// Largest uplink MTU the daemon will drive.
pub const MAXMTU: u16 = 1500;

/// One tunnel read: the 4-byte packet-information header plus a full packet.
pub const PACKETLEN: usize = MAXMTU as usize + 4;

/// 40-byte IPv6 header replaces the 20-byte IPv4 header, plus a possible
/// fragment header.
pub const MTU_DELTA: u16 = 28;

/// RFC 7335 dedicates 192.0.0.0/29 to the CLAT; .4 is the customary first
/// candidate.
const DEFAULT_IPV4_LOCAL: Ipv4Addr = Ipv4Addr::new(192, 0, 0, 4);
const DEFAULT_IPV4_PREFIXLEN: u8 = 29;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no uplink interface given (use -i or default_pdp_interface)")]
    NoUplinkInterface,
    #[error("no PLAT prefix given (use -p or plat_subnet)")]
    NoPlatPrefix,
    #[error("cannot read {path}: {source}")]
    UnreadableFile {
        path: String,
        source: std::io::Error,
    },
    #[error("bad value '{value}' for configuration key '{key}'")]
    BadValue { key: &'static str, value: String },
    #[error(transparent)]
    BadPrefix(#[from] PlatPrefixError),
    #[error(transparent)]
    BadInterfaceName(#[from] InterfaceNameError),
    #[error("no free IPv4 address in {0}/{1}")]
    NoFreeAddress(Ipv4Addr, u8),
    #[error("unable to find an IPv6 address on interface {0}")]
    NoInterfaceAddress(InterfaceName),
    #[error("unable to read the MTU of {0}: {1}")]
    InterfaceMtu(InterfaceName, setif::SetifError),
}

/// Everything the data path is parameterized by. Built once at startup and
/// then only read; a prefix change tears the process down instead of
/// mutating this.
#[derive(Debug, Clone)]
pub struct Config {
    pub mtu: u16,
    pub ipv4mtu: u16,
    pub plat: PlatPrefix,
    pub ipv4_local: Ipv4Addr,
    pub ipv6_local: Ipv6Addr,
    pub default_pdp_interface: InterfaceName,
    /// Interface carrying the raw send socket; the uplink unless split.
    pub native_ipv6_interface: InterfaceName,
    pub tun_name: InterfaceName,
    pub mark: Option<u32>,
    pub net_id: Option<u32>,
}

/// The raw keys a configuration file may carry.
#[derive(Debug, Default)]
struct FileConfig {
    plat_subnet: Option<PlatPrefix>,
    ipv4_local_subnet: Option<Ipv4Addr>,
    ipv4_local_prefixlen: Option<u8>,
    mtu: Option<u16>,
    ipv4mtu: Option<u16>,
    default_pdp_interface: Option<InterfaceName>,
}

impl Config {
    /// Assemble the effective configuration from the command line and the
    /// configuration file, select the local IPv4 address, and derive the
    /// CLAT IPv6 address.
    ///
    /// # Errors
    ///
    /// All failures here are fatal; no partial configuration is viable.
    pub fn load(args: &CmdArgs) -> Result<Config, ConfigError> {
        let explicit_file = args.config_file.as_os_str()
            != std::ffi::OsStr::new(crate::args::DEFAULT_CONFIG_FILE);
        let file = read_config_file(&args.config_file, explicit_file)?;

        let uplink = args
            .uplink_interface
            .clone()
            .or(file.default_pdp_interface)
            .ok_or(ConfigError::NoUplinkInterface)?;
        let plat = args
            .plat_prefix
            .or(file.plat_subnet)
            .ok_or(ConfigError::NoPlatPrefix)?;

        let mtu = effective_mtu(file.mtu, &uplink)?;
        let ipv4mtu = effective_ipv4_mtu(file.ipv4mtu, mtu);

        let ipv4_local = match args.ipv4_address {
            Some(addr) => addr,
            None => {
                let initial = file.ipv4_local_subnet.unwrap_or(DEFAULT_IPV4_LOCAL);
                let prefix_len = file.ipv4_local_prefixlen.unwrap_or(DEFAULT_IPV4_PREFIXLEN);
                select_ipv4_address(initial, prefix_len, address_is_free)
                    .ok_or(ConfigError::NoFreeAddress(initial, prefix_len))?
            }
        };

        let ipv6_local = match args.ipv6_address {
            Some(addr) => addr,
            None => {
                let uplink_addr = uplink_global_ipv6(&uplink)
                    .ok_or_else(|| ConfigError::NoInterfaceAddress(uplink.clone()))?;
                plat::local_address_for_prefix(uplink_addr)
            }
        };

        info!("using IPv4 address {ipv4_local} on {}", args.tun_name());
        info!("using IPv6 address {ipv6_local} on {uplink}");

        Ok(Config {
            mtu,
            ipv4mtu,
            plat,
            ipv4_local,
            ipv6_local,
            native_ipv6_interface: uplink.clone(),
            default_pdp_interface: uplink,
            tun_name: args.tun_name(),
            mark: args.mark,
            net_id: args.net_id,
        })
    }
}

fn read_config_file(path: &Path, explicit: bool) -> Result<FileConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config_file(&text),
        Err(source) if explicit => Err(ConfigError::UnreadableFile {
            path: path.display().to_string(),
            source,
        }),
        Err(_) => {
            debug!("no configuration file at {}; using defaults", path.display());
            Ok(FileConfig::default())
        }
    }
}

/// Parse the launcher's `key value` file. Blank lines and `#` comments are
/// skipped; unknown keys are ignored with a warning so old and new launchers
/// can share a file.
fn parse_config_file(text: &str) -> Result<FileConfig, ConfigError> {
    let mut file = FileConfig::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        match key {
            "plat_subnet" => {
                file.plat_subnet =
                    Some(value.parse().map_err(|_| ConfigError::BadValue {
                        key: "plat_subnet",
                        value: value.to_string(),
                    })?);
            }
            "ipv4_local_subnet" => {
                file.ipv4_local_subnet =
                    Some(value.parse().map_err(|_| ConfigError::BadValue {
                        key: "ipv4_local_subnet",
                        value: value.to_string(),
                    })?);
            }
            "ipv4_local_prefixlen" => {
                file.ipv4_local_prefixlen =
                    Some(value.parse().map_err(|_| ConfigError::BadValue {
                        key: "ipv4_local_prefixlen",
                        value: value.to_string(),
                    })?);
            }
            "mtu" => {
                file.mtu = Some(value.parse().map_err(|_| ConfigError::BadValue {
                    key: "mtu",
                    value: value.to_string(),
                })?);
            }
            "ipv4mtu" => {
                file.ipv4mtu = Some(value.parse().map_err(|_| ConfigError::BadValue {
                    key: "ipv4mtu",
                    value: value.to_string(),
                })?);
            }
            "default_pdp_interface" => {
                file.default_pdp_interface =
                    Some(value.parse().map_err(|_| ConfigError::BadValue {
                        key: "default_pdp_interface",
                        value: value.to_string(),
                    })?);
            }
            other => warn!("ignoring unknown configuration key '{other}'"),
        }
    }
    Ok(file)
}

/// Clamp the configured (or discovered) uplink MTU to `[1280, MAXMTU]`.
fn effective_mtu(configured: Option<u16>, uplink: &InterfaceName) -> Result<u16, ConfigError> {
    let mut mtu = match configured {
        Some(mtu) if mtu > 0 => mtu,
        _ => {
            let mtu = setif::interface_mtu(uplink)
                .map_err(|e| ConfigError::InterfaceMtu(uplink.clone(), e))?;
            warn!("ifmtu={mtu}");
            mtu
        }
    };
    if mtu > MAXMTU {
        warn!("max MTU is {MAXMTU}, requested {mtu}");
        mtu = MAXMTU;
    }
    if mtu < 1280 {
        warn!("mtu too small = {mtu}");
        mtu = 1280;
    }
    Ok(mtu)
}

/// The IPv4-side MTU: `mtu − 28` unless a smaller value was configured.
fn effective_ipv4_mtu(configured: Option<u16>, mtu: u16) -> u16 {
    let derived = mtu - MTU_DELTA;
    match configured {
        Some(ipv4mtu) if ipv4mtu > 0 && ipv4mtu <= derived => ipv4mtu,
        _ => {
            warn!("ipv4mtu now set to = {derived}");
            derived
        }
    }
}

/// Walk the host range from `initial` to the end of its prefix, returning
/// the first address the probe calls free.
///
/// Two daemons racing between probe and install can still collide; the
/// window is tiny and the fallout is limited to stalled IPv4 TCP sessions
/// until one tunnel goes down.
fn select_ipv4_address(
    initial: Ipv4Addr,
    prefix_len: u8,
    mut is_free: impl FnMut(Ipv4Addr) -> bool,
) -> Option<Ipv4Addr> {
    let net = Ipv4Net::new(initial, prefix_len).ok()?;
    let end = u32::from(net.broadcast());
    (u32::from(initial)..end)
        .map(Ipv4Addr::from)
        .find(|addr| is_free(*addr))
}

/// Routing probe: connecting a datagram socket performs a route lookup
/// without sending anything. The kernel picking the candidate itself as the
/// source address means the address is already assigned on this host.
fn address_is_free(addr: Ipv4Addr) -> bool {
    let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) else {
        return false;
    };
    match socket.connect((addr, 53)) {
        Ok(()) => match socket.local_addr() {
            Ok(local) => local.ip() != IpAddr::V4(addr),
            Err(_) => true,
        },
        // no route at all: nothing here answers for it
        Err(_) => true,
    }
}

/// The uplink's current global IPv6 address, if any: the first configured
/// address that is neither link-local nor loopback.
pub fn uplink_global_ipv6(name: &InterfaceName) -> Option<Ipv6Addr> {
    let addrs = nix::ifaddrs::getifaddrs().ok()?;
    for entry in addrs {
        if entry.interface_name != name.as_str() {
            continue;
        }
        let Some(address) = entry.address else {
            continue;
        };
        let Some(sin6) = address.as_sockaddr_in6() else {
            continue;
        };
        let addr = sin6.ip();
        if !addr.is_loopback() && (addr.segments()[0] & 0xffc0) != 0xfe80 {
            return Some(addr);
        }
    }
    None
}
