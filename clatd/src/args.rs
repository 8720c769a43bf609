// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The command-line surface: the contract with the init facility that
//! launches (and relaunches) the daemon.

use clap::Parser;
use net::interface::InterfaceName;
use net::plat::PlatPrefix;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/clatd.conf";
pub const DEFAULT_TUN_NAME: &str = "clat4";

#[derive(Debug, Parser)]
#[command(name = "clatd")]
#[command(about = "464XLAT customer-side translator", long_about = None)]
pub struct CmdArgs {
    /// IPv6 uplink interface. Required here or in the configuration file.
    #[arg(short = 'i', value_name = "interface", value_parser = InterfaceName::from_str)]
    pub uplink_interface: Option<InterfaceName>,

    /// PLAT translation prefix, e.g. 64:ff9b::/96
    #[arg(short = 'p', value_name = "plat-prefix", value_parser = PlatPrefix::from_str)]
    pub plat_prefix: Option<PlatPrefix>,

    /// Force the local IPv4 address instead of probing for a free one
    #[arg(short = '4', value_name = "ipv4-address")]
    pub ipv4_address: Option<Ipv4Addr>,

    /// Force the CLAT IPv6 address instead of deriving it from the uplink
    #[arg(short = '6', value_name = "ipv6-address")]
    pub ipv6_address: Option<Ipv6Addr>,

    /// Network identifier handed to address-resolution helpers
    #[arg(short = 'n', value_name = "net-id")]
    pub net_id: Option<u32>,

    /// Tunnel device name
    #[arg(short = 't', value_name = "tun-name", value_parser = InterfaceName::from_str)]
    pub tun_name: Option<InterfaceName>,

    /// Firewall mark for the raw IPv6 send socket
    #[arg(short = 'm', value_name = "mark")]
    pub mark: Option<u32>,

    /// Configuration file
    #[arg(short = 'c', value_name = "config-file", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Log level: error, warn, info, debug, or trace
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub log_level: tracing::Level,
}

impl CmdArgs {
    /// The tunnel device name, defaulting to `clat4`.
    pub fn tun_name(&self) -> InterfaceName {
        self.tun_name.clone().unwrap_or_else(|| {
            InterfaceName::try_from(DEFAULT_TUN_NAME).unwrap_or_else(|_| unreachable!())
        })
    }
}
