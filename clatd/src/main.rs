// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! clatd: a 464XLAT customer-side translator.
//!
//! The daemon owns a tun device that gives the host stack IPv4 over an
//! IPv6-only uplink. Packets written into the tun are translated statelessly
//! to IPv6 and sent raw; classifier-matched IPv6 packets from the uplink are
//! translated back and delivered through the tun.

use clap::Parser;
use std::os::fd::AsFd;
use tracing::{error, info};

mod args;
mod config;
mod event;
mod filter;
mod privilege;
mod ring;
mod setif;
mod sock;
mod tun;

use args::CmdArgs;
use config::{Config, ConfigError};
use privilege::PrivilegeError;
use ring::{Ring, RingError};
use setif::SetifError;
use sock::{RawSock, SockError};
use tun::{Tun, TunError};

#[derive(Debug, thiserror::Error)]
enum FatalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tun(#[from] TunError),
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    Sock(#[from] SockError),
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
    #[error(transparent)]
    Setif(#[from] SetifError),
    #[error("signal handlers: {0}")]
    Signals(nix::errno::Errno),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn main() {
    let args = CmdArgs::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    match run(&args) {
        Ok(()) => {
            info!("shutting down");
            std::process::exit(0);
        }
        Err(err) => {
            error!("fatal: {err}");
            std::process::exit(1);
        }
    }
}

fn run(args: &CmdArgs) -> Result<(), FatalError> {
    event::install_signal_handlers().map_err(FatalError::Signals)?;

    // the tun must exist before root goes away
    let tunnel = Tun::create(&args.tun_name())?;

    // from here on: the clat user plus NET_ADMIN, NET_RAW, and IPC_LOCK
    privilege::drop_root()?;

    let config = Config::load(args)?;
    if let Some(net_id) = config.net_id {
        info!("using network id {net_id} for resolver lookups");
    }

    let raw6 = RawSock::open(config.mark)?;
    let mut ring = Ring::create()?;

    // configure: v4 address and MTU on the tunnel, the CLAT address as
    // anycast on the uplink, and the classifier on the receive path
    setif::add_address(tunnel.name(), config.ipv4_local, 32)?;
    setif::bring_up(tunnel.name(), config.ipv4mtu)?;
    let uplink_index = setif::ifindex(&config.native_ipv6_interface)?;
    setif::join_anycast(raw6.as_fd(), config.ipv6_local, uplink_index)?;
    ring.arm(uplink_index, config.ipv6_local)?;

    info!(
        "translating {}/{} <-> {} (plat {}, mtu {}/{})",
        config.ipv4_local,
        32,
        config.ipv6_local,
        config.plat,
        config.mtu,
        config.ipv4mtu,
    );

    event::event_loop(&config, &tunnel, &raw6, &mut ring)?;
    Ok(())
}
