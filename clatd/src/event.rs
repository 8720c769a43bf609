// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The supervisor: one cooperative loop multiplexing the two receive paths,
//! with prefix-change detection on a timer and signal-driven shutdown.

use crate::config::{Config, PACKETLEN, uplink_global_ipv6};
use crate::ring::Ring;
use crate::sock::RawSock;
use crate::tun::{ETH_P_IP, TUN_HEADER_LEN, Tun, TunRead, frame_proto};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use net::plat::same_slash64;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use xlat::{ChecksumHint, SCRATCH_HEADROOM, Translated, Translator};

/// How often the uplink is checked for a prefix change.
pub const INTERFACE_POLL_FREQUENCY: Duration = Duration::from_secs(5);

/// The readiness-wait timeout; also the prefix-check cadence when no
/// traffic flows at all.
pub const NO_TRAFFIC_INTERFACE_POLL_FREQUENCY: Duration = Duration::from_secs(10);

const RING: Token = Token(0);
const TUN: Token = Token(1);

static RUNNING: AtomicBool = AtomicBool::new(true);

pub fn running() -> bool {
    RUNNING.load(Ordering::Relaxed)
}

pub fn stop() {
    RUNNING.store(false, Ordering::Relaxed);
}

extern "C" fn handle_stop_signal(_signal: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

/// Arrange for SIGTERM and SIGINT to stop the loop. No SA_RESTART: the
/// readiness wait has to come back with EINTR so the flag gets seen.
#[allow(unsafe_code)]
pub fn install_signal_handlers() -> nix::Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
    let action = SigAction::new(
        SigHandler::Handler(handle_stop_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }
    Ok(())
}

/// Run translation until a signal arrives, the tun disappears, or the
/// uplink prefix moves.
pub fn event_loop(
    config: &Config,
    tunnel: &Tun,
    raw6: &RawSock,
    ring: &mut Ring,
) -> std::io::Result<()> {
    let mut poll = Poll::new()?;
    let ring_fd = ring.as_raw_fd();
    let tun_fd = tunnel.as_raw_fd();
    poll.registry()
        .register(&mut SourceFd(&ring_fd), RING, Interest::READABLE)?;
    poll.registry()
        .register(&mut SourceFd(&tun_fd), TUN, Interest::READABLE)?;

    let translator = Translator::new(
        config.plat,
        config.ipv6_local,
        config.ipv4_local,
        config.ipv4mtu,
    );

    // the only buffers on the steady-state path, reused for every packet
    let mut inbuf = vec![0u8; PACKETLEN].into_boxed_slice();
    let mut out = vec![0u8; PACKETLEN + SCRATCH_HEADROOM].into_boxed_slice();

    let mut events = Events::with_capacity(4);
    let mut last_interface_poll = Instant::now();

    while running() {
        match poll.poll(&mut events, Some(NO_TRAFFIC_INTERFACE_POLL_FREQUENCY)) {
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                // signal; the flag check decides
            }
            Err(e) => warn!("event_loop/poll returned an error: {e}"),
            Ok(()) => {
                for event in &events {
                    match event.token() {
                        RING => {
                            if event.is_readable() {
                                ring.drain(|frame, hint| {
                                    forward_inbound(&translator, tunnel, raw6, frame, hint, &mut out);
                                });
                            }
                            // any other condition is an error; draining does
                            // not clear it and readiness would fire forever
                            if event.is_error() {
                                let errno = ring.clear_error();
                                warn!("event_loop: clearing error on read_fd6: {errno}");
                            }
                        }
                        // read even on error or hangup so the condition
                        // clears instead of spinning the loop
                        TUN => read_tun_packet(&translator, tunnel, raw6, &mut inbuf, &mut out),
                        Token(_) => {}
                    }
                }
            }
        }

        if last_interface_poll.elapsed() >= INTERFACE_POLL_FREQUENCY {
            last_interface_poll = Instant::now();
            if prefix_changed(config) {
                break;
            }
        }
    }
    Ok(())
}

/// One classifier-matched IPv6 frame from the ring: translate and deliver
/// through the tunnel.
fn forward_inbound(
    translator: &Translator,
    tunnel: &Tun,
    raw6: &RawSock,
    frame: &[u8],
    hint: ChecksumHint,
    out: &mut [u8],
) {
    match translator.v6_to_v4(frame, hint, out) {
        Ok(Translated::Forward(len)) => match tunnel.write_packet(ETH_P_IP, &out[..len]) {
            Ok(_) => {}
            Err(nix::errno::Errno::EAGAIN) => warn!("tun write would block; packet dropped"),
            Err(errno) => warn!("tun write failed: {errno}"),
        },
        Ok(Translated::Bounce(len)) => {
            if let Err(errno) = raw6.send(&out[..len]) {
                warn!("raw send of icmp reply failed: {errno}");
            }
        }
        Err(e) => debug!("dropping inbound packet: {e}"),
    }
}

/// One packet from the tunnel: strip the framing, translate to IPv6, and
/// send it raw.
fn read_tun_packet(
    translator: &Translator,
    tunnel: &Tun,
    raw6: &RawSock,
    inbuf: &mut [u8],
    out: &mut [u8],
) {
    let len = match tunnel.read_packet(inbuf) {
        TunRead::Packet(len) => len,
        TunRead::WouldBlock => return,
        TunRead::Removed => {
            warn!("read_packet/tun interface removed");
            stop();
            return;
        }
    };

    let Some((flags, proto)) = frame_proto(&inbuf[..len]) else {
        warn!("read_packet/short read: got {len} bytes");
        return;
    };
    if proto != ETH_P_IP {
        warn!("read_packet: unknown packet type = {proto:#x}");
        return;
    }
    if flags != 0 {
        warn!("read_packet: unexpected flags = {flags}");
    }

    match translator.v4_to_v6(&inbuf[TUN_HEADER_LEN..len], ChecksumHint::None, out) {
        Ok(Translated::Forward(len)) => match raw6.send(&out[..len]) {
            Ok(_) => {}
            Err(nix::errno::Errno::EAGAIN) => warn!("raw send would block; packet dropped"),
            Err(errno) => warn!("raw send failed: {errno}"),
        },
        Ok(Translated::Bounce(len)) => match tunnel.write_packet(ETH_P_IP, &out[..len]) {
            Ok(_) => {}
            Err(errno) => warn!("tun write of icmp reply failed: {errno}"),
        },
        Err(e) => debug!("dropping outbound packet: {e}"),
    }
}

/// True when the uplink's /64 no longer matches the CLAT address (or the
/// uplink lost its address entirely). The loop exits and the launcher
/// restarts us against the new prefix.
fn prefix_changed(config: &Config) -> bool {
    match uplink_global_ipv6(&config.default_pdp_interface) {
        None => {
            error!(
                "unable to find an IPv6 address on interface {}",
                config.default_pdp_interface
            );
            true
        }
        Some(current) => {
            if same_slash64(current, config.ipv6_local) {
                false
            } else {
                info!(
                    "IPv6 prefix on {} changed: {} -> {}",
                    config.default_pdp_interface, config.ipv6_local, current
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_gates_the_loop() {
        assert!(running());
        stop();
        assert!(!running());
        RUNNING.store(true, Ordering::Relaxed);
    }

    #[test]
    fn poll_cadence_is_sane() {
        // never faster than once per second, and the no-traffic timeout must
        // not starve the prefix check
        assert!(INTERFACE_POLL_FREQUENCY >= Duration::from_secs(1));
        assert!(NO_TRAFFIC_INTERFACE_POLL_FREQUENCY >= INTERFACE_POLL_FREQUENCY);
    }
}
