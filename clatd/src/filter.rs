// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel classifier: a hand-assembled cBPF program that accepts a frame
//! if and only if its IPv6 destination address equals the CLAT /128.

use crate::config::PACKETLEN;
use std::net::Ipv6Addr;
use std::os::fd::RawFd;

// cBPF opcode classes and modifiers; linux/filter.h values.
const BPF_LD: u16 = 0x00;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;
const BPF_RET: u16 = 0x06;

const fn stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// Build the accept-only-our-address program.
///
/// The destination address starts 24 bytes into the IPv6 header (the socket
/// is cooked, so the frame starts at the network header). Each of its four
/// words is loaded and compared against the corresponding word of the CLAT
/// address in host byte order (BPF loads are big-endian-to-host); the first
/// mismatch jumps to the reject at the end.
pub fn program(local: Ipv6Addr) -> [libc::sock_filter; 10] {
    let octets = local.octets();
    let word = |i: usize| u32::from_be_bytes([octets[i], octets[i + 1], octets[i + 2], octets[i + 3]]);
    [
        stmt(BPF_LD | BPF_W | BPF_ABS, 24),
        jump(BPF_JMP | BPF_JEQ | BPF_K, word(0), 0, 7),
        stmt(BPF_LD | BPF_W | BPF_ABS, 28),
        jump(BPF_JMP | BPF_JEQ | BPF_K, word(4), 0, 5),
        stmt(BPF_LD | BPF_W | BPF_ABS, 32),
        jump(BPF_JMP | BPF_JEQ | BPF_K, word(8), 0, 3),
        stmt(BPF_LD | BPF_W | BPF_ABS, 36),
        jump(BPF_JMP | BPF_JEQ | BPF_K, word(12), 0, 1),
        stmt(BPF_RET | BPF_K, PACKETLEN as u32),
        stmt(BPF_RET | BPF_K, 0),
    ]
}

/// Attach the classifier to `fd`.
#[allow(unsafe_code)]
pub fn attach(fd: RawFd, local: Ipv6Addr) -> nix::Result<()> {
    let mut code = program(local);
    #[allow(clippy::cast_possible_truncation)]
    let prog = libc::sock_fprog {
        len: code.len() as u16,
        filter: code.as_mut_ptr(),
    };
    #[allow(clippy::cast_possible_truncation)]
    let len = std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            (&raw const prog).cast(),
            len,
        )
    };
    if rc < 0 {
        return Err(nix::errno::Errno::last());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Interpret just enough cBPF to execute [`program`] against a frame.
    fn run(prog: &[libc::sock_filter], frame: &[u8]) -> u32 {
        let mut acc: u32 = 0;
        let mut pc = 0usize;
        loop {
            let insn = prog[pc];
            match insn.code {
                c if c == (BPF_LD | BPF_W | BPF_ABS) => {
                    let k = insn.k as usize;
                    acc = u32::from_be_bytes([
                        frame[k],
                        frame[k + 1],
                        frame[k + 2],
                        frame[k + 3],
                    ]);
                    pc += 1;
                }
                c if c == (BPF_JMP | BPF_JEQ | BPF_K) => {
                    pc += 1 + usize::from(if acc == insn.k { insn.jt } else { insn.jf });
                }
                c if c == (BPF_RET | BPF_K) => return insn.k,
                _ => unreachable!("unhandled opcode"),
            }
        }
    }

    fn frame_to(dst: Ipv6Addr) -> Vec<u8> {
        let mut frame = vec![0u8; 60];
        frame[0] = 0x60;
        frame[24..40].copy_from_slice(&dst.octets());
        frame
    }

    #[test]
    fn accepts_exactly_the_local_address() {
        let local: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let prog = program(local);

        assert_eq!(run(&prog, &frame_to(local)), PACKETLEN as u32);
        for other in ["2001:db8::2", "2001:db9::1", "64:ff9b::808:808", "::"] {
            let other: Ipv6Addr = other.parse().unwrap();
            assert_eq!(run(&prog, &frame_to(other)), 0, "must reject {other}");
        }
    }

    #[test]
    fn mismatch_in_any_word_rejects() {
        let local: Ipv6Addr = "2001:db8:1:2:3:4:5:6".parse().unwrap();
        let prog = program(local);
        for byte in [24, 28, 32, 36, 39] {
            let mut frame = frame_to(local);
            frame[byte] ^= 0x01;
            assert_eq!(run(&prog, &frame), 0, "flip at {byte}");
        }
    }
}
