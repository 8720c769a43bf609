// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The privilege gate: started as root, the daemon switches to the `clat`
//! user while keeping exactly the capabilities the data path needs — raw
//! sockets, interface administration, and locked ring memory.

use nix::unistd::{Group, User, setgroups, setresgid, setresuid};
use tracing::debug;

const RUN_AS: &str = "clat";
const SUPPLEMENTARY_GROUPS: [&str; 2] = ["inet", "vpn"];

const CAP_NET_ADMIN: u32 = 12;
const CAP_NET_RAW: u32 = 13;
const CAP_IPC_LOCK: u32 = 14;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

#[repr(C)]
#[derive(Default, Copy, Clone)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("no such user '{0}'")]
    NoSuchUser(&'static str),
    #[error("no such group '{0}'")]
    NoSuchGroup(&'static str),
    #[error("{op} failed: {errno}")]
    Syscall {
        op: &'static str,
        errno: nix::errno::Errno,
    },
}

fn syscall_error(op: &'static str) -> impl Fn(nix::errno::Errno) -> PrivilegeError {
    move |errno| PrivilegeError::Syscall { op, errno }
}

fn group(name: &'static str) -> Result<Group, PrivilegeError> {
    Group::from_name(name)
        .map_err(syscall_error("getgrnam"))?
        .ok_or(PrivilegeError::NoSuchGroup(name))
}

/// Drop root but keep the capabilities the daemon still needs. Any failure
/// is fatal; the caller exits before touching the network.
pub fn drop_root() -> Result<(), PrivilegeError> {
    let gids = [
        group(SUPPLEMENTARY_GROUPS[0])?.gid,
        group(SUPPLEMENTARY_GROUPS[1])?.gid,
    ];
    setgroups(&gids).map_err(syscall_error("setgroups"))?;

    nix::sys::prctl::set_keepcaps(true).map_err(syscall_error("prctl(PR_SET_KEEPCAPS)"))?;

    let gid = group(RUN_AS)?.gid;
    setresgid(gid, gid, gid).map_err(syscall_error("setresgid"))?;

    let uid = User::from_name(RUN_AS)
        .map_err(syscall_error("getpwnam"))?
        .ok_or(PrivilegeError::NoSuchUser(RUN_AS))?
        .uid;
    setresuid(uid, uid, uid).map_err(syscall_error("setresuid"))?;

    // keep CAP_NET_RAW for the raw and packet sockets, CAP_NET_ADMIN for
    // interface configuration, and CAP_IPC_LOCK for the locked ring pages
    set_capabilities((1 << CAP_NET_ADMIN) | (1 << CAP_NET_RAW) | (1 << CAP_IPC_LOCK))?;

    debug!("running as {RUN_AS} with a reduced capability set");
    Ok(())
}

/// Set the permitted, effective, and inheritable capabilities of the
/// current thread.
#[allow(unsafe_code)]
fn set_capabilities(mask: u64) -> Result<(), PrivilegeError> {
    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0, // 0 = this thread
    };
    #[allow(clippy::cast_possible_truncation)]
    let low = mask as u32;
    let high = (mask >> 32) as u32;
    let data = [
        CapUserData {
            effective: low,
            permitted: low,
            inheritable: low,
        },
        CapUserData {
            effective: high,
            permitted: high,
            inheritable: high,
        },
    ];

    let rc = unsafe { libc::syscall(libc::SYS_capset, &raw const header, data.as_ptr()) };
    if rc < 0 {
        return Err(PrivilegeError::Syscall {
            op: "capset",
            errno: nix::errno::Errno::last(),
        });
    }
    Ok(())
}
