// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet arithmetic shared by the translator and the daemon: one's-complement
//! checksums, RFC 6052 address embedding, and validated interface names.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod checksum;
pub mod interface;
pub mod plat;
