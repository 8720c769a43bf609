// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Validated kernel network interface names.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// A legal linux network interface name.
///
/// Non-empty, at most [`InterfaceName::MAX_LEN`] bytes, printable ASCII, no
/// spaces or slashes. The value is handed to the kernel in `ifreq` structures
/// as an implicitly NUL-terminated buffer, so the limits are enforced here
/// rather than at each call site.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceName(String);

impl InterfaceName {
    /// The maximum legal length (in bytes) of a linux interface name,
    /// excluding the trailing NUL (`IFNAMSIZ - 1`).
    pub const MAX_LEN: usize = 15;

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a NUL-padded fixed buffer of `IFNAMSIZ` bytes, the shape
    /// `ifreq.ifr_name` requires.
    #[must_use]
    pub fn to_ifname_bytes(&self) -> [u8; InterfaceName::MAX_LEN + 1] {
        let mut out = [0u8; InterfaceName::MAX_LEN + 1];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }
}

/// Errors which can occur when validating an [`InterfaceName`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceNameError {
    /// Empty string.
    #[error("interface name must not be empty")]
    Empty,
    /// Longer than [`InterfaceName::MAX_LEN`] bytes.
    #[error("interface name '{0}' is longer than {max} bytes", max = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// A byte outside the printable-ASCII-minus-separators set.
    #[error("interface name '{0}' contains an illegal character")]
    IllegalChar(String),
}

impl TryFrom<&str> for InterfaceName {
    type Error = InterfaceNameError;

    fn try_from(value: &str) -> Result<InterfaceName, InterfaceNameError> {
        if value.is_empty() {
            return Err(InterfaceNameError::Empty);
        }
        if value.len() > InterfaceName::MAX_LEN {
            return Err(InterfaceNameError::TooLong(value.to_string()));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'/' && b != b':')
        {
            return Err(InterfaceNameError::IllegalChar(value.to_string()));
        }
        Ok(InterfaceName(value.to_string()))
    }
}

impl FromStr for InterfaceName {
    type Err = InterfaceNameError;

    fn from_str(value: &str) -> Result<InterfaceName, InterfaceNameError> {
        InterfaceName::try_from(value)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}
