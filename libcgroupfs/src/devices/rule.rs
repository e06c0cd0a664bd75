//! The device rule and ruleset types (spec §3 `DeviceRule`).
//!
//! Shaped after `oci_spec::runtime::LinuxDeviceCgroup` (consumed by
//! `libcgroups::v2::devices::emulator::Emulator`/`Controller`), but this
//! crate has no OCI runtime-spec dependency, so the fields are declared
//! directly instead of reusing that type.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Any,
    Block,
    Char,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Access: u8 {
        const READ  = 0b001;
        const WRITE = 0b010;
        const MKNOD = 0b100;
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Access::READ) {
            write!(f, "r")?;
        }
        if self.contains(Access::WRITE) {
            write!(f, "w")?;
        }
        if self.contains(Access::MKNOD) {
            write!(f, "m")?;
        }
        Ok(())
    }
}

/// Wildcard or concrete major/minor number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceNumber {
    Wildcard,
    Concrete(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Allow,
    Deny,
}

/// One rule in a device cgroup ruleset (spec §3). A rule whose `typ` is
/// [`DeviceType::Any`] is a *global* rule: it carries no per-access-type
/// instructions and instead sets the ruleset's default policy (spec
/// §4.6 "Global rules").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRule {
    pub typ: DeviceType,
    pub major: DeviceNumber,
    pub minor: DeviceNumber,
    pub access: Access,
    pub allow: Policy,
}

impl DeviceRule {
    pub fn is_global(&self) -> bool {
        self.typ == DeviceType::Any
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    AllowList,
    DenyList,
}

impl DefaultPolicy {
    pub fn allows_by_default(self) -> bool {
        matches!(self, DefaultPolicy::AllowList)
    }
}
