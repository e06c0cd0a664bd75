//! The device-cgroup eBPF assembler (C6, spec §4.6). Ported from
//! `libcgroups::v2::devices`: `rule` is the generalized
//! `LinuxDeviceCgroup` shape, `emulator`/`program`/`bpf` keep the
//! teacher's module split and logic unchanged in spirit.

pub mod bpf;
pub mod emulator;
pub mod program;
pub mod rule;

use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::Mutex;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

#[cfg(not(test))]
use bpf::prog as bpf_prog;
#[cfg(test)]
use bpf::mock_prog as bpf_prog;

use bpf::BpfError;
use emulator::Emulator;
use program::{Program, ProgramError};
use rule::{DefaultPolicy, DeviceRule};

const LICENSE: &str = "Apache";

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("bpf error: {0}")]
    Bpf(#[from] BpfError),
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
    #[error("program error: {0}")]
    Program(#[from] ProgramError),
}

/// Reduces `rules` via [`Emulator`], assembles the classifier, and
/// atomically replaces whatever is attached at `cgroup_root` (spec
/// §4.6 "Loading & attaching"): load once, attach the new program, then
/// detach everything that was attached before.
pub fn apply_ruleset(
    cgroup_root: &Path,
    rules: &[DeviceRule],
    default_policy: DefaultPolicy,
) -> Result<(), DeviceError> {
    log::debug!("applying device cgroup ruleset to {}", cgroup_root.display());

    let mut emulator = Emulator::with_default_policy(default_policy);
    emulator.add_rules(rules);

    let prog = Program::from_rules(&emulator.rules, emulator.default_policy)?;

    // BPF_PROG_LOAD fails under the default ulimit -l; this limit does
    // not propagate into the container, so raising it process-wide here
    // is safe.
    bpf_prog::bump_memlock_rlimit()?;
    let prog_fd = bpf_prog::load(LICENSE, prog.bytecodes())?;

    let fd = nix::dir::Dir::open(
        cgroup_root.as_os_str(),
        OFlag::O_RDONLY | OFlag::O_DIRECTORY,
        Mode::from_bits(0o600).unwrap(),
    )?;

    let old_progs = bpf_prog::query(fd.as_raw_fd())?;
    bpf_prog::attach(prog_fd, fd.as_raw_fd())?;
    for old in old_progs {
        bpf_prog::detach2(old.fd, fd.as_raw_fd())?;
    }

    Ok(())
}

/// Detaches every device-cgroup program attached at `cgroup_root`.
/// Idempotent: a directory with nothing attached, or one that has
/// vanished, is treated as already detached (spec §4.6 "Detach is
/// idempotent").
pub fn detach_all(cgroup_root: &Path) -> Result<(), DeviceError> {
    if !cgroup_root.exists() {
        return Ok(());
    }

    let fd = nix::dir::Dir::open(
        cgroup_root.as_os_str(),
        OFlag::O_RDONLY | OFlag::O_DIRECTORY,
        Mode::from_bits(0o600).unwrap(),
    )?;

    for old in bpf_prog::query(fd.as_raw_fd())? {
        bpf_prog::detach2(old.fd, fd.as_raw_fd())?;
    }
    Ok(())
}

static PROBE_RESULT: Mutex<Option<bool>> = Mutex::new(None);

/// Loads a trivial two-instruction program (`mov r0, 1; exit`) once at
/// daemon start and caches whether the kernel's BPF_PROG_TYPE_CGROUP_DEVICE
/// is available, so later real attaches can short-circuit straight to
/// `NotSupported` instead of discovering it mid-operation.
pub fn probe_supported() -> bool {
    let mut cached = PROBE_RESULT.lock().expect("probe mutex poisoned");
    if let Some(result) = *cached {
        return result;
    }

    let always_allow = Program::from_rules(&[], DefaultPolicy::AllowList)
        .expect("trivial always-allow program assembles");
    let supported = bpf_prog::bump_memlock_rlimit().is_ok()
        && bpf_prog::load(LICENSE, always_allow.bytecodes()).is_ok();

    *cached = Some(supported);
    supported
}
