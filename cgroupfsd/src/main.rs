//! Entry point: parses CLI flags, initializes logging, bootstraps the
//! hierarchy model, mounts via `fuser`, and wires `SIGUSR1`/`SIGTERM`
//! to the library's refresh/detach calls (spec §6).

mod config;
mod fs;
mod logger;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

#[cfg(feature = "cgroup_devices")]
use libcgroupfs::devices;
use libcgroupfs::{CpuAccountingCache, Hierarchy};

use crate::config::{Config, Opts};
use crate::fs::CgroupFs;

fn main() -> Result<()> {
    let opts = Opts::parse();

    if let Err(e) = logger::init(opts.debug, opts.log.clone(), opts.log_format.clone()) {
        eprintln!("log init failed: {e:?}");
    }

    let config = Config::from_opts(&opts)?;
    log::info!("starting, mountpoint={}", config.mountpoint.display());

    let hierarchy = Arc::new(Hierarchy::bootstrap().context("bootstrapping cgroup hierarchy")?);
    let accounting = Arc::new(CpuAccountingCache::new());

    probe_device_cgroup_support();

    spawn_sweep_thread(Arc::clone(&accounting), config.sweep_interval_secs);

    install_signal_handlers(Arc::clone(&hierarchy))?;

    let fs = CgroupFs::new(hierarchy, accounting, config.clone());

    let mount_options = vec![fuser::MountOption::RO, fuser::MountOption::FSName("cgroupfsd".to_string())];
    log::debug!("mounting at {}", config.mountpoint.display());
    fuser::mount2(fs, &config.mountpoint, &mount_options).context("mounting fuse filesystem")?;

    Ok(())
}

#[cfg(feature = "cgroup_devices")]
fn probe_device_cgroup_support() {
    if devices::probe_supported() {
        log::info!("device-cgroup eBPF classifier supported");
    } else {
        log::warn!("device-cgroup eBPF classifier unsupported on this kernel");
    }
}

#[cfg(not(feature = "cgroup_devices"))]
fn probe_device_cgroup_support() {
    log::info!("built without cgroup_devices; device-cgroup enforcement disabled");
}

#[cfg(feature = "cgroup_devices")]
fn detach_device_cgroups() {
    if let Err(e) = devices::detach_all(std::path::Path::new(libcgroupfs::common::DEFAULT_CGROUP_ROOT)) {
        log::warn!("detach on shutdown failed: {e}");
    }
}

#[cfg(not(feature = "cgroup_devices"))]
fn detach_device_cgroups() {}

fn spawn_sweep_thread(accounting: Arc<CpuAccountingCache>, interval_secs: u64) {
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(interval_secs));
        accounting.sweep();
    });
}

/// `SIGUSR1` triggers a hierarchy refresh; `SIGTERM` detaches every
/// device-cgroup program this process attached before letting the
/// process exit, via `signal-hook`'s self-pipe (spec §5, §6).
fn install_signal_handlers(hierarchy: Arc<Hierarchy>) -> Result<()> {
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGUSR1,
        signal_hook::consts::SIGTERM,
    ])
    .context("registering signal handlers")?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                signal_hook::consts::SIGUSR1 => {
                    if let Err(e) = hierarchy.refresh() {
                        log::warn!("hierarchy refresh failed: {e}");
                    } else {
                        log::info!("hierarchy refreshed");
                    }
                }
                signal_hook::consts::SIGTERM => {
                    log::info!("received SIGTERM, detaching device cgroups and exiting");
                    detach_device_cgroups();
                    std::process::exit(0);
                }
                _ => unreachable!(),
            }
        }
    });

    Ok(())
}
