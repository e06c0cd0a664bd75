//! The cgroup v1/v2 abstraction layer (C1).
//!
//! Bootstrap is grounded on `libcgroups::common::get_cgroup_setup` (the
//! `statfs` probe distinguishing Legacy/Hybrid/Unified) and
//! `libcgroups::v1::util`/`v2::util` (mountinfo-driven controller
//! discovery, `cgroup.controllers` enablement). Resolution of a PID to a
//! controller-specific path uses `procfs::process::Process::cgroups`,
//! the same crate and call the teacher uses for the analogous "my own
//! cgroup path" lookup in `v1::manager::Manager::get_subsystem_path`,
//! generalized here to an arbitrary PID.

pub mod controller_type;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC, TMPFS_MAGIC};
use procfs::process::Process;

use self::controller_type::ControllerType;
use crate::common::DEFAULT_CGROUP_ROOT;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

/// A named kernel resource manager and where it is mounted on the host.
#[derive(Debug, Clone)]
pub struct Controller {
    pub name: ControllerType,
    pub version: Version,
    pub mountpoint: PathBuf,
    pub is_unified: bool,
}

#[derive(Debug)]
pub enum CgroupSetup {
    Hybrid,
    Legacy,
    Unified,
}

/// Determines whether the host is pure v2 ("unified"), pure v1
/// ("legacy"), or a v1 hierarchy plus an uncontrolled v2 tree ("hybrid").
/// Ported from `libcgroups::common::get_cgroup_setup`.
pub fn get_cgroup_setup() -> Result<CgroupSetup, CoreError> {
    let default_root = Path::new(DEFAULT_CGROUP_ROOT);
    if !default_root.exists() {
        return Err(CoreError::Fatal("no cgroup root mounted".into()));
    }

    let stat = statfs(default_root)
        .map_err(|e| CoreError::Fatal(format!("statfs {}: {e}", default_root.display())))?;

    if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
        return Ok(CgroupSetup::Unified);
    }

    if stat.filesystem_type() == TMPFS_MAGIC {
        let unified = Path::new("/sys/fs/cgroup/unified");
        if unified.exists() {
            let stat = statfs(unified)
                .map_err(|e| CoreError::Fatal(format!("statfs {}: {e}", unified.display())))?;
            if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
                return Ok(CgroupSetup::Hybrid);
            }
        }
        return Ok(CgroupSetup::Legacy);
    }

    Err(CoreError::Fatal("unrecognized cgroup root fs type".into()))
}

/// An immutable, bootstrap-derived view of the host's controllers.
/// Replaced wholesale on refresh (spec §5, §9: "published atomically with
/// reader reference counts").
#[derive(Debug, Default)]
pub struct HierarchySnapshot {
    controllers: HashMap<ControllerType, Controller>,
    pub unified_mountpoint: Option<PathBuf>,
    pub setup: Option<&'static str>,
}

impl HierarchySnapshot {
    fn bootstrap() -> Result<Self, CoreError> {
        let setup = get_cgroup_setup()?;
        let mut controllers = HashMap::new();

        // v1: each controller has its own mountpoint, discovered via
        // /proc/self/mountinfo (libcgroups::v1::util::get_subsystem_mount_point).
        if !matches!(setup, CgroupSetup::Unified) {
            let me = Process::myself()
                .map_err(|e| CoreError::Fatal(format!("read /proc/self: {e}")))?;
            let mountinfo = me
                .mountinfo()
                .map_err(|e| CoreError::Fatal(format!("read mountinfo: {e}")))?;

            for m in mountinfo.into_iter().filter(|m| m.fs_type == "cgroup") {
                let opt_names: Vec<&str> = m
                    .super_options
                    .keys()
                    .map(|s| s.as_str())
                    .collect();
                for name in opt_names {
                    if let Some(ctrl) = ControllerType::from_name(name) {
                        controllers.entry(ctrl).or_insert(Controller {
                            name: ctrl,
                            version: Version::V1,
                            mountpoint: m.mount_point.clone(),
                            is_unified: false,
                        });
                    }
                }
            }
        }

        // v2: single mountpoint, controllers enabled per directory via
        // cgroup.controllers (libcgroups::v2::util).
        let unified_mountpoint = if matches!(setup, CgroupSetup::Unified | CgroupSetup::Hybrid) {
            let me = Process::myself()
                .map_err(|e| CoreError::Fatal(format!("read /proc/self: {e}")))?;
            me.mountinfo()
                .ok()
                .and_then(|mi| mi.into_iter().find(|m| m.fs_type == "cgroup2"))
                .map(|m| m.mount_point)
        } else {
            None
        };

        if let Some(root) = &unified_mountpoint {
            let controllers_file = root.join("cgroup.controllers");
            if let Ok(content) = crate::common::read_cgroup_file(&controllers_file) {
                for name in content.split_whitespace() {
                    if let Some(ctrl) = ControllerType::from_name(name) {
                        controllers.insert(
                            ctrl,
                            Controller {
                                name: ctrl,
                                version: Version::V2,
                                mountpoint: root.clone(),
                                is_unified: true,
                            },
                        );
                    }
                }
            }
        }

        Ok(HierarchySnapshot {
            controllers,
            unified_mountpoint,
            setup: Some(match setup {
                CgroupSetup::Hybrid => "hybrid",
                CgroupSetup::Legacy => "legacy",
                CgroupSetup::Unified => "unified",
            }),
        })
    }

    pub fn controller(&self, name: ControllerType) -> Option<&Controller> {
        self.controllers.get(&name)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }
}

/// Process-wide, read-mostly hierarchy model. Readers call [`snapshot`]
/// to obtain a cheaply-cloned `Arc`; [`refresh`] swaps in a freshly
/// bootstrapped snapshot without blocking in-flight readers (spec §5,
/// §8 scenario 6).
///
/// [`snapshot`]: Hierarchy::snapshot
/// [`refresh`]: Hierarchy::refresh
pub struct Hierarchy {
    current: Mutex<Arc<HierarchySnapshot>>,
}

impl Hierarchy {
    pub fn bootstrap() -> Result<Self, CoreError> {
        let snap = HierarchySnapshot::bootstrap()?;
        Ok(Hierarchy {
            current: Mutex::new(Arc::new(snap)),
        })
    }

    pub fn snapshot(&self) -> Arc<HierarchySnapshot> {
        Arc::clone(&self.current.lock().expect("hierarchy mutex poisoned"))
    }

    /// Triggered by SIGUSR1 at the daemon level (spec §6). Bootstraps a
    /// new snapshot and atomically publishes it; in-flight reads that
    /// already cloned the old `Arc` run to completion against it.
    pub fn refresh(&self) -> Result<(), CoreError> {
        let fresh = HierarchySnapshot::bootstrap()?;
        let mut guard = self.current.lock().expect("hierarchy mutex poisoned");
        *guard = Arc::new(fresh);
        Ok(())
    }
}

/// A (controller, relative-path-beneath-the-controller-root) pair,
/// derived on demand from a PID and never cached past one operation
/// except as a key into the accounting cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CgroupPath {
    pub controller: ControllerType,
    pub version: Version,
    /// Absolute host path: `mountpoint.join(relative)`.
    pub absolute: PathBuf,
}

/// Resolves `pid`'s cgroup path for `controller` against `snapshot`.
///
/// Reads `/proc/<pid>/cgroup`: each line is `hierarchy-id:controllers:path`.
/// For v1 the controller list is non-empty; for v2 `hierarchy-id` is 0 and
/// the controller list is empty, so a v2-only controller is matched by
/// falling back to the unified line when no v1 line claims it.
///
/// Per the open question in spec §9: when both v1 and v2 expose the same
/// controller on a hybrid host, v2 is preferred if the reader's v2 path is
/// non-root, otherwise v1 is used.
pub fn resolve(
    snapshot: &HierarchySnapshot,
    pid: i32,
    controller: ControllerType,
) -> Result<CgroupPath, CoreError> {
    let proc = Process::new(pid)
        .map_err(|_| CoreError::NotFound(PathBuf::from(format!("/proc/{pid}"))))?;
    let cgroups = proc.cgroups().map_err(|e| {
        // The pid vanishing between `Process::new` and here is the
        // ENOENT case (spec §4.1: treat as if the reader's cgroup were
        // root); an existing pid whose `/proc/<pid>/cgroup` can't be
        // read is a broken invariant and surfaces as EIO instead.
        if Path::new(&format!("/proc/{pid}")).exists() {
            CoreError::Fatal(format!("reading /proc/{pid}/cgroup: {e}"))
        } else {
            CoreError::NotFound(PathBuf::from(format!("/proc/{pid}/cgroup")))
        }
    })?;

    let mut v1_path: Option<PathBuf> = None;
    let mut v2_path: Option<PathBuf> = None;

    for entry in cgroups.into_iter() {
        if entry.controllers.iter().any(|c| c == controller.as_ref()) {
            v1_path = Some(PathBuf::from(&entry.pathname));
        } else if entry.controllers.is_empty() && entry.hierarchy == 0 {
            v2_path = Some(PathBuf::from(&entry.pathname));
        }
    }

    let ctrl = snapshot.controller(controller);

    // Prefer v2 when the reader's own v2 slice is non-root and the
    // controller is actually enabled in the unified hierarchy.
    if let (Some(v2_rel), Some(ctrl)) = (&v2_path, ctrl) {
        if ctrl.is_unified && v2_rel != Path::new("/") {
            let absolute = join_relative(&ctrl.mountpoint, v2_rel);
            return Ok(CgroupPath {
                controller,
                version: Version::V2,
                absolute,
            });
        }
    }

    if let (Some(v1_rel), Some(ctrl)) = (&v1_path, ctrl) {
        if !ctrl.is_unified {
            let absolute = join_relative(&ctrl.mountpoint, v1_rel);
            return Ok(CgroupPath {
                controller,
                version: Version::V1,
                absolute,
            });
        }
    }

    // Fall back to v2 root slice if nothing more specific matched but the
    // unified hierarchy does carry the controller.
    if let (Some(v2_rel), Some(ctrl)) = (&v2_path, ctrl) {
        if ctrl.is_unified {
            let absolute = join_relative(&ctrl.mountpoint, v2_rel);
            return Ok(CgroupPath {
                controller,
                version: Version::V2,
                absolute,
            });
        }
    }

    Err(CoreError::NotFound(PathBuf::from(format!(
        "no mounted controller for {controller}"
    ))))
}

fn join_relative(mountpoint: &Path, relative: &Path) -> PathBuf {
    match relative.strip_prefix("/") {
        Ok(stripped) => mountpoint.join(stripped),
        Err(_) => mountpoint.join(relative),
    }
}
