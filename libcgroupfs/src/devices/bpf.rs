//! Kernel-facing load/attach/detach/query calls for the device-cgroup
//! classifier (spec §4.6 "Loading & attaching"). Ported from
//! `libcgroups::v2::devices::bpf`, including the `#[cfg_attr(test,
//! automock)]` seam over the raw `libbpf-sys`/`libc` calls so tests run
//! without a real kernel BPF subsystem.

use mockall::automock;

#[derive(Clone, Debug)]
pub struct ProgramInfo {
    pub id: u32,
    pub fd: i32,
}

#[derive(thiserror::Error, Debug)]
pub enum BpfError {
    #[error(transparent)]
    Errno(#[from] errno::Errno),
    #[error("failed to raise RLIMIT_MEMLOCK")]
    FailedToIncreaseRLimit,
}

#[cfg_attr(test, automock)]
pub mod prog {
    use std::os::unix::io::RawFd;
    use std::ptr;

    use libbpf_sys::{bpf_insn, BPF_CGROUP_DEVICE, BPF_F_ALLOW_MULTI, BPF_PROG_TYPE_CGROUP_DEVICE};
    #[cfg(not(test))]
    use libbpf_sys::{
        bpf_prog_attach, bpf_prog_detach2, bpf_prog_get_fd_by_id, bpf_prog_load, bpf_prog_query,
    };
    #[cfg(not(test))]
    use libc::setrlimit;
    use libc::{rlimit, ENOSPC, RLIMIT_MEMLOCK};

    use super::ProgramInfo;

    pub fn load(license: &str, insns: &[u8]) -> Result<RawFd, super::BpfError> {
        let insns_cnt = insns.len() / std::mem::size_of::<bpf_insn>();
        let insns = insns as *const _ as *const bpf_insn;
        let mut opts = libbpf_sys::bpf_prog_load_opts {
            kern_version: 0,
            log_buf: ptr::null_mut::<::std::os::raw::c_char>(),
            log_size: 0,
            ..Default::default()
        };
        #[allow(unused_unsafe)]
        let prog_fd = unsafe {
            bpf_prog_load(
                BPF_PROG_TYPE_CGROUP_DEVICE,
                ptr::null::<::std::os::raw::c_char>(),
                license as *const _ as *const ::std::os::raw::c_char,
                insns,
                insns_cnt as u64,
                &mut opts as *mut libbpf_sys::bpf_prog_load_opts,
            )
        };

        if prog_fd < 0 {
            return Err(errno::errno().into());
        }
        Ok(prog_fd)
    }

    /// Collects the programs currently attached to a cgroup fd.
    pub fn query(cgroup_fd: RawFd) -> Result<Vec<ProgramInfo>, super::BpfError> {
        let mut prog_ids: Vec<u32> = vec![0_u32; 64];
        let mut attach_flags = 0_u32;
        for _ in 0..10 {
            let mut prog_cnt = prog_ids.len() as u32;
            #[allow(unused_unsafe)]
            let ret = unsafe {
                bpf_prog_query(
                    cgroup_fd,
                    BPF_CGROUP_DEVICE,
                    0,
                    &mut attach_flags,
                    &prog_ids[0] as *const u32 as *mut u32,
                    &mut prog_cnt,
                )
            };
            if ret != 0 {
                let err = errno::errno();
                if err.0 == ENOSPC {
                    assert!(prog_cnt as usize > prog_ids.len());
                    prog_ids.resize(prog_cnt as usize, 0);
                    continue;
                }
                return Err(err.into());
            }

            prog_ids.resize(prog_cnt as usize, 0);
            break;
        }

        let mut prog_fds = Vec::with_capacity(prog_ids.len());
        for prog_id in &prog_ids {
            #[allow(unused_unsafe)]
            let prog_fd = unsafe { bpf_prog_get_fd_by_id(*prog_id) };
            if prog_fd < 0 {
                log::debug!("bpf_prog_get_fd_by_id failed: {}", errno::errno());
                continue;
            }
            prog_fds.push(ProgramInfo {
                id: *prog_id,
                fd: prog_fd,
            });
        }
        Ok(prog_fds)
    }

    pub fn detach2(prog_fd: RawFd, cgroup_fd: RawFd) -> Result<(), super::BpfError> {
        #[allow(unused_unsafe)]
        let ret = unsafe { bpf_prog_detach2(prog_fd, cgroup_fd, BPF_CGROUP_DEVICE) };
        if ret != 0 {
            return Err(errno::errno().into());
        }
        Ok(())
    }

    pub fn attach(prog_fd: RawFd, cgroup_fd: RawFd) -> Result<(), super::BpfError> {
        #[allow(unused_unsafe)]
        let ret =
            unsafe { bpf_prog_attach(prog_fd, cgroup_fd, BPF_CGROUP_DEVICE, BPF_F_ALLOW_MULTI) };
        if ret != 0 {
            return Err(errno::errno().into());
        }
        Ok(())
    }

    /// `BPF_PROG_LOAD` fails with `EPERM` under the default `ulimit -l`;
    /// this is not inherited into the container, so it is safe to raise
    /// process-wide before loading.
    pub fn bump_memlock_rlimit() -> Result<(), super::BpfError> {
        let rlimit = rlimit {
            rlim_cur: 128 << 20,
            rlim_max: 128 << 20,
        };

        #[allow(unused_unsafe)]
        if unsafe { setrlimit(RLIMIT_MEMLOCK, &rlimit) } != 0 {
            return Err(super::BpfError::FailedToIncreaseRLimit);
        }

        Ok(())
    }
}

// `#[automock]` on `pub mod prog` generates a sibling `mock_prog` module
// with one `<fn>_context()` per function, used by this module's own
// tests below and by `super::controller`'s tests (which swap in
// `bpf::mock_prog` entirely in place of `bpf::prog` under `cfg(test)`).
#[cfg(test)]
mod tests {
    use errno::Errno;
    use libc::ENOSYS;
    use serial_test::serial;

    use super::mock_prog;

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_load() {
        let load = mock_prog::load_context();
        load.expect().once().returning(|_, _| Ok(32));

        let fd = mock_prog::load("Apache", &[0, 0, 0, 0]).expect("successfully calls load");
        assert_eq!(fd, 32);
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_load_error() {
        let load = mock_prog::load_context();
        load.expect()
            .once()
            .returning(|_, _| Err(Errno(ENOSYS).into()));

        assert!(mock_prog::load("Apache", &[0, 0, 0, 0]).is_err());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_attach() {
        let attach = mock_prog::attach_context();
        attach.expect().once().returning(|_, _| Ok(()));
        assert!(mock_prog::attach(0, 0).is_ok());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_detach2() {
        let detach2 = mock_prog::detach2_context();
        detach2.expect().once().returning(|_, _| Ok(()));
        assert!(mock_prog::detach2(0, 0).is_ok());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_detach2_error() {
        let detach2 = mock_prog::detach2_context();
        detach2
            .expect()
            .once()
            .returning(|_, _| Err(Errno(ENOSYS).into()));
        assert!(mock_prog::detach2(0, 0).is_err());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bpf_query() {
        let query = mock_prog::query_context();
        query.expect().once().returning(|_| {
            Ok(vec![
                super::ProgramInfo { id: 1, fd: 1 },
                super::ProgramInfo { id: 2, fd: 2 },
            ])
        });

        let info = mock_prog::query(0).expect("able to successfully query");
        assert_eq!(info.first().unwrap().id, 1);
        assert_eq!(info.len(), 2);
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_bump_memlock_rlimit() {
        let bump = mock_prog::bump_memlock_rlimit_context();
        bump.expect().once().returning(|| Ok(()));
        assert!(mock_prog::bump_memlock_rlimit().is_ok());
    }
}
