use std::fmt::Debug;
use std::{io, mem};

use libc::{cpu_set_t, pid_t};

use crate::pal::linux::Bindings;

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Real OS bindings are excluded from coverage measurement because they are only exercised by
// integration tests on a real system, where error paths are impractical to trigger.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn sched_getaffinity(&self, tid: pid_t) -> Result<cpu_set_t, io::Error> {
        // SAFETY: All zeroes is a valid cpu_set_t.
        let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };

        // SAFETY: No safety requirements beyond passing valid arguments.
        let result = unsafe { libc::sched_getaffinity(tid, size_of::<cpu_set_t>(), &raw mut cpuset) };

        if result == 0 {
            Ok(cpuset)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn sched_setaffinity(&self, tid: pid_t, cpuset: &cpu_set_t) -> Result<(), io::Error> {
        // SAFETY: No safety requirements beyond passing valid arguments.
        let result = unsafe { libc::sched_setaffinity(tid, size_of::<cpu_set_t>(), cpuset) };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn setpriority(&self, tid: pid_t, nice: i32) -> Result<(), io::Error> {
        let who = libc::id_t::try_from(tid)
            .map_err(|_| io::Error::from_raw_os_error(libc::ESRCH))?;

        // SAFETY: No safety requirements beyond passing valid arguments.
        let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, who, nice) };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn getpid(&self) -> pid_t {
        // SAFETY: No safety requirements.
        unsafe { libc::getpid() }
    }

    fn configured_processor_count(&self) -> i64 {
        // SAFETY: No safety requirements.
        i64::from(unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) })
    }
}
