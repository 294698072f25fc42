use std::num::NonZero;
use std::{io, mem, thread};

use itertools::Itertools;
use libc::{cpu_set_t, pid_t};

use crate::pal::Platform;
use crate::pal::linux::{Bindings, BindingsFacade, Filesystem, FilesystemFacade};
use crate::{
    AffinityError, CoreMask, MAX_CORES, ProcessEntry, ProcessId, ProcessPriority, core_list,
};

/// Singleton instance of `BuildTargetPlatform`, used by public API types to hook up to the
/// correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform =
    BuildTargetPlatform::new(BindingsFacade::target(), FilesystemFacade::target());

// Process ID 0 is the idle task and is never listed in /proc. Process ID 2 is `kthreadd`, the
// parent of all kernel threads, whose affinity is owned by the kernel.
const PLACEHOLDER_PROCESS_IDS: [ProcessId; 2] = [0, 2];

/// The platform that matches the crate's build target.
///
/// You would only use a different platform in unit tests that need to mock the platform.
/// Even then, whenever possible, unit tests should use the real platform for maximum realism.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform {
    bindings: BindingsFacade,
    fs: FilesystemFacade,
}

impl BuildTargetPlatform {
    pub(crate) const fn new(bindings: BindingsFacade, fs: FilesystemFacade) -> Self {
        Self { bindings, fs }
    }

    /// The IDs of the threads of a process, in ascending order.
    fn thread_ids(&self, pid: pid_t) -> Result<Vec<pid_t>, AffinityError> {
        let names = self
            .fs
            .get_task_entry_names(pid)
            .ok_or(AffinityError::ProcessUnavailable)?;

        Ok(names
            .iter()
            .filter_map(|name| name.parse::<pid_t>().ok())
            .sorted_unstable()
            .collect())
    }
}

impl Platform for BuildTargetPlatform {
    fn logical_core_count(&self) -> u32 {
        let configured = self.bindings.configured_processor_count();

        if configured >= 1 {
            return u32::try_from(configured).unwrap_or(u32::MAX);
        }

        // sysconf() can fail in exotic sandboxes; the standard library has its own fallbacks.
        thread::available_parallelism()
            .map(NonZero::get)
            .map_or(1, |count| u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn active_core_mask(&self) -> CoreMask {
        let online = self
            .fs
            .get_cpu_online_contents()
            .and_then(|contents| core_list::parse(&contents).ok())
            .map(|cores| cores.into_iter().collect::<CoreMask>())
            .filter(|mask| !mask.is_empty());

        // If the kernel does not tell us, we assume every configured processor is online.
        online.unwrap_or_else(|| CoreMask::first_n(self.logical_core_count()))
    }

    fn current_process_id(&self) -> ProcessId {
        ProcessId::try_from(self.bindings.getpid())
            .expect("the kernel never assigns negative process IDs")
    }

    fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        PLACEHOLDER_PROCESS_IDS.contains(&process_id)
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        self.fs
            .get_proc_entry_names()
            .iter()
            .filter_map(|name| name.parse::<pid_t>().ok())
            .sorted_unstable()
            .filter_map(|pid| {
                // A process that exits between the directory listing and this read is simply
                // not part of the snapshot.
                let comm = self.fs.get_process_comm_contents(pid)?;
                let id = ProcessId::try_from(pid).ok()?;

                Some(ProcessEntry::new(id, comm.trim_end_matches('\n')))
            })
            .collect()
    }

    /// The union of the affinities of every thread of the process.
    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        let pid = to_pid(process_id)?;

        let mut mask = CoreMask::EMPTY;
        let mut any_thread_seen = false;

        for tid in self.thread_ids(pid)? {
            match self.bindings.sched_getaffinity(tid) {
                Ok(cpuset) => {
                    mask = mask | cpu_set_to_mask(&cpuset);
                    any_thread_seen = true;
                }
                Err(e) if is_exited(&e) => {}
                Err(e) => return Err(to_affinity_error(&e)),
            }
        }

        if any_thread_seen {
            Ok(mask)
        } else {
            Err(AffinityError::ProcessUnavailable)
        }
    }

    /// Applies the mask to every thread of the process.
    ///
    /// Threads started after the thread list is read inherit the affinity of the thread that
    /// started them, so they are either covered already or caught by the next sweep.
    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError> {
        let pid = to_pid(process_id)?;
        let cpuset = mask_to_cpu_set(mask);

        let mut any_thread_set = false;

        for tid in self.thread_ids(pid)? {
            match self.bindings.sched_setaffinity(tid, &cpuset) {
                Ok(()) => any_thread_set = true,
                Err(e) if is_exited(&e) => {}
                Err(e) => return Err(to_affinity_error(&e)),
            }
        }

        if any_thread_set {
            Ok(())
        } else {
            Err(AffinityError::ProcessUnavailable)
        }
    }

    /// Applies the nice value to every thread of the current process, since Linux keeps it
    /// per thread.
    fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<(), io::Error> {
        let pid = self.bindings.getpid();

        let threads = self
            .thread_ids(pid)
            .map_err(|_| io::Error::from_raw_os_error(libc::ESRCH))?;

        for tid in threads {
            match self.bindings.setpriority(tid, priority.nice_value()) {
                Ok(()) => {}
                Err(e) if is_exited(&e) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

fn is_exited(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::ESRCH)
}

fn to_pid(process_id: ProcessId) -> Result<pid_t, AffinityError> {
    // A process ID that does not fit pid_t cannot name a live process.
    pid_t::try_from(process_id).map_err(|_| AffinityError::ProcessUnavailable)
}

fn to_affinity_error(error: &io::Error) -> AffinityError {
    match error.raw_os_error() {
        Some(libc::EPERM | libc::EACCES) => AffinityError::InsufficientPrivilege,
        // ESRCH for exited processes, EINVAL for kernel threads pinned by the kernel.
        _ => AffinityError::ProcessUnavailable,
    }
}

fn cpu_set_to_mask(cpuset: &cpu_set_t) -> CoreMask {
    (0..MAX_CORES)
        // SAFETY: The index is within the bounds of cpu_set_t, which holds at least 1024 bits.
        .filter(|&core| unsafe { libc::CPU_ISSET(core as usize, cpuset) })
        .collect()
}

fn mask_to_cpu_set(mask: CoreMask) -> cpu_set_t {
    // SAFETY: All zeroes is a valid cpu_set_t.
    let mut cpuset: cpu_set_t = unsafe { mem::zeroed() };

    for core in mask {
        // SAFETY: The index is within the bounds of cpu_set_t, which holds at least 1024 bits.
        unsafe {
            libc::CPU_SET(core as usize, &mut cpuset);
        }
    }

    cpuset
}
