use std::fmt::Debug;
use std::fs;

use libc::pid_t;

use crate::pal::linux::Filesystem;

/// The virtual filesystem for the real operating system that the build is targeting.
///
/// You would only use different filesystems in PAL unit tests that need to use a mock filesystem.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetFilesystem;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Filesystem for BuildTargetFilesystem {
    fn get_cpu_online_contents(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/system/cpu/online").ok()
    }

    fn get_proc_entry_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect()
    }

    fn get_process_comm_contents(&self, pid: pid_t) -> Option<String> {
        fs::read_to_string(format!("/proc/{pid}/comm")).ok()
    }

    fn get_task_entry_names(&self, pid: pid_t) -> Option<Vec<String>> {
        let entries = fs::read_dir(format!("/proc/{pid}/task")).ok()?;

        Some(
            entries
                .filter_map(Result::ok)
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect(),
        )
    }
}
