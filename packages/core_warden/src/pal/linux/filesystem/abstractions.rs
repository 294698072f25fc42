#![cfg_attr(test, expect(
    clippy::struct_field_names,
    reason = "false positive from automock generated code"
))]

use std::fmt::Debug;

use libc::pid_t;

/// Abstracts the `/proc` and `/sys` virtual filesystems to allow them to be mocked.
///
/// All I/O is synchronous and blocking because it never touches a real storage device.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Filesystem: Debug + Send + Sync + 'static {
    /// Gets the contents of the /sys/devices/system/cpu/online file or `None` if it cannot
    /// be read.
    ///
    /// This is a cpulist format file ("0,1,2-4,5-10:2" style list).
    fn get_cpu_online_contents(&self) -> Option<String>;

    /// Lists the names of the entries in the /proc directory.
    ///
    /// Process entries are the purely numeric names; everything else is to be ignored.
    fn get_proc_entry_names(&self) -> Vec<String>;

    /// Gets the contents of the /proc/{pid}/comm file or `None` if the process is gone.
    ///
    /// This is a single line with the executable name (truncated to 15 bytes) plus newline.
    fn get_process_comm_contents(&self, pid: pid_t) -> Option<String>;

    /// Lists the names of the entries in the /proc/{pid}/task directory or `None` if the process
    /// is gone.
    ///
    /// Each entry is the numeric ID of one thread of the process.
    fn get_task_entry_names(&self, pid: pid_t) -> Option<Vec<String>>;
}
