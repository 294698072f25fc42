#![cfg_attr(
    test,
    expect(
        clippy::struct_field_names,
        reason = "false positive from automock generated code"
    )
)]

use std::fmt::Debug;
use std::io;

use libc::{cpu_set_t, pid_t};

/// Bindings for FFI calls into the operating system.
///
/// All PAL FFI calls must go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    // sched_getaffinity() for a single thread
    fn sched_getaffinity(&self, tid: pid_t) -> Result<cpu_set_t, io::Error>;

    // sched_setaffinity() for a single thread
    fn sched_setaffinity(&self, tid: pid_t, cpuset: &cpu_set_t) -> Result<(), io::Error>;

    // setpriority(PRIO_PROCESS) for a single thread, with a nice value
    fn setpriority(&self, tid: pid_t, nice: i32) -> Result<(), io::Error>;

    fn getpid(&self) -> pid_t;

    // sysconf(_SC_NPROCESSORS_CONF)
    fn configured_processor_count(&self) -> i64;
}
