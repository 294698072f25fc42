#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
use std::io;
#[cfg(test)]
use std::sync::Arc;

use libc::{cpu_set_t, pid_t};

#[cfg(test)]
use crate::pal::linux::MockBindings;
use crate::pal::linux::{Bindings, BuildTargetBindings};

/// Enum to hide the real/mock choice behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum BindingsFacade {
    Target(&'static BuildTargetBindings),

    #[cfg(test)]
    Mock(Arc<MockBindings>),
}

impl BindingsFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetBindings)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockBindings) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Bindings for BindingsFacade {
    fn sched_getaffinity(&self, tid: pid_t) -> Result<cpu_set_t, io::Error> {
        match self {
            Self::Target(bindings) => bindings.sched_getaffinity(tid),
            #[cfg(test)]
            Self::Mock(mock) => mock.sched_getaffinity(tid),
        }
    }

    fn sched_setaffinity(&self, tid: pid_t, cpuset: &cpu_set_t) -> Result<(), io::Error> {
        match self {
            Self::Target(bindings) => bindings.sched_setaffinity(tid, cpuset),
            #[cfg(test)]
            Self::Mock(mock) => mock.sched_setaffinity(tid, cpuset),
        }
    }

    fn setpriority(&self, tid: pid_t, nice: i32) -> Result<(), io::Error> {
        match self {
            Self::Target(bindings) => bindings.setpriority(tid, nice),
            #[cfg(test)]
            Self::Mock(mock) => mock.setpriority(tid, nice),
        }
    }

    fn getpid(&self) -> pid_t {
        match self {
            Self::Target(bindings) => bindings.getpid(),
            #[cfg(test)]
            Self::Mock(mock) => mock.getpid(),
        }
    }

    fn configured_processor_count(&self) -> i64 {
        match self {
            Self::Target(bindings) => bindings.configured_processor_count(),
            #[cfg(test)]
            Self::Mock(mock) => mock.configured_processor_count(),
        }
    }
}

impl Debug for BindingsFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
