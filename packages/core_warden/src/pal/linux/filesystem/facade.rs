use std::fmt::Debug;
#[cfg(test)]
use std::sync::Arc;

use libc::pid_t;

#[cfg(test)]
use crate::pal::linux::MockFilesystem;
use crate::pal::linux::{BuildTargetFilesystem, Filesystem};

/// Enum to hide the different filesystem implementations behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum FilesystemFacade {
    Target(&'static BuildTargetFilesystem),

    #[cfg(test)]
    Mock(Arc<MockFilesystem>),
}

impl FilesystemFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetFilesystem)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockFilesystem) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Filesystem for FilesystemFacade {
    fn get_cpu_online_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cpu_online_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cpu_online_contents(),
        }
    }

    fn get_proc_entry_names(&self) -> Vec<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_proc_entry_names(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_proc_entry_names(),
        }
    }

    fn get_process_comm_contents(&self, pid: pid_t) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_process_comm_contents(pid),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_process_comm_contents(pid),
        }
    }

    fn get_task_entry_names(&self, pid: pid_t) -> Option<Vec<String>> {
        match self {
            Self::Target(filesystem) => filesystem.get_task_entry_names(pid),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_task_entry_names(pid),
        }
    }
}

impl Debug for FilesystemFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
