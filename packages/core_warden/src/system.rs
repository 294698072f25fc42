//! Public handle to the operating system services the reservation engine consumes.
//!
//! All reservation logic takes a [`System`] instead of calling the operating system directly,
//! so the same code can run against the real system or, in tests, against a fake one.

use std::io;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakeSystem;
#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{Platform, PlatformFacade};
use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// Handle to the topology query and process directory of a system.
///
/// A `System` can represent either the real operating system (via [`System::current()`]) or a
/// fake system for testing (via [`FakeSystem::system()`][crate::fake::FakeSystem::system] when
/// the `test-util` feature is enabled). Clones are cheap and equivalent.
///
/// # Example
///
/// ```
/// use core_warden::System;
///
/// let system = System::current();
///
/// let count = system.logical_core_count();
/// let active = system.active_core_mask();
/// println!("{count} logical cores, active: {active}");
/// ```
#[derive(Clone, Debug)]
pub struct System {
    platform: PlatformFacade,
}

impl System {
    /// Returns a handle to the operating system the current process runs on.
    #[must_use]
    pub fn current() -> Self {
        Self {
            platform: PlatformFacade::target(),
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn fake(fake: &FakeSystem) -> Self {
        Self {
            platform: PlatformFacade::from_fake(fake.platform()),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self {
            platform: PlatformFacade::from_mock(mock),
        }
    }

    /// Total number of logical cores the operating system knows about.
    #[must_use]
    pub fn logical_core_count(&self) -> u32 {
        self.platform.logical_core_count()
    }

    /// The cores that are currently online.
    ///
    /// Only the first [`MAX_CORES`][crate::MAX_CORES] cores are ever reported.
    #[must_use]
    pub fn active_core_mask(&self) -> CoreMask {
        self.platform.active_core_mask()
    }

    /// Lists the live processes at the time of the call.
    ///
    /// The list is unfiltered: it includes the current process and any idle or kernel
    /// placeholder entries.
    #[must_use]
    pub fn processes(&self) -> Vec<ProcessEntry> {
        self.platform.processes()
    }

    /// The ID of the process this code runs in.
    #[must_use]
    pub fn current_process_id(&self) -> ProcessId {
        self.platform.current_process_id()
    }

    /// Whether the ID denotes an idle or kernel placeholder entry rather than a real process.
    #[must_use]
    pub fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        self.platform.is_placeholder_process(process_id)
    }

    /// Whether the reservation engine should consider the process at all.
    ///
    /// The current process and placeholder entries are never inspected or adjusted.
    pub(crate) fn is_foreign_process(&self, process_id: ProcessId) -> bool {
        process_id != self.current_process_id() && !self.is_placeholder_process(process_id)
    }

    pub(crate) fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        self.platform.process_affinity(process_id)
    }

    pub(crate) fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError> {
        self.platform.set_process_affinity(process_id, mask)
    }

    pub(crate) fn set_current_process_priority(
        &self,
        priority: ProcessPriority,
    ) -> Result<(), io::Error> {
        self.platform.set_current_process_priority(priority)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(System: Send, Sync, Clone);

    #[test]
    fn delegates_to_platform() {
        let mut mock = MockPlatform::new();
        mock.expect_logical_core_count().return_const(4_u32);
        mock.expect_active_core_mask()
            .return_const(CoreMask::from_bits(0b1011));
        mock.expect_current_process_id().return_const(77_u32);
        mock.expect_is_placeholder_process()
            .returning(|id| id == 0);
        mock.expect_processes()
            .times(1)
            .returning(|| vec![ProcessEntry::new(77, "self"), ProcessEntry::new(5, "other")]);

        let system = System::from_mock(mock);

        assert_eq!(system.logical_core_count(), 4);
        assert_eq!(system.active_core_mask(), CoreMask::from_bits(0b1011));
        assert_eq!(system.processes().len(), 2);

        assert!(!system.is_foreign_process(77));
        assert!(!system.is_foreign_process(0));
        assert!(system.is_foreign_process(5));
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn current_system_lists_current_process() {
        let system = System::current();
        let own_id = system.current_process_id();

        assert!(system.processes().iter().any(|p| p.id() == own_id));
        assert!(!system.is_foreign_process(own_id));
    }
}
