use std::fmt::Debug;
use std::io;
#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakePlatform;
#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{BUILD_TARGET_PLATFORM, BuildTargetPlatform, Platform};
use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// Hides the choice between the real platform, the public fake and test mocks behind a single
/// wrapper type.
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Target(&'static BuildTargetPlatform),

    #[cfg(any(test, feature = "test-util"))]
    Fake(Arc<FakePlatform>),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

impl PlatformFacade {
    pub(crate) fn target() -> Self {
        Self::Target(&BUILD_TARGET_PLATFORM)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn from_fake(fake: Arc<FakePlatform>) -> Self {
        Self::Fake(fake)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Platform for PlatformFacade {
    fn logical_core_count(&self) -> u32 {
        match self {
            Self::Target(p) => p.logical_core_count(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.logical_core_count(),
            #[cfg(test)]
            Self::Mock(p) => p.logical_core_count(),
        }
    }

    fn active_core_mask(&self) -> CoreMask {
        match self {
            Self::Target(p) => p.active_core_mask(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.active_core_mask(),
            #[cfg(test)]
            Self::Mock(p) => p.active_core_mask(),
        }
    }

    fn current_process_id(&self) -> ProcessId {
        match self {
            Self::Target(p) => p.current_process_id(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.current_process_id(),
            #[cfg(test)]
            Self::Mock(p) => p.current_process_id(),
        }
    }

    fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        match self {
            Self::Target(p) => p.is_placeholder_process(process_id),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.is_placeholder_process(process_id),
            #[cfg(test)]
            Self::Mock(p) => p.is_placeholder_process(process_id),
        }
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        match self {
            Self::Target(p) => p.processes(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.processes(),
            #[cfg(test)]
            Self::Mock(p) => p.processes(),
        }
    }

    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        match self {
            Self::Target(p) => p.process_affinity(process_id),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.process_affinity(process_id),
            #[cfg(test)]
            Self::Mock(p) => p.process_affinity(process_id),
        }
    }

    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError> {
        match self {
            Self::Target(p) => p.set_process_affinity(process_id, mask),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.set_process_affinity(process_id, mask),
            #[cfg(test)]
            Self::Mock(p) => p.set_process_affinity(process_id, mask),
        }
    }

    fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<(), io::Error> {
        match self {
            Self::Target(p) => p.set_current_process_priority(priority),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.set_current_process_priority(priority),
            #[cfg(test)]
            Self::Mock(p) => p.set_current_process_priority(priority),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for PlatformFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
