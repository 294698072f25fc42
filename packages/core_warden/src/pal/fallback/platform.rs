use std::num::NonZero;
use std::{io, thread};

use crate::pal::Platform;
use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// Singleton instance of `BuildTargetPlatform`, used by public API types to hook up to the
/// correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

/// A platform for targets without a process directory we know how to read.
///
/// Only the current process is visible. It is assumed to be allowed on every processor and
/// affinity changes are accepted without effect, so the reservation engine runs but has nothing
/// to correct. Priority changes are not supported.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

impl Platform for BuildTargetPlatform {
    fn logical_core_count(&self) -> u32 {
        thread::available_parallelism()
            .map(NonZero::get)
            .map_or(1, |count| u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn active_core_mask(&self) -> CoreMask {
        CoreMask::first_n(self.logical_core_count())
    }

    fn current_process_id(&self) -> ProcessId {
        std::process::id()
    }

    fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        process_id == 0
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        vec![ProcessEntry::new(self.current_process_id(), "self")]
    }

    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        if process_id == self.current_process_id() {
            Ok(self.active_core_mask())
        } else {
            Err(AffinityError::ProcessUnavailable)
        }
    }

    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        _mask: CoreMask,
    ) -> Result<(), AffinityError> {
        if process_id == self.current_process_id() {
            Ok(())
        } else {
            Err(AffinityError::ProcessUnavailable)
        }
    }

    fn set_current_process_priority(&self, _priority: ProcessPriority) -> Result<(), io::Error> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process priority cannot be changed on this platform",
        ))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn only_current_process_is_visible() {
        let platform = BuildTargetPlatform;
        let own_id = platform.current_process_id();

        let processes = platform.processes();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].id(), own_id);

        assert_eq!(
            platform.process_affinity(own_id),
            Ok(platform.active_core_mask())
        );
        assert_eq!(
            platform.process_affinity(own_id.wrapping_add(1)),
            Err(AffinityError::ProcessUnavailable)
        );
        assert_eq!(
            platform.set_process_affinity(own_id.wrapping_add(1), CoreMask::from_bits(1)),
            Err(AffinityError::ProcessUnavailable)
        );
        platform
            .set_process_affinity(own_id, CoreMask::from_bits(1))
            .unwrap();
    }

    #[test]
    fn topology_is_consistent() {
        let platform = BuildTargetPlatform;

        let count = platform.logical_core_count();
        assert!(count >= 1);
        assert_eq!(platform.active_core_mask(), CoreMask::first_n(count));
        assert!(platform.is_placeholder_process(0));
    }

    #[test]
    fn priority_is_unsupported() {
        let error = BuildTargetPlatform
            .set_current_process_priority(ProcessPriority::High)
            .unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::Unsupported);
    }
}
