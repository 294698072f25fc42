use std::fmt::Debug;
use std::io;

use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// The operating system services consumed by the reservation engine.
///
/// Implementations perform no filtering: every listed process is returned, including the current
/// process and any kernel placeholders. Deciding what to leave alone is the caller's job.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Total number of logical processors the operating system knows about.
    fn logical_core_count(&self) -> u32;

    /// The processors that are currently online, clipped to the mask width.
    fn active_core_mask(&self) -> CoreMask;

    fn current_process_id(&self) -> ProcessId;

    /// Whether the process ID denotes an idle or kernel placeholder entry rather than a real
    /// process whose affinity could be managed.
    fn is_placeholder_process(&self, process_id: ProcessId) -> bool;

    /// Lists the live processes. The list is a snapshot taken at the time of the call.
    fn processes(&self) -> Vec<ProcessEntry>;

    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError>;

    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError>;

    /// Changes the scheduling priority of the current process.
    fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<(), io::Error>;
}
