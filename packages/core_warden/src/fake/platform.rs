//! In-memory process table backing the fake system.

use std::collections::BTreeMap;
use std::{io, thread};
use std::time::Duration;

use parking_lot::Mutex;

use crate::pal::Platform;
use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// A process known to the fake platform.
#[derive(Clone, Debug)]
pub(crate) struct FakeProcess {
    pub(crate) name: String,
    pub(crate) affinity: CoreMask,

    /// If false, reading the affinity fails as if the process could not be opened.
    pub(crate) readable: bool,

    /// If false, changing the affinity fails as if the caller lacked the privilege.
    pub(crate) writable: bool,

    /// Number of successful affinity changes made through the platform.
    pub(crate) affinity_writes: usize,
}

impl FakeProcess {
    pub(crate) fn new(name: impl Into<String>, affinity: CoreMask) -> Self {
        Self {
            name: name.into(),
            affinity,
            readable: true,
            writable: true,
            affinity_writes: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub(crate) processes: BTreeMap<ProcessId, FakeProcess>,

    /// Number of times the process list has been requested.
    pub(crate) listings: usize,

    /// Priority of the current process.
    pub(crate) priority: ProcessPriority,
}

/// Platform implementation that serves topology and processes from memory.
///
/// The process table is shared with the [`FakeSystem`][crate::fake::FakeSystem] handle the test
/// holds, so the test can change processes while the engine is looking at them.
#[derive(Debug)]
pub(crate) struct FakePlatform {
    pub(crate) core_count: u32,
    pub(crate) active: CoreMask,
    pub(crate) current_process_id: ProcessId,
    pub(crate) placeholders: Vec<ProcessId>,
    pub(crate) listing_delay: Duration,

    /// Highest priority the current process may set, as if limited by its privileges.
    pub(crate) max_priority: ProcessPriority,

    pub(crate) state: Mutex<FakeState>,
}

impl Platform for FakePlatform {
    fn logical_core_count(&self) -> u32 {
        self.core_count
    }

    fn active_core_mask(&self) -> CoreMask {
        self.active
    }

    fn current_process_id(&self) -> ProcessId {
        self.current_process_id
    }

    fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        self.placeholders.contains(&process_id)
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        // Simulates an expensive enumeration. The lock is not held while sleeping so the test
        // can keep manipulating the table.
        if !self.listing_delay.is_zero() {
            thread::sleep(self.listing_delay);
        }

        let mut state = self.state.lock();
        state.listings = state.listings.saturating_add(1);

        state
            .processes
            .iter()
            .map(|(id, process)| ProcessEntry::new(*id, process.name.clone()))
            .collect()
    }

    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        let state = self.state.lock();

        match state.processes.get(&process_id) {
            Some(process) if process.readable => Ok(process.affinity),
            _ => Err(AffinityError::ProcessUnavailable),
        }
    }

    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError> {
        let mut state = self.state.lock();

        let process = state
            .processes
            .get_mut(&process_id)
            .ok_or(AffinityError::ProcessUnavailable)?;

        if !process.writable {
            return Err(AffinityError::InsufficientPrivilege);
        }

        // Real operating systems refuse masks that select no usable processor.
        if !mask.intersects(self.active) {
            return Err(AffinityError::ProcessUnavailable);
        }

        process.affinity = mask;
        process.affinity_writes = process.affinity_writes.saturating_add(1);

        Ok(())
    }

    fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<(), io::Error> {
        if priority > self.max_priority {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }

        self.state.lock().priority = priority;

        Ok(())
    }
}
