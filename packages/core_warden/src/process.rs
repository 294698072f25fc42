use derive_more::Display;

use crate::{CoreMask, ProcessId};

/// A process as listed by the operating system at the time of a scan.
///
/// Entries are snapshots: by the time an entry is used, the process may have exited or its ID
/// may even have been reused. Every operation that acts on an entry tolerates this.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
#[display("{name} ({id})")]
pub struct ProcessEntry {
    id: ProcessId,
    name: String,
}

impl ProcessEntry {
    /// Creates an entry from a process ID and its display name.
    #[must_use]
    pub fn new(id: ProcessId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// The operating system process ID.
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// The executable name reported by the operating system.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Describes an affinity correction that has been applied to a process.
///
/// Delivered to the correction observer registered on a
/// [`Sweeper`][crate::Sweeper] or [`ProtectionController`][crate::ProtectionController] once
/// per successful correction. Events are informational: they are not queued or retried.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("{process_name} ({process_id}): {previous_mask} -> {new_mask}")]
pub struct CorrectionEvent {
    process_id: ProcessId,
    process_name: String,
    previous_mask: CoreMask,
    new_mask: CoreMask,
}

impl CorrectionEvent {
    pub(crate) fn new(process: &ProcessEntry, previous_mask: CoreMask, new_mask: CoreMask) -> Self {
        Self {
            process_id: process.id(),
            process_name: process.name().to_string(),
            previous_mask,
            new_mask,
        }
    }

    /// The process whose affinity was corrected.
    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// The name of the process whose affinity was corrected.
    #[must_use]
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// The affinity the process had before the correction.
    #[must_use]
    pub fn previous_mask(&self) -> CoreMask {
        self.previous_mask
    }

    /// The affinity applied by the correction.
    #[must_use]
    pub fn new_mask(&self) -> CoreMask {
        self.new_mask
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn display_includes_name_and_masks() {
        let process = ProcessEntry::new(1234, "worker.exe");
        assert_eq!(process.to_string(), "worker.exe (1234)");

        let event = CorrectionEvent::new(
            &process,
            CoreMask::from_bits(0b1100),
            CoreMask::from_bits(0b0001),
        );

        assert_eq!(event.process_id(), 1234);
        assert_eq!(event.process_name(), "worker.exe");
        assert_eq!(event.to_string(), "worker.exe (1234): 0xc -> 0x1");
    }
}
