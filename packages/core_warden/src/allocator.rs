use std::time::Duration;

use tracing::debug;

use crate::{
    AffinityInspector, CancellationToken, CoreIndex, CoreMask, Error, MAX_CORES, Result, System,
};

/// Returns the cores that are active but not used by any process.
///
/// # Example
///
/// ```
/// use core_warden::{CoreMask, available_from};
///
/// let available = available_from(CoreMask::from_bits(0b1111), CoreMask::from_bits(0b0011));
///
/// assert_eq!(available, CoreMask::from_bits(0b1100));
/// ```
#[must_use]
pub fn available_from(active: CoreMask, occupied: CoreMask) -> CoreMask {
    active & !occupied
}

/// Suggests which cores to reserve, highest-numbered first.
///
/// Other processes tend to be scheduled onto low-numbered cores, so the highest-numbered cores
/// are the cheapest to take over. Returns `min(desired_count, total_cores)` cores.
///
/// # Example
///
/// ```
/// use core_warden::recommend_cores;
///
/// assert_eq!(recommend_cores(8, 3), vec![7, 6, 5]);
/// assert_eq!(recommend_cores(2, 5), vec![1, 0]);
/// ```
#[must_use]
pub fn recommend_cores(total_cores: u32, desired_count: u32) -> Vec<CoreIndex> {
    (total_cores.saturating_sub(desired_count)..total_cores)
        .rev()
        .collect()
}

/// Makes one-shot decisions about which cores to use, based on what other processes use.
///
/// Nothing here is continuous: every answer is a snapshot of the process list at the time of
/// the call.
#[derive(Clone, Debug)]
pub struct CoreAllocator {
    system: System,
    inspector: AffinityInspector,
}

impl CoreAllocator {
    /// Creates an allocator for the given system.
    #[must_use]
    pub fn new(system: System) -> Self {
        Self {
            inspector: AffinityInspector::new(system.clone()),
            system,
        }
    }

    /// The union of the affinities of all other processes.
    ///
    /// The current process and placeholder entries are left out. Processes whose affinity
    /// cannot be read contribute nothing.
    #[must_use]
    pub fn occupied_cores(&self) -> CoreMask {
        self.inspector
            .process_affinities()
            .into_values()
            .fold(CoreMask::EMPTY, |occupied, mask| occupied | mask)
    }

    /// The active cores that no other process is allowed to run on.
    #[must_use]
    pub fn available_cores(&self) -> CoreMask {
        available_from(self.system.active_core_mask(), self.occupied_cores())
    }

    /// Suggests up to `desired_count` cores to reserve on this system, highest-numbered first.
    ///
    /// Only cores that fit in a [`CoreMask`] are suggested.
    #[must_use]
    pub fn recommend(&self, desired_count: u32) -> Vec<CoreIndex> {
        recommend_cores(
            self.system.logical_core_count().min(MAX_CORES),
            desired_count,
        )
    }

    /// Binds the current process to the cores no other process uses.
    ///
    /// If every active core is used by some other process, binds to the highest-numbered active
    /// core instead. Returns the applied mask.
    ///
    /// # Errors
    ///
    /// * [`Error::NoActiveCores`] if the system reports no active cores at all.
    /// * [`Error::Affinity`] if the operating system refuses the new affinity.
    pub fn bind_current_process_to_available(&self) -> Result<CoreMask> {
        let active = self.system.active_core_mask();
        let available = available_from(active, self.occupied_cores());

        let mask = if available.is_empty() {
            debug!("no unused cores; falling back to the highest active core");

            active
                .highest()
                .and_then(CoreMask::single)
                .ok_or(Error::NoActiveCores)?
        } else {
            available
        };

        self.inspector.bind_current_process_to(mask)?;

        Ok(mask)
    }

    /// Reports the available cores once per `interval`, `steps` times in total, unless cancelled
    /// first.
    ///
    /// Each report is a fresh snapshot, so the caller sees how usage changes over time.
    /// Cancellation is checked before every snapshot and interrupts the wait between them.
    pub fn watch_available(
        &self,
        steps: u32,
        interval: Duration,
        cancellation: &CancellationToken,
        mut report: impl FnMut(CoreMask),
    ) {
        for step in 0..steps {
            if cancellation.is_cancelled() {
                break;
            }

            report(self.available_cores());

            if step.saturating_add(1) < steps && cancellation.wait_timeout(interval) {
                debug!(step, "watching available cores cancelled");
                break;
            }
        }
    }
}
