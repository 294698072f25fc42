use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    AffinityError, CoreIndex, CoreMask, Error, ProcessId, ProcessPriority, Result, System,
};

/// Names of processes whose affinity is never changed, regardless of which cores they use.
///
/// Matching is by exact, case-sensitive executable name. A renamed or localized binary is not
/// recognized. The list covers the Windows session and security infrastructure and the Linux
/// init system.
pub const CRITICAL_PROCESS_NAMES: &[&str] = &[
    // Windows
    "System",
    "Registry",
    "csrss.exe",
    "winlogon.exe",
    "services.exe",
    "lsass.exe",
    "wininit.exe",
    "smss.exe",
    // Linux
    "systemd",
    "init",
    "kthreadd",
    "systemd-journal",
    "systemd-udevd",
];

/// Whether the named process belongs to the operating system core and must never be moved.
///
/// # Example
///
/// ```
/// use core_warden::is_critical_process;
///
/// assert!(is_critical_process("lsass.exe"));
/// assert!(!is_critical_process("LSASS.EXE"));
/// assert!(!is_critical_process("notepad.exe"));
/// ```
#[must_use]
pub fn is_critical_process(name: &str) -> bool {
    CRITICAL_PROCESS_NAMES.contains(&name)
}

/// Reads and changes the affinity of individual processes.
#[derive(Clone, Debug)]
pub struct AffinityInspector {
    system: System,
}

impl AffinityInspector {
    /// Creates an inspector for processes of the given system.
    #[must_use]
    pub fn new(system: System) -> Self {
        Self { system }
    }

    /// The cores the process is allowed to run on.
    ///
    /// Fails with [`AffinityError::ProcessUnavailable`] if the process has exited or cannot be
    /// opened. This is expected for some processes on any system.
    pub fn affinity(&self, process_id: ProcessId) -> std::result::Result<CoreMask, AffinityError> {
        let mask = self.system.process_affinity(process_id)?;

        // No process can run on zero cores, so this only happens for entries the operating
        // system does not let us look at properly.
        if mask.is_empty() {
            return Err(AffinityError::ProcessUnavailable);
        }

        Ok(mask)
    }

    /// Restricts the process to the given cores.
    ///
    /// The mask must not be empty.
    pub fn set_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> std::result::Result<(), AffinityError> {
        debug_assert!(!mask.is_empty(), "affinity mask must select at least one core");

        self.system.set_process_affinity(process_id, mask)
    }

    /// The affinity of every process the engine would consider, keyed by process ID.
    ///
    /// The current process and placeholder entries are left out, as are processes whose
    /// affinity cannot be read.
    #[must_use]
    pub fn process_affinities(&self) -> BTreeMap<ProcessId, CoreMask> {
        self.system
            .processes()
            .into_iter()
            .filter(|process| self.system.is_foreign_process(process.id()))
            .filter_map(|process| {
                self.affinity(process.id())
                    .ok()
                    .map(|mask| (process.id(), mask))
            })
            .collect()
    }

    /// The cores the current process is allowed to run on.
    pub fn current_process_affinity(&self) -> Result<CoreMask> {
        let process_id = self.system.current_process_id();

        self.affinity(process_id)
            .map_err(|source| Error::Affinity { process_id, source })
    }

    /// Restricts the current process to the given cores.
    ///
    /// Every core must exist and be active. On success, returns the applied mask.
    pub fn bind_current_process(&self, cores: &[CoreIndex]) -> Result<CoreMask> {
        if cores.is_empty() {
            return Err(Error::EmptyReservation);
        }

        let core_count = self.system.logical_core_count();
        let active = self.system.active_core_mask();

        let mut mask = CoreMask::EMPTY;

        for &core in cores {
            check_core(core, core_count, active)?;
            mask.insert(core);
        }

        self.bind_current_process_to(mask)?;

        Ok(mask)
    }

    /// Changes the scheduling priority of the current process.
    ///
    /// Raising the priority above [`Normal`][ProcessPriority::Normal] usually requires elevated
    /// privileges.
    ///
    /// # Errors
    ///
    /// [`Error::PriorityChangeFailed`] if the operating system refuses the change.
    pub fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<()> {
        self.system
            .set_current_process_priority(priority)
            .map_err(|source| Error::PriorityChangeFailed { priority, source })?;

        debug!(%priority, "changed current process priority");

        Ok(())
    }

    pub(crate) fn bind_current_process_to(&self, mask: CoreMask) -> Result<()> {
        let process_id = self.system.current_process_id();

        self.set_affinity(process_id, mask)
            .map_err(|source| Error::Affinity { process_id, source })?;

        debug!(process_id, %mask, "bound current process");

        Ok(())
    }
}

/// Checks that a core exists and is active.
pub(crate) fn check_core(core: CoreIndex, core_count: u32, active: CoreMask) -> Result<()> {
    if core >= core_count {
        return Err(Error::InvalidCore { core, core_count });
    }

    if !active.contains(core) {
        return Err(Error::InactiveCore { core, active });
    }

    Ok(())
}
